
use log::{LevelFilter, error, info, warn};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use std::time::Instant;

use abstats::cli::annotate::{AnnotateSettings, check_annotate_settings};
use abstats::cli::core::{Commands, get_cli};
use abstats::data_types::locus_job::LocusJob;
use abstats::job_scheduler::{EngineConfigBuilder, JobInputs, apply_outcomes, run_jobs};
use abstats::parsing::annovar::load_annovar_file;
use abstats::parsing::known_sites::KnownSites;
use abstats::parsing::read_source::BamReadSource;
use abstats::parsing::vep::load_vep_file;
use abstats::util::file_io::save_json;
use abstats::writers::statistics_writer::{StatisticsWriter, sample_name_from_path};

fn run_annotate(settings: AnnotateSettings) {
    // start the timer
    let start_time = Instant::now();

    // set up logging before we check the other settings
    let filter_level: LevelFilter = match settings.verbosity {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace
    };
    env_logger::builder()
        .format_timestamp_millis()
        .filter_level(filter_level)
        .init();

    let settings = match check_annotate_settings(settings) {
        Ok(s) => s,
        Err(e) => {
            error!("Error while verifying settings: {e:#}");
            std::process::exit(exitcode::CONFIG);
        }
    };

    // set up the number of threads for rayon
    match rayon::ThreadPoolBuilder::new().num_threads(settings.threads).build_global() {
        Ok(()) => {},
        Err(e) => {
            error!("Error while building thread pool: {e}");
            std::process::exit(exitcode::OSERR);
        }
    };

    // create a debug folder if specified
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("Creating debug folder at {debug_folder:?}...");
        if let Err(e) = std::fs::create_dir_all(debug_folder) {
            error!("Error while creating debug folder: {e}");
            std::process::exit(exitcode::IOERR);
        }

        // save the CLI options
        let cli_json = debug_folder.join("cli_settings.json");
        info!("Saving CLI options to {cli_json:?}...");
        if let Err(e) = save_json(&settings, &cli_json) {
            error!("Error while saving CLI options: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    }

    // load the reference genome
    info!("Pre-loading reference genome into memory...");
    let reference_genome = match ReferenceGenome::from_fasta(&settings.reference_fn) {
        Ok(rg) => rg,
        Err(e) => {
            error!("Error while loading reference genome: {e:?}");
            std::process::exit(exitcode::IOERR);
        }
    };

    // load the variant list, the CLI guarantees exactly one of these
    let num_samples = settings.bam_filenames.len();
    let load_result = match (settings.annovar_fn.as_deref(), settings.vep_fn.as_deref()) {
        (Some(annovar_fn), None) => load_annovar_file(annovar_fn, &reference_genome, num_samples),
        (None, Some(vep_fn)) => load_vep_file(vep_fn, &reference_genome, num_samples),
        _ => Err(anyhow::anyhow!("Exactly one of --annovar or --vep must be provided"))
    };
    let mut variant_list = match load_result {
        Ok(vl) => vl,
        Err(e) => {
            error!("Error while loading variant list: {e:#}");
            std::process::exit(exitcode::IOERR);
        }
    };
    if variant_list.index.is_empty() {
        warn!("Variant list is empty, only the header will be written.");
    }

    // load any known sites also
    let known_sites = settings.known_sites_fn.as_deref().map(|known_fn| {
        info!("Pre-loading known sites into memory...");
        match KnownSites::from_vcf(known_fn) {
            Ok(ks) => ks,
            Err(e) => {
                error!("Error while loading known sites: {e:#}");
                std::process::exit(exitcode::IOERR);
            }
        }
    });

    // build our configuration
    let engine_config = match EngineConfigBuilder::default()
        .min_hq_base_quality(settings.min_hq_base_quality)
        .min_hq_mapping_quality(settings.min_hq_mapping_quality)
        .min_match_length(settings.min_match_length)
        .pileup_tolerance(settings.pileup_tolerance)
        .min_alignment_rate(settings.min_alignment_rate)
        .max_mismatches(settings.max_mismatches)
        .build() {
        Ok(ec) => ec,
        Err(e) => {
            error!("Error while building engine config: {e:?}");
            std::process::exit(exitcode::SOFTWARE);
        }
    };

    // one job per (sample, locus)
    let jobs = LocusJob::enumerate(&variant_list.index, num_samples);
    let num_jobs = jobs.len();
    info!("Generated {num_jobs} jobs over {} variants and {num_samples} samples.", variant_list.index.len());

    info!("Collecting read statistics...");
    let read_filter = settings.read_filter();
    let inputs = JobInputs {
        index: &variant_list.index,
        reference_genome: &reference_genome,
        known_sites: known_sites.as_ref(),
        config: &engine_config
    };
    let outcomes = run_jobs(jobs, inputs, |sample_index| {
        BamReadSource::open(&settings.bam_filenames[sample_index], read_filter)
    });

    let num_failed = apply_outcomes(&mut variant_list.index, outcomes);
    info!("Solved:error jobs: {} : {num_failed}", num_jobs - num_failed);

    // now write things
    let sample_names: Vec<String> = settings.bam_filenames.iter()
        .map(|bam_fn| sample_name_from_path(bam_fn))
        .collect();
    info!("Saving annotated variants to {:?}...", settings.output_fn);
    let write_result = StatisticsWriter::new(&settings.output_fn)
        .and_then(|mut writer| {
            writer.write_variant_list(&variant_list, &sample_names)?;
            writer.finish()
        });
    if let Err(e) = write_result {
        error!("Error while saving annotated variants: {e:#}");
        std::process::exit(exitcode::IOERR);
    }

    if num_failed > 0 {
        error!("{num_failed} jobs failed, statistics for the affected loci are incomplete.");
        std::process::exit(exitcode::SOFTWARE);
    }

    info!("Annotation completed in {} seconds.", start_time.elapsed().as_secs_f64());
}

fn main() {
    let cli = get_cli();
    match cli.command {
        Commands::Annotate(settings) => {
            run_annotate(*settings);
        }
    }

    info!("Process finished successfully.");
}
