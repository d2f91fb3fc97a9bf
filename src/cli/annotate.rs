
use anyhow::ensure;
use clap::{ArgGroup, Args};
use log::{info, warn};
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::core::{check_optional_filename, check_required_filename, AFTER_HELP, FULL_VERSION};
use crate::parsing::read_source::ReadFilter;

/// Shortest matched span allowed for SNV pileup reads
pub const MIN_MATCH_LENGTH_FLOOR: u64 = 10;
/// Lowest allowed alignment rate for indel realignment
pub const MIN_ALIGNMENT_RATE_FLOOR: f64 = 0.2;

#[derive(Args, Clone, Default, Serialize)]
#[clap(author, about,
    after_help = &**AFTER_HELP
)]
#[clap(group(ArgGroup::new("variant_list").required(true).args(["annovar_fn", "vep_fn"])))]
pub struct AnnotateSettings {
    #[clap(default_value = "")]
    #[clap(hide = true)]
    abstats_version: String,

    /// Reference FASTA file
    #[clap(required = true)]
    #[clap(short = 'f')]
    #[clap(long = "reference")]
    #[clap(value_name = "FASTA")]
    #[clap(help_heading = Some("Input/Output"))]
    pub reference_fn: PathBuf,

    /// Annovar-style variant list (TSV, optionally gzipped)
    #[clap(short = 'a')]
    #[clap(long = "annovar")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub annovar_fn: Option<PathBuf>,

    /// VEP-style variant list (TSV, optionally gzipped)
    #[clap(short = 'e')]
    #[clap(long = "vep")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub vep_fn: Option<PathBuf>,

    /// Known polymorphic SNP sites (VCF/BCF)
    #[clap(short = 'k')]
    #[clap(long = "known-sites")]
    #[clap(value_name = "VCF")]
    #[clap(help_heading = Some("Input/Output"))]
    pub known_sites_fn: Option<PathBuf>,

    /// Indexed alignment files, one output block per file
    #[clap(required = true)]
    #[clap(short = 'b')]
    #[clap(long = "bam")]
    #[clap(value_name = "BAM")]
    #[clap(num_args = 1..)]
    #[clap(help_heading = Some("Input/Output"))]
    pub bam_filenames: Vec<PathBuf>,

    /// Output annotated table (TSV, gzipped if ending in .gz)
    #[clap(required = true)]
    #[clap(short = 'o')]
    #[clap(long = "output")]
    #[clap(value_name = "TSV")]
    #[clap(help_heading = Some("Input/Output"))]
    pub output_fn: PathBuf,

    /// Optional output debug folder
    #[clap(long = "output-debug")]
    #[clap(value_name = "DIR")]
    #[clap(help_heading = Some("Input/Output"))]
    pub debug_folder: Option<PathBuf>,

    /// Minimum aligned span of a read at an SNV locus, must be >= 10
    #[clap(short = 'm')]
    #[clap(long = "min-match-length")]
    #[clap(value_name = "BP")]
    #[clap(default_value = "15")]
    #[clap(help_heading = Some("Pileup parameters"))]
    pub min_match_length: u64,

    /// Base quality needed for a high-quality observation
    #[clap(short = 's')]
    #[clap(long = "min-hq-base-quality")]
    #[clap(value_name = "QUAL")]
    #[clap(default_value = "30")]
    #[clap(help_heading = Some("Pileup parameters"))]
    pub min_hq_base_quality: u8,

    /// Mapping quality needed for a high-quality observation
    #[clap(short = 'S')]
    #[clap(long = "min-hq-mapping-quality")]
    #[clap(value_name = "MAPQ")]
    #[clap(default_value = "40")]
    #[clap(help_heading = Some("Pileup parameters"))]
    pub min_hq_mapping_quality: u8,

    /// Mismatches elsewhere in an alt-supporting read before it is flagged
    #[clap(long = "max-mismatches")]
    #[clap(value_name = "COUNT")]
    #[clap(default_value = "5")]
    #[clap(help_heading = Some("Pileup parameters"))]
    pub max_mismatches: u64,

    /// Window (bp) around each indel breakpoint used to collect reads
    #[clap(short = 'T')]
    #[clap(long = "pileup-tolerance")]
    #[clap(value_name = "BP")]
    #[clap(default_value = "5")]
    #[clap(help_heading = Some("Realignment parameters"))]
    pub pileup_tolerance: u64,

    /// Minimum fraction of the best attainable score for a read to be assigned, in [0.2, 1.0]
    #[clap(short = 'r')]
    #[clap(long = "min-alignment-rate")]
    #[clap(value_name = "FLOAT")]
    #[clap(default_value = "0.90")]
    #[clap(help_heading = Some("Realignment parameters"))]
    pub min_alignment_rate: f64,

    /// Keeps reads flagged as PCR/optical duplicates
    #[clap(short = 'd')]
    #[clap(long = "count-duplicates")]
    #[clap(help_heading = Some("Read filters"))]
    pub count_duplicates: bool,

    /// Keeps secondary alignments
    #[clap(short = 'u')]
    #[clap(long = "count-secondary")]
    #[clap(help_heading = Some("Read filters"))]
    pub count_secondary: bool,

    /// Number of threads to use for the per-locus jobs
    #[clap(long = "threads")]
    #[clap(value_name = "THREADS")]
    #[clap(default_value = "1")]
    pub threads: usize,

    /// Enable verbose output.
    #[clap(short = 'v')]
    #[clap(long = "verbose")]
    #[clap(action = clap::ArgAction::Count)]
    pub verbosity: u8,
}

impl AnnotateSettings {
    /// Flag filters to apply when reading the BAM files
    pub fn read_filter(&self) -> ReadFilter {
        ReadFilter {
            count_duplicates: self.count_duplicates,
            count_secondary: self.count_secondary
        }
    }
}

pub fn check_annotate_settings(mut settings: AnnotateSettings) -> anyhow::Result<AnnotateSettings> {
    // hard code the version in
    settings.abstats_version = FULL_VERSION.clone();
    info!("abstats version: {:?}", &settings.abstats_version);
    info!("Sub-command: annotate");
    info!("Inputs:");

    check_required_filename(&settings.reference_fn, "Reference FASTA")?;
    info!("\tReference: {:?}", &settings.reference_fn);

    ensure!(settings.annovar_fn.is_some() != settings.vep_fn.is_some(), "Exactly one of --annovar or --vep must be provided");
    check_optional_filename(settings.annovar_fn.as_deref(), "Annovar variant list")?;
    check_optional_filename(settings.vep_fn.as_deref(), "VEP variant list")?;
    if let Some(annovar_fn) = settings.annovar_fn.as_deref() {
        info!("\tAnnovar variants: {annovar_fn:?}");
    }
    if let Some(vep_fn) = settings.vep_fn.as_deref() {
        info!("\tVEP variants: {vep_fn:?}");
    }

    check_optional_filename(settings.known_sites_fn.as_deref(), "Known sites VCF")?;
    if let Some(known_fn) = settings.known_sites_fn.as_deref() {
        info!("\tKnown sites: {known_fn:?}");
    } else {
        info!("\tKnown sites: None");
    }

    ensure!(!settings.bam_filenames.is_empty(), "At least one --bam must be provided");
    for (i, bam_fn) in settings.bam_filenames.iter().enumerate() {
        check_required_filename(bam_fn, format!("BAM #{i}").as_str())?;
        info!("\tBAM #{i}: {bam_fn:?}");
    }

    // outputs
    info!("Outputs:");
    info!("\tAnnotated table: {:?}", &settings.output_fn);
    if let Some(debug_folder) = settings.debug_folder.as_ref() {
        info!("\tDebug folder: {debug_folder:?}");
    }

    info!("Pileup parameters:");
    if settings.min_match_length < MIN_MATCH_LENGTH_FLOOR {
        warn!("--min-match-length {} is below the minimum, using {MIN_MATCH_LENGTH_FLOOR}", settings.min_match_length);
        settings.min_match_length = MIN_MATCH_LENGTH_FLOOR;
    }
    info!("\tMinimum match length: {}", settings.min_match_length);
    info!("\tMinimum HQ base quality: {}", settings.min_hq_base_quality);
    info!("\tMinimum HQ mapping quality: {}", settings.min_hq_mapping_quality);
    info!("\tMaximum mismatches: {}", settings.max_mismatches);

    info!("Realignment parameters:");
    info!("\tPileup tolerance: {}", settings.pileup_tolerance);
    ensure!(!settings.min_alignment_rate.is_nan(), "--min-alignment-rate must be a number");
    let clamped_rate = settings.min_alignment_rate.clamp(MIN_ALIGNMENT_RATE_FLOOR, 1.0);
    if clamped_rate != settings.min_alignment_rate {
        warn!("--min-alignment-rate {} is outside [{MIN_ALIGNMENT_RATE_FLOOR}, 1.0], using {clamped_rate}", settings.min_alignment_rate);
        settings.min_alignment_rate = clamped_rate;
    }
    info!("\tMinimum alignment rate: {}", settings.min_alignment_rate);

    info!("Read filters:");
    info!("\tDuplicates: {}", if settings.count_duplicates { "COUNTED" } else { "SKIPPED" });
    info!("\tSecondary alignments: {}", if settings.count_secondary { "COUNTED" } else { "SKIPPED" });

    if settings.threads == 0 {
        settings.threads = 1;
    }
    info!("Processing threads: {}", settings.threads);

    Ok(settings)
}
