/*!
Dispatches locus jobs to the worker pool and merges their statistics back into the variant index.
Each job returns a list of statistics deltas instead of writing shared records; the deltas are merged in job order after the pool finishes.
*/

use anyhow::anyhow;
use derive_builder::Builder;
use indicatif::ParallelProgressIterator;
use log::{debug, error};
use rayon::prelude::*;
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use rustc_hash::FxHashMap;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::data_types::locus_job::LocusJob;
use crate::data_types::statistics::Statistics;
use crate::data_types::variant_index::{IndexEntry, VariantId, VariantIndex};
use crate::indel_realigner::process_indel_locus;
use crate::parsing::known_sites::{KnownAlleles, KnownSites};
use crate::parsing::read_source::ReadSource;
use crate::snv_pileup::process_snv_locus;
use crate::util::progress_bar::get_progress_style;

/// Thresholds shared by both evidence paths
#[derive(Builder, Clone, Copy, Debug, PartialEq)]
#[builder(default)]
pub struct EngineConfig {
    /// base quality needed for a base to count as high quality
    min_hq_base_quality: u8,
    /// mapping quality needed for a read to count as high quality
    min_hq_mapping_quality: u8,
    /// SNV path reads with fewer matched bases are dropped
    min_match_length: u64,
    /// bases added on either side of each breakpoint when querying reads
    pileup_tolerance: u64,
    /// score / max attainable score below this is an unknown read
    min_alignment_rate: f64,
    /// alt-supporting reads with more mismatches than this are flagged
    max_mismatches: u64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_hq_base_quality: 30,
            min_hq_mapping_quality: 40,
            min_match_length: 15,
            pileup_tolerance: 5,
            min_alignment_rate: 0.90,
            max_mismatches: 5
        }
    }
}

impl EngineConfig {
    // getters
    pub fn min_hq_base_quality(&self) -> u8 {
        self.min_hq_base_quality
    }

    pub fn min_hq_mapping_quality(&self) -> u8 {
        self.min_hq_mapping_quality
    }

    pub fn min_match_length(&self) -> u64 {
        self.min_match_length
    }

    pub fn pileup_tolerance(&self) -> u64 {
        self.pileup_tolerance
    }

    pub fn min_alignment_rate(&self) -> f64 {
        self.min_alignment_rate
    }

    pub fn max_mismatches(&self) -> u64 {
        self.max_mismatches
    }
}

/// Everything a single job reads; all of it is shared and immutable
#[derive(Clone, Copy, Debug)]
pub struct LocusContext<'a> {
    /// The job being processed
    pub job: LocusJob,
    /// Chromosome name
    pub chrom: &'a str,
    /// Full chromosome sequence
    pub chrom_seq: &'a [u8],
    /// Index entries at the job position
    pub cluster: &'a [IndexEntry],
    /// All loaded variants
    pub index: &'a VariantIndex,
    /// Known polymorphisms on this chromosome, if a catalog was loaded
    pub known_sites: Option<&'a FxHashMap<u64, KnownAlleles>>,
    /// Engine thresholds
    pub config: &'a EngineConfig
}

impl LocusContext<'_> {
    pub fn position(&self) -> u64 {
        self.job.position()
    }

    pub fn sample_index(&self) -> usize {
        self.job.sample_index()
    }
}

/// Statistics increments produced by one job
pub type StatisticsDelta = Vec<(VariantId, Statistics)>;

/// The result of one job
#[derive(Debug)]
pub struct JobOutcome {
    pub job: LocusJob,
    pub result: anyhow::Result<StatisticsDelta>
}

/// Shared read-only inputs for a batch of jobs
#[derive(Clone, Copy)]
pub struct JobInputs<'a> {
    pub index: &'a VariantIndex,
    pub reference_genome: &'a ReferenceGenome,
    pub known_sites: Option<&'a KnownSites>,
    pub config: &'a EngineConfig
}

impl<'a> JobInputs<'a> {
    /// Resolves the chromosome and cluster for a job
    /// # Errors
    /// * if the job points at a chromosome that is not in the index
    pub fn locus_context(&self, job: LocusJob) -> anyhow::Result<LocusContext<'a>> {
        let (chrom, _positions) = self.index.chromosome(job.chrom_index())
            .ok_or(anyhow!("Chromosome index {} is not in the variant index", job.chrom_index()))?;
        Ok(LocusContext {
            job,
            chrom,
            chrom_seq: self.reference_genome.get_full_chromosome(chrom).unwrap(),
            cluster: self.index.cluster(job.chrom_index(), job.position()),
            index: self.index,
            known_sites: self.known_sites.and_then(|ks| ks.chromosome(chrom)),
            config: self.config
        })
    }
}

/// Runs one job, picking the SNV path only when every variant in the cluster is an SNV
/// # Errors
/// * if the read source fails or the alignment step fails
pub fn process_job<S: ReadSource>(context: &LocusContext, read_source: &mut S) -> anyhow::Result<StatisticsDelta> {
    if context.index.is_snv_cluster(context.cluster) {
        process_snv_locus(context, read_source)
    } else {
        process_indel_locus(context, read_source)
    }
}

/// Per-worker state; the source is reopened whenever the worker switches samples
struct WorkerState<S> {
    sample_index: Option<usize>,
    source: Option<S>
}

impl<S> WorkerState<S> {
    fn new() -> Self {
        Self {
            sample_index: None,
            source: None
        }
    }

    fn source_for<F>(&mut self, sample_index: usize, open_source: &F) -> anyhow::Result<&mut S>
    where
        F: Fn(usize) -> anyhow::Result<S>
    {
        if self.sample_index != Some(sample_index) || self.source.is_none() {
            self.source = None;
            self.sample_index = None;
            self.source = Some(open_source(sample_index)?);
            self.sample_index = Some(sample_index);
        }
        self.source.as_mut().ok_or(anyhow!("Read source for sample {sample_index} is not open"))
    }
}

/// Best-effort text of a caught panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs all jobs on the current rayon pool, returning the outcomes sorted by job id.
/// Failures, including panics, are logged here and returned in the outcome; sibling jobs are unaffected.
/// # Arguments
/// * `jobs` - the jobs to run, usually from `LocusJob::enumerate`
/// * `inputs` - shared variant index, reference, known sites, and thresholds
/// * `open_source` - opens the read source for a sample index
pub fn run_jobs<S, F>(jobs: Vec<LocusJob>, inputs: JobInputs, open_source: F) -> Vec<JobOutcome>
where
    S: ReadSource,
    F: Fn(usize) -> anyhow::Result<S> + Send + Sync
{
    let style = get_progress_style();
    let mut outcomes: Vec<JobOutcome> = jobs.into_par_iter()
        .map_init(
            WorkerState::<S>::new,
            |state, job| {
                let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                    inputs.locus_context(job)
                        .and_then(|context| {
                            let source = state.source_for(job.sample_index(), &open_source)?;
                            debug!("J#{} Processing sample {} at {}:{}", job.job_id(), job.sample_index(), context.chrom, job.position() + 1);
                            process_job(&context, source)
                        })
                }));
                let result = caught.unwrap_or_else(|payload| {
                    // the source may be mid-query, so the next job on this worker reopens it
                    state.source = None;
                    state.sample_index = None;
                    Err(anyhow!("Job panicked: {}", panic_message(payload.as_ref())))
                });
                if let Err(e) = result.as_ref() {
                    let chrom = inputs.index.chromosome(job.chrom_index()).map(|(c, _p)| c).unwrap_or("?");
                    error!("Error while processing job #{} (sample {}, {chrom}:{}): {e:#}", job.job_id(), job.sample_index(), job.position() + 1);
                }
                JobOutcome { job, result }
            }
        )
        .progress_with_style(style)
        .collect();
    outcomes.sort_by_key(|o| o.job.job_id());
    outcomes
}

/// Merges job deltas into the index in job order
/// # Returns
/// The number of failed jobs
pub fn apply_outcomes(index: &mut VariantIndex, outcomes: Vec<JobOutcome>) -> usize {
    let mut num_failed = 0;
    for outcome in outcomes.into_iter() {
        match outcome.result {
            Ok(deltas) => {
                let sample_index = outcome.job.sample_index();
                for (variant_id, delta) in deltas.into_iter() {
                    *index.statistics_mut(variant_id, sample_index) += delta;
                }
            },
            Err(_e) => {
                num_failed += 1;
            }
        }
    }
    num_failed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::aligned_read::{AlignedRead, CigarKind, CigarOp};
    use crate::data_types::variants::VariantEntry;
    use crate::parsing::read_source::InMemoryReadSource;

    //                          0         1         2         3         4         5
    //                          012345678901234567890123456789012345678901234567890123456789
    const CHROM: &str = "GATCCTAGGCATTGACCGTAACGGTCAAGTTCGACTGGATCACAGTTGCCATGAACTCAG";

    fn reference() -> ReferenceGenome {
        let mut reference_genome = ReferenceGenome::empty_reference();
        reference_genome.add_contig("chr1".to_string(), CHROM.into()).unwrap();
        reference_genome
    }

    fn build_index(num_samples: usize) -> VariantIndex {
        let chrom = CHROM.as_bytes();
        let mut index = VariantIndex::default();
        // SNV at 30 (T -> A) and an insertion after the A at 20
        index.insert(VariantEntry::new("chr1".to_string(), 30, b"T", b"A", chrom, vec!["snv".to_string()], num_samples).unwrap());
        index.insert(VariantEntry::new("chr1".to_string(), 20, b"A", b"AGG", chrom, vec!["ins".to_string()], num_samples).unwrap());
        index
    }

    fn matched_read(name: &str, start: u64, bases: &[u8], is_reverse: bool) -> AlignedRead {
        AlignedRead {
            name: name.as_bytes().to_vec(),
            start,
            cigar: vec![CigarOp::new(CigarKind::Match, bases.len() as u64)],
            bases: bases.to_vec(),
            qualities: vec![40; bases.len()],
            mapq: 60,
            is_reverse
        }
    }

    /// Reads for sample 0 carry the SNV alt on both mates, sample 1 is all reference
    fn sample_reads(sample_index: usize) -> Vec<(String, AlignedRead)> {
        let chrom = CHROM.as_bytes();
        let mut alt_window = chrom[15..45].to_vec();
        if sample_index == 0 {
            alt_window[15] = b'A';
        }
        (0..6)
            .map(|i| {
                let name = format!("frag{}", i / 2);
                ("chr1".to_string(), matched_read(&name, 15, &alt_window, i % 2 == 1))
            })
            .collect()
    }

    fn run(num_threads: usize) -> VariantIndex {
        let reference_genome = reference();
        let mut index = build_index(2);
        let jobs = LocusJob::enumerate(&index, 2);
        let config = EngineConfig::default();
        let inputs = JobInputs {
            index: &index,
            reference_genome: &reference_genome,
            known_sites: None,
            config: &config
        };
        let pool = rayon::ThreadPoolBuilder::new().num_threads(num_threads).build().unwrap();
        let outcomes = pool.install(|| {
            run_jobs(jobs, inputs, |sample_index| Ok(InMemoryReadSource::new(sample_reads(sample_index))))
        });
        assert_eq!(apply_outcomes(&mut index, outcomes), 0);
        index
    }

    #[test]
    fn test_engine_config() {
        let config = EngineConfigBuilder::default()
            .min_alignment_rate(0.5)
            .build().unwrap();
        assert_eq!(config.min_alignment_rate(), 0.5);
        assert_eq!(config.min_hq_base_quality(), 30);
        assert_eq!(config.min_hq_mapping_quality(), 40);
        assert_eq!(config.min_match_length(), 15);
        assert_eq!(config.pileup_tolerance(), 5);
        assert_eq!(config.max_mismatches(), 5);
    }

    #[test]
    fn test_run_jobs() {
        let index = run(2);
        let snv = &index.entry(0).statistics();
        assert_eq!(snv[0].total_depth, 3);
        assert_eq!(snv[0].alt_depth, 3);
        assert_eq!(snv[0].alt_bias, [3, 3]);
        assert_eq!(snv[1].total_depth, 3);
        assert_eq!(snv[1].alt_depth, 0);

        // the insertion is never supported
        let ins = &index.entry(1).statistics();
        for stats in ins.iter() {
            assert_eq!(stats.alt_depth, 0);
            assert!(stats.total_depth > 0);
        }
    }

    #[test]
    fn test_deterministic() {
        let first = run(4);
        let second = run(4);
        let single = run(1);
        for variant_id in 0..first.len() {
            assert_eq!(first.entry(variant_id).statistics(), second.entry(variant_id).statistics());
            assert_eq!(first.entry(variant_id).statistics(), single.entry(variant_id).statistics());
        }
    }

    #[test]
    fn test_failed_jobs() {
        let reference_genome = reference();
        let mut index = build_index(2);
        let jobs = LocusJob::enumerate(&index, 2);
        assert_eq!(jobs.len(), 4);
        let config = EngineConfig::default();
        let inputs = JobInputs {
            index: &index,
            reference_genome: &reference_genome,
            known_sites: None,
            config: &config
        };

        // sample 1 cannot be opened, sample 0 still gets counted
        let outcomes = run_jobs(jobs, inputs, |sample_index| {
            if sample_index == 1 {
                Err(anyhow!("missing file"))
            } else {
                Ok(InMemoryReadSource::new(sample_reads(sample_index)))
            }
        });
        assert!(outcomes.windows(2).all(|w| w[0].job.job_id() < w[1].job.job_id()));
        assert_eq!(apply_outcomes(&mut index, outcomes), 2);
        assert_eq!(index.entry(0).statistics()[0].alt_depth, 3);
        assert_eq!(index.entry(0).statistics()[1], Statistics::default());
    }

    /// Wraps the in-memory source and panics on every query when `panics` is set
    struct FlakySource {
        inner: InMemoryReadSource,
        panics: bool
    }

    impl ReadSource for FlakySource {
        fn set_regions(&mut self, chrom: &str, regions: &[(i64, i64)]) -> anyhow::Result<()> {
            if self.panics {
                panic!("corrupt record in {chrom}");
            }
            self.inner.set_regions(chrom, regions)
        }

        fn read_next(&mut self) -> anyhow::Result<Option<AlignedRead>> {
            self.inner.read_next()
        }
    }

    #[test]
    fn test_panicking_job() {
        let reference_genome = reference();
        let mut index = build_index(2);
        let jobs = LocusJob::enumerate(&index, 2);
        let config = EngineConfig::default();
        let inputs = JobInputs {
            index: &index,
            reference_genome: &reference_genome,
            known_sites: None,
            config: &config
        };

        // every job for sample 1 panics, sample 0 still merges
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let outcomes = pool.install(|| {
            run_jobs(jobs, inputs, |sample_index| Ok(FlakySource {
                inner: InMemoryReadSource::new(sample_reads(sample_index)),
                panics: sample_index == 1
            }))
        });
        assert_eq!(outcomes.len(), 4);
        let failed: Vec<&JobOutcome> = outcomes.iter().filter(|o| o.result.is_err()).collect();
        assert_eq!(failed.len(), 2);
        for outcome in failed.iter() {
            assert_eq!(outcome.job.sample_index(), 1);
            let message = format!("{:#}", outcome.result.as_ref().unwrap_err());
            assert!(message.contains("corrupt record in chr1"));
        }

        assert_eq!(apply_outcomes(&mut index, outcomes), 2);
        let snv = index.entry(0).statistics();
        assert_eq!(snv[0].total_depth, 3);
        assert_eq!(snv[0].alt_depth, 3);
        assert_eq!(snv[1], Statistics::default());
        assert!(index.entry(1).statistics()[0].total_depth > 0);
        assert_eq!(index.entry(1).statistics()[1], Statistics::default());
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(&"static text"), "static text");
        assert_eq!(panic_message(&"owned".to_string()), "owned");
        assert_eq!(panic_message(&7_u32), "unknown panic payload");
    }
}
