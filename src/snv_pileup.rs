/*!
Single-position pileup evidence for loci where every variant is an SNV.
Each read spanning the locus contributes the base and quality it shows there, and mates of one fragment are merged so that a fragment counts once toward depth.
*/

use rustc_hash::FxHashMap;
use std::cmp::Ordering;

use crate::data_types::aligned_read::{AlignedRead, CigarKind};
use crate::data_types::statistics::Statistics;
use crate::job_scheduler::{EngineConfig, LocusContext, StatisticsDelta};
use crate::parsing::known_sites::is_known_allele;
use crate::parsing::read_source::ReadSource;

/// What one read shows at the SNV position
#[derive(Clone, Copy, Debug, PartialEq)]
struct PileupRead {
    /// true if the read has more mismatches than allowed
    mismatches_too_high: bool,
    mapq: u8,
    /// observed base at the locus
    base: u8,
    /// base quality at the locus
    quality: u8,
    /// leftmost aligned position
    start: u64
}

impl PileupRead {
    fn is_hq(&self, config: &EngineConfig) -> bool {
        self.mapq >= config.min_hq_mapping_quality() && self.quality >= config.min_hq_base_quality()
    }
}

/// Counts single-position evidence for a cluster of SNVs
/// # Arguments
/// * `context` - the job; every variant in the cluster must be an SNV
/// * `read_source` - reads for the job sample
/// # Errors
/// * if the read source fails
pub fn process_snv_locus<S: ReadSource>(context: &LocusContext, read_source: &mut S) -> anyhow::Result<StatisticsDelta> {
    let position = context.position();
    read_source.set_region(context.chrom, position, 1)?;

    // template name -> [forward, reverse]
    let mut fragments: FxHashMap<Vec<u8>, [Option<PileupRead>; 2]> = Default::default();
    while let Some(read) = read_source.read_next()? {
        if let Some(pileup_read) = scan_read(&read, context) {
            let strand = read.strand();
            fragments.entry(read.name).or_default()[strand.index()] = Some(pileup_read);
        }
    }

    let mut deltas: StatisticsDelta = context.cluster.iter()
        .map(|e| (e.variant_id, Statistics { total_depth: fragments.len() as u64, ..Default::default() }))
        .collect();

    for mates in fragments.values() {
        for (variant_id, statistics) in deltas.iter_mut() {
            let alt_base = context.index.entry(*variant_id).alt_allele()[0];
            count_fragment(statistics, mates, alt_base, position, context.config);
        }
    }

    Ok(deltas)
}

/// Walks the CIGAR once, counting mismatches over the matched bases and picking up the base at the locus.
/// Returns None if the locus is deleted/skipped, the read is not observed there, or too little of the read is matched.
fn scan_read(read: &AlignedRead, context: &LocusContext) -> Option<PileupRead> {
    let position = context.position();
    let mut ref_pos = read.start;
    let mut query_pos: usize = 0;
    let mut match_length = 0;
    let mut num_mismatches = 0;
    let mut observed: Option<(u8, u8)> = None;

    for op in read.cigar.iter() {
        let len = op.len;
        match op.kind {
            CigarKind::Deletion | CigarKind::Skip => {
                if ref_pos <= position && position < ref_pos + len {
                    return None;
                }
                ref_pos += len;
            },
            CigarKind::Insertion | CigarKind::SoftClip => {
                query_pos += len as usize;
            },
            CigarKind::Match => {
                match_length += len;
                for i in 0..len {
                    let r = ref_pos + i;
                    let Some(&base) = read.bases.get(query_pos + i as usize) else {
                        break;
                    };
                    let is_mismatch = if context.known_sites.is_some_and(|ks| ks.contains_key(&r)) {
                        !is_known_allele(context.known_sites, r, base)
                    } else {
                        let ref_base = context.chrom_seq.get(r as usize).copied().unwrap_or(b'N');
                        !base.eq_ignore_ascii_case(&ref_base)
                    };
                    num_mismatches += u64::from(is_mismatch);
                }

                if ref_pos <= position && position < ref_pos + len {
                    let offset = query_pos + (position - ref_pos) as usize;
                    observed = read.bases.get(offset)
                        .map(|&b| (b.to_ascii_uppercase(), read.quality_at(offset)));
                }
                ref_pos += len;
                query_pos += len as usize;
            },
            CigarKind::HardClip | CigarKind::Pad => {}
        }
    }

    if match_length < context.config.min_match_length() {
        return None;
    }
    let (base, quality) = observed?;
    Some(PileupRead {
        mismatches_too_high: num_mismatches > context.config.max_mismatches(),
        mapq: read.mapq,
        base,
        quality,
        start: read.start
    })
}

/// Adds one fragment to the statistics of a single variant.
/// Strand bias counts every alt mate; alt depth follows the mate with the better base quality, or either mate on a tie.
fn count_fragment(statistics: &mut Statistics, mates: &[Option<PileupRead>; 2], alt_base: u8, position: u64, config: &EngineConfig) {
    let is_alt = |r: &PileupRead| r.base == alt_base;
    let is_hq_alt = |r: &PileupRead| r.is_hq(config) && is_alt(r);

    let mut fragment_hq = false;
    for (strand, read) in mates.iter().enumerate() {
        let Some(read) = read else {
            continue;
        };
        fragment_hq |= read.is_hq(config);
        if is_alt(read) {
            statistics.alt_bias[strand] += 1;
            statistics.hq_alt_bias[strand] += u64::from(read.is_hq(config));
            statistics.mismatches_too_high += u64::from(read.mismatches_too_high);
            statistics.add_start_offset(read.start as i64 - position as i64);
        }
    }
    statistics.hq_depth += u64::from(fragment_hq);

    let (alt, hq_alt) = match mates {
        [Some(fw), Some(rv)] => match fw.quality.cmp(&rv.quality) {
            Ordering::Greater => (is_alt(fw), is_hq_alt(fw)),
            Ordering::Less => (is_alt(rv), is_hq_alt(rv)),
            Ordering::Equal => (is_alt(fw) || is_alt(rv), is_hq_alt(fw) || is_hq_alt(rv))
        },
        [Some(read), None] | [None, Some(read)] => (is_alt(read), is_hq_alt(read)),
        [None, None] => (false, false)
    };
    statistics.alt_depth += u64::from(alt);
    statistics.hq_alt_depth += u64::from(hq_alt);
}
