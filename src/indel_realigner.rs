/*!
Realignment-based evidence for indels, duplications, and SNVs that share a locus with them.
Every fragment near the locus is aligned against synthetic candidate references (the plain reference and one per nearby variant),
then assigned in two passes: confident calls first, and tied calls afterwards using the first pass as corroborating evidence.
*/

use log::trace;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;

use crate::data_types::aligned_read::AlignedRead;
use crate::data_types::statistics::{DuplicationEstimate, Statistics};
use crate::data_types::variant_index::VariantId;
use crate::data_types::variants::VariantKind;
use crate::job_scheduler::{EngineConfig, LocusContext, StatisticsDelta};
use crate::parsing::read_source::ReadSource;
use crate::util::intervals::{breakpoint_windows, merge_intervals};
use crate::util::local_alignment::{encode_quality_aware, max_attainable_score, LocalAligner};

/// What a candidate reference represents
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
enum CandidateTarget {
    /// the unmodified reference over one coverage interval
    Reference(usize),
    /// a variant allele spliced into the reference
    Variant(VariantId)
}

/// A synthetic alignment target
#[derive(Debug)]
struct Candidate {
    target: CandidateTarget,
    /// true if this candidate is evaluated by the current job, false for neighbors
    in_job_set: bool,
    aligner: LocalAligner
}

/// All candidates for a job, with lookup by the breakpoint positions they touch
#[derive(Debug, Default)]
struct CandidateSet {
    candidates: Vec<Candidate>,
    by_position: BTreeMap<i64, Vec<usize>>
}

impl CandidateSet {
    fn push(&mut self, target: CandidateTarget, in_job_set: bool, sequence: &[u8], positions: &[i64]) -> usize {
        let candidate_index = self.candidates.len();
        self.candidates.push(Candidate {
            target,
            in_job_set,
            aligner: LocalAligner::new(sequence)
        });
        for &p in positions.iter() {
            self.by_position.entry(p).or_default().push(candidate_index);
        }
        candidate_index
    }

    /// Indexes the plain reference under each position that has nothing yet
    fn key_reference(&mut self, reference_index: usize, positions: &[i64]) {
        for &p in positions.iter() {
            self.by_position.entry(p).or_insert_with(|| vec![reference_index]);
        }
    }

    /// Candidates keyed inside an inclusive span, in position order
    fn overlapping(&self, span: (i64, i64)) -> Vec<usize> {
        if span.1 < span.0 {
            return vec![];
        }
        self.by_position.range(span.0..=span.1)
            .flat_map(|(_p, indices)| indices.iter().copied())
            .collect()
    }
}

/// A read prepared for realignment
#[derive(Clone, Debug)]
struct RealignRead {
    is_hq: bool,
    /// soft-clip inclusive span, clamped to the chromosome
    span: (i64, i64),
    /// quality-aware encoded bases
    query: Vec<u8>,
    max_score: i32,
    start: u64
}

impl RealignRead {
    fn new(read: &AlignedRead, chrom_len: usize, config: &EngineConfig) -> Option<Self> {
        if read.bases.is_empty() {
            return None;
        }
        let (begin, end) = read.soft_clipped_span();
        let min_quality = config.min_hq_base_quality();
        Some(Self {
            is_hq: read.mapq >= config.min_hq_mapping_quality(),
            span: (begin.max(0), end.min(chrom_len as i64 - 1)),
            query: encode_quality_aware(&read.bases, &read.qualities, min_quality),
            max_score: max_attainable_score(&read.qualities, read.bases.len(), min_quality),
            start: read.start
        })
    }
}

/// Scores of one fragment against one target
#[derive(Clone, Copy, Debug, Default)]
struct TargetScore {
    in_job_set: bool,
    mates: [Option<i32>; 2]
}

impl TargetScore {
    fn mate_score(&self, strand: usize) -> i32 {
        self.mates[strand].unwrap_or(0)
    }
}

/// Outcome of aligning one mate in the first pass
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum MateCall {
    /// best alignment rate is under the minimum
    Unknown,
    /// more than one target shares the best score
    Ambiguous,
    Resolved(CandidateTarget)
}

/// Fragments left for the second pass
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum Deferred {
    /// only this strand is usable, and it is tied
    Read(usize),
    /// both strands are usable, tied or in disagreement
    Fragment
}

#[derive(Debug, Default)]
struct Fragment {
    reads: [Option<RealignRead>; 2],
    scores: BTreeMap<CandidateTarget, TargetScore>,
    deferred: Option<Deferred>
}

/// Running counts for one job
#[derive(Debug, Default)]
struct LocusTally {
    statistics: BTreeMap<CandidateTarget, Statistics>,
    /// first pass assignments for every target, including neighbors
    support: FxHashMap<CandidateTarget, u64>,
    /// fragments given a concrete allele
    assigned: u64
}

impl LocusTally {
    fn count_unknown(&mut self, scores: &BTreeMap<CandidateTarget, TargetScore>) {
        for (&target, _score) in scores.iter().filter(|(_t, s)| s.in_job_set) {
            let statistics = self.statistics.entry(target).or_default();
            statistics.total_depth += 1;
            statistics.unknown += 1;
        }
    }

    fn count_ambiguous(&mut self, scores: &BTreeMap<CandidateTarget, TargetScore>, is_tied: impl Fn(&TargetScore) -> bool) {
        for (&target, score) in scores.iter().filter(|(_t, s)| s.in_job_set) {
            let statistics = self.statistics.entry(target).or_default();
            statistics.total_depth += 1;
            statistics.ambiguous += u64::from(is_tied(score));
        }
    }

    /// Assigns a fragment to `winner`; `mates` lists the (strand, read start) of every read backing the call
    fn assign(
        &mut self, scores: &BTreeMap<CandidateTarget, TargetScore>, winner: CandidateTarget,
        mates: &[(usize, u64)], is_hq: bool, context: &LocusContext
    ) {
        for (&target, _score) in scores.iter().filter(|(_t, s)| s.in_job_set) {
            let statistics = self.statistics.entry(target).or_default();
            statistics.total_depth += 1;
            statistics.hq_depth += u64::from(is_hq);
        }
        self.assigned += 1;

        if !scores.get(&winner).is_some_and(|s| s.in_job_set) {
            return;
        }
        let statistics = self.statistics.entry(winner).or_default();
        statistics.alt_depth += 1;
        statistics.hq_alt_depth += u64::from(is_hq);
        for &(strand, start) in mates.iter() {
            statistics.alt_bias[strand] += 1;
            statistics.hq_alt_bias[strand] += u64::from(is_hq);
            if let CandidateTarget::Variant(variant_id) = winner {
                statistics.add_start_offset(start as i64 - context.index.entry(variant_id).pos1() as i64);
            }
        }
    }
}

/// Builds the alternate sequence for one variant seen from index key `key` (paired with `paired`) inside `interval`.
/// Returns the sequence and the positions to index it under, or None if the variant has no effect here.
fn variant_candidate(
    context: &LocusContext, variant_id: VariantId, key: i64, paired: i64,
    interval: (i64, i64), job_paired_max: i64
) -> Option<(Vec<u8>, Vec<i64>)> {
    let variant = context.index.entry(variant_id);
    let (begin, end) = interval;
    let chrom_seq = context.chrom_seq;
    let job_position = context.position() as i64;
    let ref_len = variant.ref_allele().len();
    let alt = variant.alt_allele();
    let alt_len = alt.len() as i64;

    match variant.kind() {
        VariantKind::Snv => {
            let sequence = splice(chrom_seq, begin, end, key - begin, 1, &alt[..1]);
            Some((sequence, vec![key]))
        },
        VariantKind::Deletion if key < paired => {
            let (pos1, pos2) = (key, paired);
            if pos1 == end {
                return None;
            }
            let pad_begin = pos1.min(begin)
                - ((pos2 - 1).min(job_position - 1) - pos1.max(begin) + 1 - alt_len).max(0);
            let shift = if pos1 >= job_paired_max { alt_len } else { 0 };
            let pad_end = (pos2 - 1).max(end)
                + ((pos2 - 1).min(end) - pos1.max(job_paired_max) + 1 - shift).max(0);
            let (pad_begin, pad_end) = clamp(chrom_seq, pad_begin, pad_end);
            let sequence = splice(chrom_seq, pad_begin, pad_end, pos1 - pad_begin, ref_len, alt);
            Some((sequence, vec![pos1, pos2]))
        },
        VariantKind::Deletion => {
            // seen from the far breakpoint, only matters if the start is left of this interval
            let (pos1, pos2) = (paired, key);
            if pos2 == begin || pos1 >= begin {
                return None;
            }
            let pad_begin = pos1
                - ((pos2 - 1).min(job_position - 1) - begin + 1 - alt_len).max(0);
            let shift = if pos2 >= job_paired_max { alt_len } else { 0 };
            let pad_end = (pos2 - 1).max(end)
                + ((pos2 - 1).min(end) - pos1.max(job_paired_max) + 1 - shift).max(0);
            let (pad_begin, pad_end) = clamp(chrom_seq, pad_begin, pad_end);
            let sequence = splice(chrom_seq, pad_begin, pad_end, pos1 - pad_begin, ref_len, alt);
            Some((sequence, vec![pos1, pos2]))
        },
        VariantKind::Insertion |
        VariantKind::InternalTandemDuplication |
        VariantKind::PartialTandemDuplication => {
            let (pos1, pos2) = (key, paired);
            if pos1 >= pos2 || pos1 == end {
                return None;
            }
            let sequence = splice(chrom_seq, begin, end, pos1 - begin, ref_len, alt);
            Some((sequence, vec![pos1, pos2]))
        }
    }
}

fn clamp(chrom_seq: &[u8], begin: i64, end: i64) -> (i64, i64) {
    (begin.max(0), end.min(chrom_seq.len() as i64 - 1))
}

/// Upper-case copy of `[begin, end]` with `ref_len` bases at `offset` replaced by `alt`
fn splice(chrom_seq: &[u8], begin: i64, end: i64, offset: i64, ref_len: usize, alt: &[u8]) -> Vec<u8> {
    let mut sequence = reference_slice(chrom_seq, begin, end);
    let offset = (offset.max(0) as usize).min(sequence.len());
    let stop = (offset + ref_len).min(sequence.len());
    sequence.splice(offset..stop, alt.iter().copied());
    sequence
}

fn reference_slice(chrom_seq: &[u8], begin: i64, end: i64) -> Vec<u8> {
    let (begin, end) = clamp(chrom_seq, begin, end);
    if end < begin {
        return vec![];
    }
    chrom_seq[begin as usize..=end as usize].to_ascii_uppercase()
}

/// Builds the plain and variant candidates over every coverage interval
fn build_candidates(context: &LocusContext, intervals: &[(i64, i64)], job_set: &FxHashSet<VariantId>) -> CandidateSet {
    let mut candidate_set = CandidateSet::default();
    let Some(positions) = context.index.positions(context.chrom) else {
        return candidate_set;
    };

    // plain references come first so that their index matches the interval index
    for (interval_index, &(begin, end)) in intervals.iter().enumerate() {
        let sequence = reference_slice(context.chrom_seq, begin, end);
        candidate_set.push(CandidateTarget::Reference(interval_index), true, &sequence, &[]);
    }

    let job_position = context.position() as i64;
    let job_paired_max = context.cluster.iter()
        .map(|e| e.paired_position as i64)
        .max()
        .unwrap_or(0);
    let job_interval = intervals.iter().position(|&(b, e)| b <= job_position && job_position <= e);
    let mut built: FxHashSet<VariantId> = Default::default();

    for (interval_index, &(begin, end)) in intervals.iter().enumerate() {
        for (&key, cluster) in positions.range(begin.max(0) as u64..=end.max(0) as u64) {
            for entry in cluster.iter() {
                let variant_id = entry.variant_id;
                let in_job_set = job_set.contains(&variant_id);
                if in_job_set {
                    // job variants get a single candidate
                    let designated = match job_interval {
                        Some(ji) => ji == interval_index,
                        None => !built.contains(&variant_id)
                    };
                    if !designated {
                        continue;
                    }
                }

                let Some((sequence, keys)) = variant_candidate(
                    context, variant_id, key as i64, entry.paired_position as i64, (begin, end), job_paired_max
                ) else {
                    continue;
                };
                candidate_set.key_reference(interval_index, &keys);
                candidate_set.push(CandidateTarget::Variant(variant_id), in_job_set, &sequence, &keys);
                if in_job_set {
                    built.insert(variant_id);
                }
            }
        }
    }

    trace!("Built {} candidates over {} intervals", candidate_set.candidates.len(), intervals.len());
    candidate_set
}

/// Aligns one mate against every candidate keyed inside its span.
/// Each target is scored once per strand even if it is indexed under several positions.
fn score_mate(
    read: &RealignRead, strand: usize, scores: &mut BTreeMap<CandidateTarget, TargetScore>,
    candidate_set: &mut CandidateSet, min_alignment_rate: f64
) -> anyhow::Result<MateCall> {
    let mut best_score = 0;
    let mut num_best = 0;
    let mut best_target = None;
    for candidate_index in candidate_set.overlapping(read.span) {
        let candidate = &mut candidate_set.candidates[candidate_index];
        let target_score = scores.entry(candidate.target)
            .or_insert_with(|| TargetScore { in_job_set: candidate.in_job_set, mates: [None; 2] });
        if target_score.mates[strand].is_some() {
            continue;
        }

        let score = candidate.aligner.align(&read.query)?;
        target_score.mates[strand] = Some(score);
        if score == best_score {
            num_best += 1;
        } else if score > best_score {
            best_score = score;
            num_best = 1;
            best_target = Some(candidate.target);
        }
    }

    let rate = best_score as f64 / read.max_score.max(1) as f64;
    let call = match best_target {
        Some(target) if rate >= min_alignment_rate => {
            if num_best > 1 {
                MateCall::Ambiguous
            } else {
                MateCall::Resolved(target)
            }
        },
        _ => MateCall::Unknown
    };
    Ok(call)
}

/// Among targets tied at the best score on `strand`, returns the best score and the target if exactly one has first pass support
fn unique_anchor(
    scores: &BTreeMap<CandidateTarget, TargetScore>, strand: usize, anchors: &FxHashSet<CandidateTarget>
) -> (i32, Option<CandidateTarget>) {
    let best_score = scores.values()
        .map(|s| s.mate_score(strand))
        .max()
        .unwrap_or(0)
        .max(0);
    let anchored: Vec<CandidateTarget> = scores.iter()
        .filter(|(t, s)| s.mate_score(strand) == best_score && anchors.contains(*t))
        .map(|(&t, _s)| t)
        .collect();
    let anchor = if anchored.len() == 1 { Some(anchored[0]) } else { None };
    (best_score, anchor)
}

/// Realigns every fragment around the locus and counts allele support for the variants of this job
/// # Arguments
/// * `context` - the job
/// * `read_source` - reads for the job sample
/// # Errors
/// * if the read source or the aligner fail
pub fn process_indel_locus<S: ReadSource>(context: &LocusContext, read_source: &mut S) -> anyhow::Result<StatisticsDelta> {
    let config = context.config;
    let job_position = context.position();
    let chrom_len = context.chrom_seq.len();

    // query windows around every breakpoint in the cluster
    let breakpoints: Vec<u64> = std::iter::once(job_position)
        .chain(context.cluster.iter().map(|e| e.paired_position))
        .collect();
    let windows = breakpoint_windows(&breakpoints, config.pileup_tolerance(), chrom_len as u64);
    read_source.set_regions(context.chrom, &windows)?;

    // gather fragments, last read wins per slot
    let mut fragments: BTreeMap<Vec<u8>, Fragment> = Default::default();
    let mut spans = vec![];
    while let Some(read) = read_source.read_next()? {
        let Some(realign_read) = RealignRead::new(&read, chrom_len, config) else {
            continue;
        };
        if realign_read.span.0 <= realign_read.span.1 {
            spans.push(realign_read.span);
        }
        let strand = read.strand();
        fragments.entry(read.name).or_default().reads[strand.index()] = Some(realign_read);
    }
    if fragments.is_empty() {
        return Ok(vec![]);
    }

    let intervals = merge_intervals(spans);
    let job_set: FxHashSet<VariantId> = context.cluster.iter()
        .filter(|e| job_position <= e.paired_position)
        .map(|e| e.variant_id)
        .collect();
    let mut candidate_set = build_candidates(context, &intervals, &job_set);

    // first pass: confident assignments
    let mut tally = LocusTally::default();
    for fragment in fragments.values_mut() {
        let mut calls: [Option<MateCall>; 2] = [None, None];
        for (strand, call) in calls.iter_mut().enumerate() {
            if let Some(read) = fragment.reads[strand].as_ref() {
                *call = Some(score_mate(read, strand, &mut fragment.scores, &mut candidate_set, config.min_alignment_rate())?);
            }
        }

        let fw = fragment.reads[0].as_ref();
        let rv = fragment.reads[1].as_ref();
        let read_call = |strand: usize, target: CandidateTarget| {
            let read = if strand == 0 { fw } else { rv };
            (target, vec![(strand, read.map(|r| r.start).unwrap_or(0))], read.is_some_and(|r| r.is_hq))
        };

        let assignment = match calls {
            [None, None] => None,
            [Some(MateCall::Unknown), None] |
            [None, Some(MateCall::Unknown)] |
            [Some(MateCall::Unknown), Some(MateCall::Unknown)] => {
                tally.count_unknown(&fragment.scores);
                None
            },
            [Some(MateCall::Resolved(a)), Some(MateCall::Resolved(b))] => {
                if a == b {
                    let starts = vec![(0, fw.map(|r| r.start).unwrap_or(0)), (1, rv.map(|r| r.start).unwrap_or(0))];
                    let is_hq = fw.is_some_and(|r| r.is_hq) || rv.is_some_and(|r| r.is_hq);
                    Some((a, starts, is_hq))
                } else {
                    fragment.deferred = Some(Deferred::Fragment);
                    None
                }
            },
            [Some(MateCall::Resolved(t)), _] => Some(read_call(0, t)),
            [_, Some(MateCall::Resolved(t))] => Some(read_call(1, t)),
            [Some(MateCall::Ambiguous), Some(MateCall::Ambiguous)] => {
                fragment.deferred = Some(Deferred::Fragment);
                None
            },
            [Some(MateCall::Ambiguous), _] => {
                fragment.deferred = Some(Deferred::Read(0));
                None
            },
            [_, Some(MateCall::Ambiguous)] => {
                fragment.deferred = Some(Deferred::Read(1));
                None
            }
        };

        if let Some((winner, mates, is_hq)) = assignment {
            tally.assign(&fragment.scores, winner, &mates, is_hq, context);
            *tally.support.entry(winner).or_default() += 1;
        }
    }

    // second pass: ties broken by first pass support
    let anchors: FxHashSet<CandidateTarget> = tally.support.iter()
        .filter(|(_t, &count)| count > 0)
        .map(|(&t, _count)| t)
        .collect();
    for fragment in fragments.values() {
        match fragment.deferred {
            Some(Deferred::Read(strand)) => {
                let Some(read) = fragment.reads[strand].as_ref() else {
                    continue;
                };
                let (best_score, anchor) = unique_anchor(&fragment.scores, strand, &anchors);
                match anchor {
                    Some(winner) => tally.assign(&fragment.scores, winner, &[(strand, read.start)], read.is_hq, context),
                    None => tally.count_ambiguous(&fragment.scores, |s| s.mate_score(strand) == best_score)
                }
            },
            Some(Deferred::Fragment) => {
                let (Some(fw), Some(rv)) = (fragment.reads[0].as_ref(), fragment.reads[1].as_ref()) else {
                    continue;
                };
                let (fw_best, fw_anchor) = unique_anchor(&fragment.scores, 0, &anchors);
                let (rv_best, rv_anchor) = unique_anchor(&fragment.scores, 1, &anchors);
                let is_hq = fw.is_hq || rv.is_hq;
                match (fw_anchor, rv_anchor) {
                    (Some(a), Some(b)) if a == b => tally.assign(&fragment.scores, a, &[(0, fw.start), (1, rv.start)], is_hq, context),
                    (Some(a), None) => tally.assign(&fragment.scores, a, &[(0, fw.start)], is_hq, context),
                    (None, Some(b)) => tally.assign(&fragment.scores, b, &[(1, rv.start)], is_hq, context),
                    _ => tally.count_ambiguous(&fragment.scores, |s| s.mate_score(0) == fw_best || s.mate_score(1) == rv_best)
                }
            },
            None => {}
        }
    }

    // duplication VAF re-estimation
    let assigned = tally.assigned;
    let mut statistics: BTreeMap<VariantId, Statistics> = tally.statistics.into_iter()
        .filter_map(|(target, s)| match target {
            CandidateTarget::Variant(variant_id) if job_set.contains(&variant_id) => Some((variant_id, s)),
            _ => None
        })
        .collect();
    for &variant_id in job_set.iter() {
        if context.index.entry(variant_id).kind().is_duplication() {
            let s = statistics.entry(variant_id).or_default();
            s.duplication_estimate = Some(DuplicationEstimate::from_counts(s.alt_depth, s.ambiguous, assigned));
        }
    }

    trace!(
        "{}:{} realigned {} fragments against {} candidates, {assigned} assigned",
        context.chrom, job_position + 1, fragments.len(), candidate_set.candidates.len()
    );
    Ok(statistics.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx_eq::assert_approx_eq;
    use crate::data_types::aligned_read::{CigarKind, CigarOp};
    use crate::data_types::locus_job::LocusJob;
    use crate::data_types::variant_index::VariantIndex;
    use crate::data_types::variants::VariantEntry;
    use crate::parsing::read_source::InMemoryReadSource;

    //                          0         1         2         3         4         5
    //                          012345678901234567890123456789012345678901234567890123456789
    const CHROM: &[u8] = b"GATCCTAGGCATTGACCGTAACGGTCAAGTTCGACTGGATCACAGTTGCCATGAACTCAG";

    fn read(name: &str, start: u64, cigar: Vec<CigarOp>, bases: &[u8], is_reverse: bool) -> AlignedRead {
        AlignedRead {
            name: name.as_bytes().to_vec(),
            start,
            cigar,
            bases: bases.to_vec(),
            qualities: vec![40; bases.len()],
            mapq: 60,
            is_reverse
        }
    }

    fn matched(name: &str, start: u64, bases: &[u8], is_reverse: bool) -> AlignedRead {
        read(name, start, vec![CigarOp::new(CigarKind::Match, bases.len() as u64)], bases, is_reverse)
    }

    /// Reference bases [start, end)
    fn reference(start: usize, end: usize) -> Vec<u8> {
        CHROM[start..end].to_vec()
    }

    fn run(index: &VariantIndex, position: u64, reads: Vec<AlignedRead>) -> BTreeMap<VariantId, Statistics> {
        let config = EngineConfig::default();
        let context = LocusContext {
            job: LocusJob::new(0, 0, 0, position),
            chrom: "chr1",
            chrom_seq: CHROM,
            cluster: index.cluster(0, position),
            index,
            known_sites: None,
            config: &config
        };
        let mut source = InMemoryReadSource::new(reads.into_iter().map(|r| ("chr1".to_string(), r)).collect());
        process_indel_locus(&context, &mut source).unwrap().into_iter().collect()
    }

    /// Insertion of GG after the A at 20
    fn insertion_index() -> VariantIndex {
        let mut index = VariantIndex::default();
        index.insert(VariantEntry::new("chr1".to_string(), 20, b"A", b"AGG", CHROM, vec![], 1).unwrap());
        index
    }

    /// Read carrying the insertion: 11 reference bases, GG, then 10 reference bases
    fn insertion_read(name: &str, is_reverse: bool) -> AlignedRead {
        let mut bases = reference(10, 21);
        bases.extend_from_slice(b"GG");
        bases.extend_from_slice(&reference(21, 31));
        read(name, 10, vec![
            CigarOp::new(CigarKind::Match, 11),
            CigarOp::new(CigarKind::Insertion, 2),
            CigarOp::new(CigarKind::Match, 10)
        ], &bases, is_reverse)
    }

    #[test]
    fn test_splice() {
        assert_eq!(splice(b"acgtacgt", 2, 5, 1, 1, b"GGG"), b"GGGGA".to_vec());
        assert_eq!(splice(b"ACGTACGT", 0, 7, 2, 3, b"G"), b"ACGCGT".to_vec());
        // clamped to the sequence
        assert_eq!(splice(b"ACGT", -2, 10, 3, 4, b"T"), b"ACGT".to_vec());
        assert!(reference_slice(b"ACGT", 3, 2).is_empty());
    }

    #[test]
    fn test_insertion_support() {
        let index = insertion_index();
        let stats = run(&index, 20, vec![
            insertion_read("alt1", false),
            insertion_read("alt2", true),
            matched("ref1", 12, &reference(12, 32), false)
        ]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 3);
        assert_eq!(ins.alt_depth, 2);
        assert_eq!(ins.alt_bias, [1, 1]);
        assert_eq!(ins.hq_depth, 3);
        assert_eq!(ins.hq_alt_depth, 2);
        assert_eq!(ins.unknown, 0);
        assert_eq!(ins.ambiguous, 0);
        assert_eq!(ins.pos_sum, -20);
        assert!(ins.duplication_estimate.is_none());
        assert!(ins.alt_depth <= ins.total_depth);
    }

    #[test]
    fn test_concordant_fragment() {
        let index = insertion_index();
        let stats = run(&index, 20, vec![
            insertion_read("frag", false),
            insertion_read("frag", true)
        ]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.alt_depth, 1);
        assert_eq!(ins.alt_bias, [1, 1]);
    }

    #[test]
    fn test_unknown_fragment() {
        let index = insertion_index();
        let stats = run(&index, 20, vec![
            matched("junk", 15, b"TTTTTTTTTTTTTTTTTTTT", false)
        ]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.unknown, 1);
        assert_eq!(ins.alt_depth, 0);
    }

    #[test]
    fn test_no_reads() {
        let index = insertion_index();
        assert!(run(&index, 20, vec![]).is_empty());
        // reads without bases are ignored
        let empty = read("empty", 18, vec![CigarOp::new(CigarKind::Match, 4)], b"", false);
        assert!(run(&index, 20, vec![empty]).is_empty());
    }

    #[test]
    fn test_tie_is_ambiguous() {
        // ends at the insertion point, so the reference and the insertion score the same
        let index = insertion_index();
        let stats = run(&index, 20, vec![
            matched("tied", 8, &reference(8, 21), false),
            matched("tied", 21, b"TTTTTTTTTT", true)
        ]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.ambiguous, 1);
        assert_eq!(ins.alt_depth, 0);
        assert_eq!(ins.unknown, 0);
    }

    #[test]
    fn test_tie_resolved_by_support() {
        // the insertion gets confident support in the first pass, which breaks the tie
        let index = insertion_index();
        let stats = run(&index, 20, vec![
            matched("tied", 8, &reference(8, 21), false),
            matched("tied", 21, b"TTTTTTTTTT", true),
            insertion_read("alt", false)
        ]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 2);
        assert_eq!(ins.alt_depth, 2);
        assert_eq!(ins.ambiguous, 0);
        assert_eq!(ins.alt_bias, [2, 0]);
    }

    #[test]
    fn test_disagreeing_mates_deferred() {
        // forward mate carries the insertion, reverse mate is plain reference
        let split = || vec![
            insertion_read("split", false),
            matched("split", 12, &reference(12, 32), true)
        ];

        // nothing to anchor on, so the second pass calls it ambiguous
        let stats = run(&insertion_index(), 20, split());
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.alt_depth, 0);
        assert_eq!(ins.ambiguous, 1);
        assert_eq!(ins.hq_depth, 0);

        // only the insertion is anchored, the forward mate decides alone
        let mut reads = split();
        reads.push(insertion_read("alt", false));
        let stats = run(&insertion_index(), 20, reads);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 2);
        assert_eq!(ins.alt_depth, 2);
        assert_eq!(ins.ambiguous, 0);
        assert_eq!(ins.alt_bias, [2, 0]);
        assert_eq!(ins.hq_alt_depth, 2);
        assert_eq!(ins.pos_sum, -20);
    }

    #[test]
    fn test_dual_mate_anchor_rule() {
        // both mates end at the insertion point and tie between reference and insertion
        let tied = || vec![
            matched("tied", 8, &reference(8, 21), false),
            matched("tied", 8, &reference(8, 21), true)
        ];

        // both mates anchor on the insertion and agree
        let mut reads = tied();
        reads.push(insertion_read("alt", false));
        let stats = run(&insertion_index(), 20, reads);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 2);
        assert_eq!(ins.alt_depth, 2);
        assert_eq!(ins.ambiguous, 0);
        assert_eq!(ins.alt_bias, [2, 1]);

        // with the reference anchored too, each tie has two anchors and stays ambiguous
        let mut reads = tied();
        reads.push(insertion_read("alt", false));
        reads.push(matched("ref", 12, &reference(12, 32), false));
        let stats = run(&insertion_index(), 20, reads);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 3);
        assert_eq!(ins.alt_depth, 1);
        assert_eq!(ins.ambiguous, 1);
        assert_eq!(ins.alt_bias, [1, 0]);

        // each mate resolves uniquely but to different anchored alleles: an ambiguous miss
        let stats = run(&insertion_index(), 20, vec![
            insertion_read("split", false),
            matched("split", 12, &reference(12, 32), true),
            insertion_read("alt", false),
            matched("ref", 12, &reference(12, 32), false)
        ]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 3);
        assert_eq!(ins.alt_depth, 1);
        assert_eq!(ins.ambiguous, 1);
        assert_eq!(ins.alt_bias, [1, 0]);
        assert_eq!(ins.hq_depth, 2);
    }

    #[test]
    fn test_far_breakpoint_deletion() {
        // 30 bp deletion 11-40 after the A at 10, with an insertion job next to its far end at 42
        let deletion = || VariantEntry::new("chr1".to_string(), 10, &CHROM[10..40], &CHROM[10..11], CHROM, vec![], 1).unwrap();
        let insertion = || VariantEntry::new("chr1".to_string(), 42, &CHROM[42..43], b"CGG", CHROM, vec![], 1).unwrap();
        let mut index = VariantIndex::default();
        index.insert(deletion());
        index.insert(insertion());
        assert_eq!(index.entry(0).pos2(), 40);
        assert_eq!(index.entry(1).kind(), VariantKind::Insertion);
        assert_eq!(index.entry(1).pos2(), 43);

        // the deletion is seen from key 40 and spliced with context taken from the left of its start
        let config = EngineConfig::default();
        let context = LocusContext {
            job: LocusJob::new(0, 0, 0, 42),
            chrom: "chr1",
            chrom_seq: CHROM,
            cluster: index.cluster(0, 42),
            index: &index,
            known_sites: None,
            config: &config
        };
        let (sequence, keys) = variant_candidate(&context, 0, 40, 10, (31, 55), 43).unwrap();
        let mut expected = reference(2, 11);
        expected.extend_from_slice(&reference(40, 56));
        assert_eq!(sequence, expected);
        assert_eq!(keys, vec![10, 40]);
        // no far candidate when the start is inside the interval
        assert!(variant_candidate(&context, 0, 40, 10, (8, 55), 43).is_none());

        // a read across the deletion junction, soft clipped where it leaves the reference
        let junction = || {
            let mut bases = reference(2, 11);
            bases.extend_from_slice(&reference(40, 56));
            read("junction", 40, vec![
                CigarOp::new(CigarKind::SoftClip, 9),
                CigarOp::new(CigarKind::Match, 16)
            ], &bases, false)
        };
        let stats = run(&index, 42, vec![junction()]);
        assert_eq!(stats.keys().copied().collect::<Vec<VariantId>>(), vec![1]);
        let ins = &stats[&1];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.alt_depth, 0);
        assert_eq!(ins.unknown, 0);
        assert_eq!(ins.hq_depth, 1);

        // without the deletion the same read cannot be placed
        let mut index = VariantIndex::default();
        index.insert(insertion());
        let stats = run(&index, 42, vec![junction()]);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.unknown, 1);
        assert_eq!(ins.alt_depth, 0);
    }

    #[test]
    fn test_fragment_outside_coverage() {
        // forward mate stops short of both insertion keys, reverse mate is outside every window
        let edge = || vec![
            matched("edge", 2, &reference(2, 17), false),
            matched("edge", 45, &reference(45, 60), true)
        ];
        assert!(run(&insertion_index(), 20, edge()).is_empty());

        let mut reads = edge();
        reads.push(insertion_read("alt", false));
        let stats = run(&insertion_index(), 20, reads);
        let ins = &stats[&0];
        assert_eq!(ins.total_depth, 1);
        assert_eq!(ins.alt_depth, 1);
        assert_eq!(ins.unknown, 0);
        assert_eq!(ins.ambiguous, 0);
        assert_eq!(ins.hq_depth, 1);
    }

    #[test]
    fn test_deletion() {
        // deletion of CGG at 21-23, anchored on the A at 20
        let mut index = VariantIndex::default();
        index.insert(VariantEntry::new("chr1".to_string(), 20, b"ACGG", b"A", CHROM, vec![], 1).unwrap());
        assert_eq!(index.entry(0).pos2(), 24);

        let mut deleted = reference(8, 21);
        deleted.extend_from_slice(&reference(24, 36));
        let stats = run(&index, 20, vec![
            read("del", 8, vec![
                CigarOp::new(CigarKind::Match, 13),
                CigarOp::new(CigarKind::Deletion, 3),
                CigarOp::new(CigarKind::Match, 12)
            ], &deleted, false),
            matched("ref", 10, &reference(10, 35), true)
        ]);
        let del = &stats[&0];
        assert_eq!(del.total_depth, 2);
        assert_eq!(del.alt_depth, 1);
        assert_eq!(del.alt_bias, [1, 0]);
        assert_eq!(del.unknown, 0);
        assert_eq!(del.ambiguous, 0);
    }

    #[test]
    fn test_neighbor_not_counted() {
        // SNV at 30 rides along as a neighbor of the insertion job
        let mut index = insertion_index();
        index.insert(VariantEntry::new("chr1".to_string(), 30, b"T", b"A", CHROM, vec![], 1).unwrap());
        let mut snv_bases = reference(15, 45);
        snv_bases[15] = b'A';
        let stats = run(&index, 20, vec![matched("snv", 15, &snv_bases, false)]);

        // only the insertion is written by this job
        assert_eq!(stats.keys().copied().collect::<Vec<VariantId>>(), vec![0]);
        assert_eq!(stats[&0].total_depth, 1);
        assert_eq!(stats[&0].alt_depth, 0);
    }

    #[test]
    fn test_duplication_estimate() {
        // GTTC at 28-31 duplicated after the A at 27
        let mut index = VariantIndex::default();
        index.insert(VariantEntry::new("chr1".to_string(), 27, b"A", b"AGTTC", CHROM, vec![], 1).unwrap());
        assert_eq!(index.entry(0).kind(), VariantKind::InternalTandemDuplication);

        let mut bases = reference(15, 32);
        bases.extend_from_slice(b"GTTC");
        bases.extend_from_slice(&reference(32, 44));
        let stats = run(&index, 27, vec![
            read("itd", 15, vec![
                CigarOp::new(CigarKind::Match, 17),
                CigarOp::new(CigarKind::Insertion, 4),
                CigarOp::new(CigarKind::Match, 12)
            ], &bases, false),
            matched("ref", 12, &reference(12, 44), true)
        ]);
        let itd = &stats[&0];
        assert_eq!(itd.total_depth, 2);
        assert_eq!(itd.alt_depth, 1);
        let estimate = itd.duplication_estimate.unwrap();
        assert_approx_eq!(estimate.vaf, 0.5);
        assert_eq!(estimate.coe, 0.0);
    }
}
