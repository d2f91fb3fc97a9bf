
use std::ops::AddAssign;

/// Read orientation of a mate, also used to index the strand-bias slots
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub enum Strand {
    Forward=0,
    Reverse
}

impl Strand {
    /// Converts the reverse-complement flag into a strand
    pub fn from_is_reverse(is_reverse: bool) -> Self {
        if is_reverse { Strand::Reverse } else { Strand::Forward }
    }

    /// Index into two-slot arrays
    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Bias-corrected allele fraction for duplication-type variants
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DuplicationEstimate {
    /// Corrected variant allele fraction
    pub vaf: f64,
    /// Fraction of non-mutant evidence that could not be separated from the duplication
    pub coe: f64
}

impl DuplicationEstimate {
    /// Re-estimates the allele fraction of an ITD/PTD from the raw counts.
    /// Ambiguous fragments are split evenly, anything left after removing the confident alt reads counts as non-mutant.
    /// # Arguments
    /// * `alt_depth` - fragments confidently assigned to the duplication
    /// * `ambiguous` - fragments that tied between the duplication and something else
    /// * `assigned` - total fragments given a concrete allele in the job
    pub fn from_counts(alt_depth: u64, ambiguous: u64, assigned: u64) -> Self {
        let mutant = alt_depth as f64;
        let non_mutant = (0.5 * ambiguous as f64 - mutant).max(0.0);
        let vaf_denom = (non_mutant + assigned as f64).max(1.0);
        let coe_denom = (non_mutant + assigned as f64 - mutant).max(1.0);
        Self {
            vaf: mutant / vaf_denom,
            coe: non_mutant / coe_denom
        }
    }
}

/// Read evidence gathered for one variant in one sample
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Statistics {
    /// Fragments (or reads) overlapping the locus
    pub total_depth: u64,
    /// Fragments whose best alignment was too poor to call
    pub unknown: u64,
    /// Fragments that tied between alleles
    pub ambiguous: u64,
    /// Fragments supporting the alternate allele
    pub alt_depth: u64,
    /// Alt-supporting mates per strand
    pub alt_bias: [u64; 2],
    /// High-quality fragments
    pub hq_depth: u64,
    /// High-quality alt-supporting fragments
    pub hq_alt_depth: u64,
    /// High-quality alt-supporting mates per strand
    pub hq_alt_bias: [u64; 2],
    /// Alt-supporting mates with too many mismatches elsewhere in the read
    pub mismatches_too_high: u64,
    /// Sum of read start offsets relative to the variant, alt-supporting mates only
    pub pos_sum: i64,
    /// Sum of squared read start offsets
    pub pos_sum2: i64,
    /// Only set for ITD/PTD entries
    pub duplication_estimate: Option<DuplicationEstimate>
}

impl AddAssign for Statistics {
    // Enables += when merging per-job deltas
    fn add_assign(&mut self, rhs: Self) {
        self.total_depth += rhs.total_depth;
        self.unknown += rhs.unknown;
        self.ambiguous += rhs.ambiguous;
        self.alt_depth += rhs.alt_depth;
        self.alt_bias[0] += rhs.alt_bias[0];
        self.alt_bias[1] += rhs.alt_bias[1];
        self.hq_depth += rhs.hq_depth;
        self.hq_alt_depth += rhs.hq_alt_depth;
        self.hq_alt_bias[0] += rhs.hq_alt_bias[0];
        self.hq_alt_bias[1] += rhs.hq_alt_bias[1];
        self.mismatches_too_high += rhs.mismatches_too_high;
        self.pos_sum += rhs.pos_sum;
        self.pos_sum2 += rhs.pos_sum2;
        if rhs.duplication_estimate.is_some() {
            self.duplication_estimate = rhs.duplication_estimate;
        }
    }
}

impl Statistics {
    /// Records the start offset of an alt-supporting read relative to the variant position
    pub fn add_start_offset(&mut self, offset: i64) {
        self.pos_sum += offset;
        self.pos_sum2 += offset * offset;
    }

    /// Number of alt-supporting mates, floored at 1
    pub fn alt_read_depth(&self) -> u64 {
        (self.alt_bias[0] + self.alt_bias[1]).max(1)
    }

    /// Fragments that were assigned to an allele
    pub fn depth(&self) -> u64 {
        self.total_depth.saturating_sub(self.unknown + self.ambiguous)
    }

    /// Converts the raw counters into the reported values.
    /// `start_pos_var` is divided by the alt mate count n, so it is a variance and not the bare `pos_sum2 - pos_sum^2 / n`.
    pub fn report(&self) -> StatisticsReport {
        let depth = self.depth();
        let depth_denom = depth.max(1) as f64;
        let alt_read_depth = self.alt_read_depth() as f64;
        let hq_bias_denom = (self.hq_alt_bias[0] + self.hq_alt_bias[1]).max(1) as f64;

        let pos_sum = self.pos_sum as f64;
        let start_pos_var = (self.pos_sum2 as f64 - pos_sum * pos_sum / alt_read_depth) / alt_read_depth;

        let estimate = self.duplication_estimate.unwrap_or_default();
        StatisticsReport {
            total_depth: self.total_depth,
            unknown: self.unknown,
            ambiguous: self.ambiguous,
            depth,
            alt_depth: self.alt_depth,
            alt_freq: self.alt_depth as f64 / depth_denom,
            alt_bias: self.alt_bias[0] as f64 / alt_read_depth,
            hq_depth: self.hq_depth,
            hq_alt_depth: self.hq_alt_depth,
            hq_alt_freq: self.hq_alt_depth as f64 / self.hq_depth.max(1) as f64,
            hq_alt_bias: self.hq_alt_bias[0] as f64 / hq_bias_denom,
            hq_ratio: self.hq_depth as f64 / depth_denom,
            mismatches: self.mismatches_too_high as f64 / alt_read_depth,
            start_pos_var,
            vaf_itd: estimate.vaf,
            coe_itd: estimate.coe
        }
    }
}

/// Derived per-sample values that end up in the output table
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct StatisticsReport {
    pub total_depth: u64,
    pub unknown: u64,
    pub ambiguous: u64,
    /// total - (unknown + ambiguous)
    pub depth: u64,
    pub alt_depth: u64,
    /// alt_depth / depth
    pub alt_freq: f64,
    /// forward share of alt-supporting mates
    pub alt_bias: f64,
    pub hq_depth: u64,
    pub hq_alt_depth: u64,
    pub hq_alt_freq: f64,
    pub hq_alt_bias: f64,
    /// hq_depth / depth
    pub hq_ratio: f64,
    /// share of alt-supporting mates with too many mismatches
    pub mismatches: f64,
    /// population variance of alt-supporting read start offsets, `(pos_sum2 - pos_sum^2 / n) / n` over n alt mates
    pub start_pos_var: f64,
    pub vaf_itd: f64,
    pub coe_itd: f64
}

/// Column labels for one sample block, in the same order as `StatisticsReport::to_fields`
pub const REPORT_COLUMNS: [&str; 16] = [
    "total_depth", "unknown", "ambiguous", "depth", "alt_depth", "alt_freq", "alt_bias",
    "hq_depth", "hq_alt_depth", "hq_alt_freq", "hq_alt_bias", "hq_ratio",
    "mismatches", "start_pos_var", "vaf_itd", "coe_itd"
];

impl StatisticsReport {
    /// Formats the values in `REPORT_COLUMNS` order
    pub fn to_fields(&self) -> Vec<String> {
        vec![
            self.total_depth.to_string(),
            self.unknown.to_string(),
            self.ambiguous.to_string(),
            self.depth.to_string(),
            self.alt_depth.to_string(),
            format_ratio(self.alt_freq),
            format_ratio(self.alt_bias),
            self.hq_depth.to_string(),
            self.hq_alt_depth.to_string(),
            format_ratio(self.hq_alt_freq),
            format_ratio(self.hq_alt_bias),
            format_ratio(self.hq_ratio),
            format_ratio(self.mismatches),
            format_ratio(self.start_pos_var),
            format_ratio(self.vaf_itd),
            format_ratio(self.coe_itd)
        ]
    }
}

fn format_ratio(value: f64) -> String {
    format!("{value:.6}")
}
