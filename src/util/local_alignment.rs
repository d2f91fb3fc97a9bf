/*!
Quality-aware local alignment scoring.
Reads are encoded so that upper-case bases are high quality and lower-case bases are low quality.
A case-matched base scores 2, a case-mismatched (but otherwise equal) base scores 1, a mismatch scores -1, and N scores 0 against anything.

```rust
use abstats::util::local_alignment::{encode_quality_aware, LocalAligner};

let mut aligner = LocalAligner::new(b"ACGTACGTAA");
let query = encode_quality_aware(b"CGTA", &[40, 40, 10, 40], 30);
assert_eq!(query, b"CGtA".to_vec());
assert_eq!(aligner.align(&query).unwrap(), 7);
```
*/

use bio::alignment::pairwise::Scoring;

/// Cost of the first base in a gap
pub const GAP_OPEN: i32 = 3;
/// Cost of each additional base in a gap
pub const GAP_EXTEND: i32 = 1;

/// Scoring function signature used by the aligner
type MatchFn = fn(u8, u8) -> i32;

/// One representative per query symbol class; every byte scores like one of these
const QUERY_CLASSES: [u8; 9] = *b"ACGTacgtN";

/// Stands in for minus infinity without overflowing on a few extensions
const NEG_INFINITY: i32 = i32::MIN / 2;

#[derive(thiserror::Error, Debug)]
pub enum AlignerError {
    #[error("aligner is not bound to a reference sequence")]
    Uninitialized
}

/// Encodes read bases into the quality-aware alphabet.
/// Bases with quality >= `min_base_quality` are upper-case, everything else is lower-case; non-ACGT become N/n.
/// # Arguments
/// * `bases` - the read bases, any case
/// * `qualities` - raw phred qualities; missing entries count as low quality
/// * `min_base_quality` - the high-quality threshold
pub fn encode_quality_aware(bases: &[u8], qualities: &[u8], min_base_quality: u8) -> Vec<u8> {
    bases.iter().enumerate()
        .map(|(i, &b)| {
            let upper = match b.to_ascii_uppercase() {
                c @ (b'A' | b'C' | b'G' | b'T') => c,
                _ => b'N'
            };
            let is_hq = qualities.get(i).copied().unwrap_or(0) >= min_base_quality;
            if is_hq { upper } else { upper.to_ascii_lowercase() }
        })
        .collect()
}

/// Best score a read could reach: 2 per high-quality base and 1 per low-quality base
pub fn max_attainable_score(qualities: &[u8], num_bases: usize, min_base_quality: u8) -> i32 {
    (0..num_bases)
        .map(|i| 1 + i32::from(qualities.get(i).copied().unwrap_or(0) >= min_base_quality))
        .sum()
}

/// Scores one query base against one reference base
pub fn quality_aware_score(query: u8, reference: u8) -> i32 {
    let q = query.to_ascii_uppercase();
    let r = reference.to_ascii_uppercase();
    let is_base = |c: u8| matches!(c, b'A' | b'C' | b'G' | b'T');
    if !is_base(q) || !is_base(r) {
        0
    } else if q != r {
        -1
    } else if query == reference {
        2
    } else {
        1
    }
}

/// Index into `QUERY_CLASSES` for any query byte
fn query_class(base: u8) -> usize {
    match base {
        b'A' => 0,
        b'C' => 1,
        b'G' => 2,
        b'T' => 3,
        b'a' => 4,
        b'c' => 5,
        b'g' => 6,
        b't' => 7,
        _ => 8
    }
}

/// Score-only local aligner bound to a single reference, reused for many queries.
/// Binding precomputes a profile with the score of every query class against every reference base,
/// so aligning is a single affine-gap pass over two rows with no traceback.
pub struct LocalAligner {
    /// The bound reference sequence
    reference: Option<Vec<u8>>,
    /// Gap penalties and the base scoring function
    scoring: Scoring<MatchFn>,
    /// `QUERY_CLASSES.len()` rows of reference length, row-major
    profile: Vec<i32>,
    /// Best score ending at each reference column, previous query base
    h_row: Vec<i32>,
    /// Best score ending in a query gap at each reference column
    f_row: Vec<i32>
}

impl Default for LocalAligner {
    fn default() -> Self {
        Self {
            reference: None,
            scoring: Scoring::new(-(GAP_OPEN - GAP_EXTEND), -GAP_EXTEND, quality_aware_score as MatchFn),
            profile: vec![],
            h_row: vec![],
            f_row: vec![]
        }
    }
}

impl std::fmt::Debug for LocalAligner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalAligner")
            .field("reference", &self.reference.as_ref().map(|r| String::from_utf8_lossy(r).to_string()))
            .finish()
    }
}

impl LocalAligner {
    /// Creates an aligner already bound to `reference`
    pub fn new(reference: &[u8]) -> Self {
        let mut aligner = Self::default();
        aligner.bind(reference);
        aligner
    }

    /// Binds (or re-binds) the reference sequence and rebuilds its score profile
    pub fn bind(&mut self, reference: &[u8]) {
        let match_fn = self.scoring.match_fn;
        self.profile = QUERY_CLASSES.iter()
            .flat_map(|&q| reference.iter().map(move |&r| match_fn(q, r)))
            .collect();
        self.reference = Some(reference.to_vec());
    }

    pub fn reference(&self) -> Option<&[u8]> {
        self.reference.as_deref()
    }

    /// Returns the best local alignment score of `query` against the bound reference
    /// # Errors
    /// * if no reference has been bound
    pub fn align(&mut self, query: &[u8]) -> Result<i32, AlignerError> {
        let Self { reference, scoring, profile, h_row, f_row } = self;
        let reference = reference.as_deref().ok_or(AlignerError::Uninitialized)?;
        let n = reference.len();
        if query.is_empty() || n == 0 {
            return Ok(0);
        }

        // a gap of length k scores gap_open + k * gap_extend
        let open = scoring.gap_open + scoring.gap_extend;
        let extend = scoring.gap_extend;
        h_row.clear();
        h_row.resize(n + 1, 0);
        f_row.clear();
        f_row.resize(n + 1, NEG_INFINITY);

        let mut best_score = 0;
        for &q in query.iter() {
            let class = query_class(q);
            let scores = &profile[class * n..(class + 1) * n];
            let mut diagonal = 0;
            let mut left = 0;
            let mut e = NEG_INFINITY;
            for j in 1..=n {
                let up = h_row[j];
                f_row[j] = (up + open).max(f_row[j] + extend);
                e = (left + open).max(e + extend);
                let h = (diagonal + scores[j - 1]).max(e).max(f_row[j]).max(0);
                diagonal = up;
                h_row[j] = h;
                left = h;
                best_score = best_score.max(h);
            }
        }
        Ok(best_score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_scores() {
        assert_eq!(quality_aware_score(b'A', b'A'), 2);
        assert_eq!(quality_aware_score(b'a', b'A'), 1);
        assert_eq!(quality_aware_score(b'A', b'a'), 1);
        assert_eq!(quality_aware_score(b'A', b'C'), -1);
        assert_eq!(quality_aware_score(b'c', b'A'), -1);
        assert_eq!(quality_aware_score(b'N', b'A'), 0);
        assert_eq!(quality_aware_score(b'n', b'n'), 0);
        assert_eq!(quality_aware_score(b'G', b'N'), 0);
    }

    #[test]
    fn test_encoding() {
        let encoded = encode_quality_aware(b"ACgTRn", &[30, 29, 40, 0, 40, 40], 30);
        assert_eq!(encoded, b"AcGtNN".to_vec());
        // missing qualities are low quality
        assert_eq!(encode_quality_aware(b"AC", &[], 30), b"ac".to_vec());
        assert_eq!(max_attainable_score(&[30, 29, 40, 0], 4, 30), 6);
        assert_eq!(max_attainable_score(&[], 3, 30), 3);
    }

    #[test]
    fn test_uninitialized() {
        let mut aligner = LocalAligner::default();
        assert!(matches!(aligner.align(b"ACGT"), Err(AlignerError::Uninitialized)));
        aligner.bind(b"ACGT");
        assert_eq!(aligner.align(b"ACGT").unwrap(), 8);
    }

    #[test]
    fn test_gap_penalties() {
        // one base gap: 8 matches minus an open of 3
        let mut aligner = LocalAligner::new(b"ACGTTACGT");
        assert_eq!(aligner.align(b"ACGTACGT").unwrap(), 13);

        // two base gap: open 3 + extend 1
        let mut aligner = LocalAligner::new(b"ACGTTTACGT");
        assert_eq!(aligner.align(b"ACGTACGT").unwrap(), 12);

        // low quality bases earn half credit
        let mut aligner = LocalAligner::new(b"ACGTACGT");
        assert_eq!(aligner.align(b"acgtacgt").unwrap(), 8);
        assert_eq!(aligner.align(b"").unwrap(), 0);
    }

    #[test]
    fn test_rebind() {
        let mut aligner = LocalAligner::new(b"AAAAAAAA");
        assert_eq!(aligner.align(b"CCCC").unwrap(), 0);
        aligner.bind(b"TTCCCCTT");
        assert_eq!(aligner.align(b"CCCC").unwrap(), 8);
        assert_eq!(aligner.reference(), Some(b"TTCCCCTT".as_slice()));
    }

    #[test]
    fn test_query_classes() {
        for (class, &q) in QUERY_CLASSES.iter().enumerate() {
            assert_eq!(query_class(q), class);
        }
        assert_eq!(query_class(b'n'), 8);
        assert_eq!(query_class(b'R'), 8);
    }

    #[test]
    fn test_matches_full_aligner() {
        use bio::alignment::pairwise::Aligner;

        let cases: [(&[u8], &[u8], i32); 7] = [
            (b"ACGTACGT", b"ACGTTACGT", 13),
            (b"ACGTACGT", b"ACGTTTACGT", 12),
            (b"ACGTTTTACGT", b"ACGTACGT", 11),
            (b"GGCATtgACCgTAAC", b"TTGGCATTGACCGTAACGGTC", 27),
            (b"AAAAnNAAAA", b"AAAACCAAAATT", 16),
            (b"TTTTTTTT", b"ACGACGACG", 0),
            (b"CTAGGCATGGTTGACCGTAAC", b"GATCCTAGGCATTGACCGTAACGGTC", 31)
        ];
        let mut full = Aligner::new(-(GAP_OPEN - GAP_EXTEND), -GAP_EXTEND, quality_aware_score as MatchFn);
        for &(query, reference, expected) in cases.iter() {
            let mut aligner = LocalAligner::new(reference);
            assert_eq!(full.local(query, reference).score, expected);
            assert_eq!(aligner.align(query).unwrap(), expected);
            // the rows are reused, so a second query gives the same answer
            assert_eq!(aligner.align(query).unwrap(), expected);
        }
    }
}
