
use crate::data_types::statistics::Strand;

/// Alignment operation kinds, grouped by what they consume
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum CigarKind {
    /// M, =, X: consumes reference and query
    Match,
    /// I: consumes query only
    Insertion,
    /// D: consumes reference only
    Deletion,
    /// N: consumes reference only
    Skip,
    /// S: consumes query only, outside the aligned span
    SoftClip,
    /// H: consumes neither
    HardClip,
    /// P: consumes neither
    Pad
}

impl CigarKind {
    /// True if the operation advances along the reference
    pub fn consumes_reference(&self) -> bool {
        matches!(self, CigarKind::Match | CigarKind::Deletion | CigarKind::Skip)
    }

    /// True if the operation advances along the read
    pub fn consumes_query(&self) -> bool {
        matches!(self, CigarKind::Match | CigarKind::Insertion | CigarKind::SoftClip)
    }
}

/// A single alignment operation
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CigarOp {
    pub kind: CigarKind,
    pub len: u64
}

impl CigarOp {
    pub fn new(kind: CigarKind, len: u64) -> Self {
        Self { kind, len }
    }
}

/// A decoded alignment record, detached from whatever file it came from
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct AlignedRead {
    /// Template name, shared by both mates
    pub name: Vec<u8>,
    /// 0-based leftmost aligned reference position
    pub start: u64,
    /// Alignment operations
    pub cigar: Vec<CigarOp>,
    /// Upper-case ASCII bases
    pub bases: Vec<u8>,
    /// Raw phred base qualities, may be empty if absent
    pub qualities: Vec<u8>,
    /// Mapping quality, 255 if unavailable
    pub mapq: u8,
    /// Set if the read is reverse-complemented
    pub is_reverse: bool
}

impl AlignedRead {
    /// Strand of this mate
    pub fn strand(&self) -> Strand {
        Strand::from_is_reverse(self.is_reverse)
    }

    /// Number of reference bases covered by the alignment
    pub fn reference_len(&self) -> u64 {
        self.cigar.iter()
            .filter(|op| op.kind.consumes_reference())
            .map(|op| op.len)
            .sum()
    }

    /// Last reference position covered by the alignment, inclusive
    pub fn end(&self) -> u64 {
        (self.start + self.reference_len()).saturating_sub(1).max(self.start)
    }

    /// Base quality at a query offset, 0 when missing
    pub fn quality_at(&self, offset: usize) -> u8 {
        self.qualities.get(offset).copied().unwrap_or(0)
    }

    /// Returns the (begin, end) inclusive span including any soft-clipped bases at either end.
    /// Hard clips outside of the soft clips are ignored.
    pub fn soft_clipped_span(&self) -> (i64, i64) {
        let leading = self.cigar.iter()
            .find(|op| op.kind != CigarKind::HardClip)
            .filter(|op| op.kind == CigarKind::SoftClip)
            .map(|op| op.len)
            .unwrap_or(0);
        let trailing = self.cigar.iter().rev()
            .find(|op| op.kind != CigarKind::HardClip)
            .filter(|op| op.kind == CigarKind::SoftClip)
            .map(|op| op.len)
            .unwrap_or(0);

        let begin = self.start as i64 - leading as i64;
        let end = self.start as i64 + self.reference_len() as i64 + trailing as i64 - 1;
        (begin, end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spans() {
        let read = AlignedRead {
            name: b"r1".to_vec(),
            start: 100,
            cigar: vec![
                CigarOp::new(CigarKind::HardClip, 5),
                CigarOp::new(CigarKind::SoftClip, 3),
                CigarOp::new(CigarKind::Match, 10),
                CigarOp::new(CigarKind::Deletion, 2),
                CigarOp::new(CigarKind::Insertion, 4),
                CigarOp::new(CigarKind::Match, 5),
                CigarOp::new(CigarKind::SoftClip, 2)
            ],
            ..Default::default()
        };
        assert_eq!(read.reference_len(), 17);
        assert_eq!(read.end(), 116);
        assert_eq!(read.soft_clipped_span(), (97, 118));
        assert_eq!(read.strand(), Strand::Forward);
    }

    #[test]
    fn test_consumption() {
        assert!(CigarKind::Match.consumes_reference() && CigarKind::Match.consumes_query());
        assert!(CigarKind::Skip.consumes_reference() && !CigarKind::Skip.consumes_query());
        assert!(!CigarKind::SoftClip.consumes_reference() && CigarKind::SoftClip.consumes_query());
        assert!(!CigarKind::Pad.consumes_reference() && !CigarKind::Pad.consumes_query());
    }

    #[test]
    fn test_missing_quality() {
        let read = AlignedRead { bases: b"ACGT".to_vec(), qualities: vec![], ..Default::default() };
        assert_eq!(read.quality_at(2), 0);
    }
}
