
use crate::data_types::statistics::Statistics;

/// All the variant kinds we evaluate
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, PartialOrd, Ord, strum_macros::Display, strum_macros::EnumString)]
pub enum VariantKind {
    /// REF and ALT are both length = 1
    #[strum(serialize = "SNV")]
    Snv=0,
    /// REF length >= ALT length
    #[strum(serialize = "DEL")]
    Deletion,
    /// ALT is longer than REF and does not repeat the downstream reference
    #[strum(serialize = "INS")]
    Insertion,
    /// ALT is longer than REF and the inserted bases fully repeat the downstream reference
    #[strum(serialize = "ITD")]
    InternalTandemDuplication,
    /// ALT is longer than REF and the inserted bases partially repeat the downstream reference
    #[strum(serialize = "PTD")]
    PartialTandemDuplication
}

impl VariantKind {
    /// True for the two duplication kinds that get a re-estimated VAF
    pub fn is_duplication(&self) -> bool {
        matches!(self, VariantKind::InternalTandemDuplication | VariantKind::PartialTandemDuplication)
    }

    /// True for the insertion-like kinds, which share candidate construction
    pub fn is_insertion_like(&self) -> bool {
        matches!(self, VariantKind::Insertion | VariantKind::InternalTandemDuplication | VariantKind::PartialTandemDuplication)
    }
}

#[derive(thiserror::Error, Debug)]
pub enum VariantError {
    #[error("{allele} allele is empty (length = 0)")]
    EmptyAllele { allele: &'static str },
    #[error("variant at {position} with REF length {ref_len} extends past the end of a {chrom_len} bp chromosome")]
    OutOfRange { position: u64, ref_len: usize, chrom_len: usize },
}

/// One variant under evaluation, along with the statistics gathered for every sample
#[derive(Clone, Debug, PartialEq)]
pub struct VariantEntry {
    /// Chromosome name, must exist in the reference
    chrom: String,
    /// First breakpoint, 0-based
    pos1: u64,
    /// Second breakpoint, 0-based; equal to pos1 for SNVs
    pos2: u64,
    /// Reference allele, upper-case
    ref_allele: Vec<u8>,
    /// Alternate allele, upper-case
    alt_allele: Vec<u8>,
    /// The classified kind
    kind: VariantKind,
    /// Original columns from the variant list, written back out untouched
    fields: Vec<String>,
    /// One record per sample
    statistics: Vec<Statistics>
}

impl VariantEntry {
    /// Creates a new entry and classifies it against the reference.
    /// # Arguments
    /// * `chrom` - the chromosome name
    /// * `pos1` - 0-based position of the first reference base in `ref_allele`
    /// * `ref_allele` - reference allele, must be anchored (non-empty)
    /// * `alt_allele` - alternate allele, must be anchored (non-empty)
    /// * `chrom_seq` - the full chromosome sequence, used for tandem assessment
    /// * `fields` - the original row, retained for output
    /// * `num_samples` - number of statistics records to allocate
    /// # Errors
    /// * if either allele is empty
    /// * if the reference allele does not fit on the chromosome
    pub fn new(
        chrom: String, pos1: u64, ref_allele: &[u8], alt_allele: &[u8], chrom_seq: &[u8],
        fields: Vec<String>, num_samples: usize
    ) -> Result<Self, VariantError> {
        if ref_allele.is_empty() {
            return Err(VariantError::EmptyAllele { allele: "REF" });
        }
        if alt_allele.is_empty() {
            return Err(VariantError::EmptyAllele { allele: "ALT" });
        }
        if pos1 as usize + ref_allele.len() > chrom_seq.len() {
            return Err(VariantError::OutOfRange { position: pos1, ref_len: ref_allele.len(), chrom_len: chrom_seq.len() });
        }

        let ref_allele = ref_allele.to_ascii_uppercase();
        let alt_allele = alt_allele.to_ascii_uppercase();
        let (kind, pos2) = if ref_allele.len() + alt_allele.len() == 2 {
            (VariantKind::Snv, pos1)
        } else if ref_allele.len() >= alt_allele.len() {
            (VariantKind::Deletion, pos1 + ref_allele.len() as u64)
        } else {
            assess_tandem(chrom_seq, pos1, &alt_allele)
        };

        Ok(Self {
            chrom,
            pos1,
            pos2,
            ref_allele,
            alt_allele,
            kind,
            fields,
            statistics: vec![Default::default(); num_samples]
        })
    }

    // getters
    pub fn chrom(&self) -> &str {
        &self.chrom
    }

    pub fn pos1(&self) -> u64 {
        self.pos1
    }

    pub fn pos2(&self) -> u64 {
        self.pos2
    }

    pub fn ref_allele(&self) -> &[u8] {
        &self.ref_allele
    }

    pub fn alt_allele(&self) -> &[u8] {
        &self.alt_allele
    }

    pub fn kind(&self) -> VariantKind {
        self.kind
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn statistics(&self) -> &[Statistics] {
        &self.statistics
    }

    pub fn statistics_mut(&mut self) -> &mut [Statistics] {
        &mut self.statistics
    }
}

/// Classifies an insertion-like allele by walking it against the downstream reference.
/// Returns the kind and the second breakpoint.
/// # Arguments
/// * `chrom_seq` - the full chromosome sequence
/// * `pos1` - 0-based anchor position
/// * `alt_allele` - the anchored alternate allele
pub fn assess_tandem(chrom_seq: &[u8], pos1: u64, alt_allele: &[u8]) -> (VariantKind, u64) {
    let start = (pos1 as usize).min(chrom_seq.len());
    let matched = chrom_seq[start..].iter()
        .zip(alt_allele.iter())
        .take_while(|(r, a)| r.eq_ignore_ascii_case(a))
        .count() as u64;

    let pos2 = (pos1 + 1).max((pos1 + matched).saturating_sub(1));
    let kind = if pos2 == pos1 + 1 {
        VariantKind::Insertion
    } else if matched as usize == alt_allele.len() {
        VariantKind::InternalTandemDuplication
    } else {
        VariantKind::PartialTandemDuplication
    };
    (kind, pos2)
}
