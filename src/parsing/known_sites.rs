
use anyhow::{Context, anyhow};
use log::{debug, info};
use noodles::vcf;
use noodles_util::variant::io::reader::Builder as VcfBuilder;
use rustc_hash::FxHashMap;
use std::path::Path;

/// Known alleles at a single position, unused slots are 0
pub type KnownAlleles = [u8; 4];

/// Catalog of known single-base polymorphisms, used to exempt expected differences from mismatch counting
#[derive(Clone, Debug, Default)]
pub struct KnownSites {
    /// chromosome -> 0-based position -> alleles
    sites: FxHashMap<String, FxHashMap<u64, KnownAlleles>>
}

impl KnownSites {
    /// Loads every SNP record from a VCF/BCF file (plain or bgzip)
    /// # Arguments
    /// * `filename` - the variant file to load
    /// # Errors
    /// * if the file cannot be opened or a record fails to parse
    pub fn from_vcf(filename: &Path) -> anyhow::Result<Self> {
        debug!("Loading known sites from {filename:?}...");
        let mut reader = VcfBuilder::default()
            .build_from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;
        let header = reader.read_header()
            .with_context(|| format!("Error while reading header of {filename:?}:"))?;

        let mut known_sites = Self::default();
        let mut num_skipped = 0;
        for result in reader.records(&header) {
            let record = result?;
            let record = vcf::variant::RecordBuf::try_from_variant_record(&header, record.as_ref())?;
            let position = record.variant_start().ok_or(anyhow!("Missing POS"))?; // 1-based

            let ref_allele = record.reference_bases();
            let alts = record.alternate_bases().as_ref();
            let is_snp = ref_allele.len() == 1 && !alts.is_empty() && alts.iter().all(|a| a.len() == 1);
            if !is_snp {
                num_skipped += 1;
                continue;
            }

            let alleles = std::iter::once(ref_allele).chain(alts.iter().map(|a| a.as_str()))
                .map(|a| a.as_bytes()[0]);
            known_sites.insert(record.reference_sequence_name(), usize::from(position) as u64 - 1, alleles);
        }

        info!("Loaded {} known sites ({num_skipped} non-SNP records ignored).", known_sites.len());
        Ok(known_sites)
    }

    /// Adds (or replaces) the alleles at a position; only the first 4 are kept
    pub fn insert(&mut self, chrom: &str, position: u64, alleles: impl Iterator<Item = u8>) {
        let mut known: KnownAlleles = [0; 4];
        for (slot, allele) in known.iter_mut().zip(alleles) {
            *slot = allele.to_ascii_uppercase();
        }
        self.sites.entry(chrom.to_string()).or_default().insert(position, known);
    }

    /// Total number of positions in the catalog
    pub fn len(&self) -> usize {
        self.sites.values().map(|s| s.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Lookup for a single chromosome
    pub fn chromosome(&self, chrom: &str) -> Option<&FxHashMap<u64, KnownAlleles>> {
        self.sites.get(chrom)
    }
}

/// Returns true if `base` matches one of the cataloged alleles at `position`
pub fn is_known_allele(sites: Option<&FxHashMap<u64, KnownAlleles>>, position: u64, base: u8) -> bool {
    sites
        .and_then(|s| s.get(&position))
        .is_some_and(|alleles| alleles.iter().any(|&a| a != 0 && a == base.to_ascii_uppercase()))
}
