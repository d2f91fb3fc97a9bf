
use anyhow::Context;
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use rustc_hash::FxHashSet;
use std::fs::File;
use std::path::Path;

use crate::data_types::variant_index::VariantIndex;

/// A loaded variant list: everything needed to write the rows back out with statistics appended
#[derive(Clone, Debug, Default)]
pub struct VariantList {
    /// Lines preceding the header, written back out verbatim
    pub info_lines: Vec<String>,
    /// Header columns from the input
    pub header: Vec<String>,
    /// The loaded variants
    pub index: VariantIndex
}

#[derive(thiserror::Error, Debug)]
pub enum VariantListError {
    #[error("no header line found")]
    MissingHeader,
    #[error("header does not contain the expected columns {expected:?}: {found:?}")]
    BadHeader { expected: String, found: String },
    #[error("line {line}: expected at least {expected} columns, found {found}")]
    TooFewColumns { line: usize, expected: usize, found: usize },
    #[error("line {line}: chromosome {chrom:?} is not in the reference")]
    UnknownChromosome { line: usize, chrom: String },
    #[error("line {line}: REF and ALT cannot both be \"-\"")]
    BothAllelesMissing { line: usize },
    #[error("line {line}: could not parse position {value:?}")]
    BadPosition { line: usize, value: String },
    #[error("line {line}: variant at {chrom}:{position} is outside of the reference sequence")]
    PositionOutOfRange { line: usize, chrom: String, position: u64 },
    #[error("line {line}: variant identifier {value:?} is not formatted as chr_pos_ref_alt")]
    BadIdentifier { line: usize, value: String },
}

/// Opens a tab-delimited text file (plain or gzip) without any quoting or header handling
/// # Arguments
/// * `filename` - the file to open, ".gz" files are decompressed
pub fn open_tsv_reader(filename: &Path) -> anyhow::Result<csv::Reader<Box<dyn std::io::Read>>> {
    let file = File::open(filename)
        .with_context(|| format!("Error while opening {filename:?}:"))?;
    let reader: Box<dyn std::io::Read> = if filename.extension().unwrap_or_default() == "gz" {
        Box::new(flate2::read::MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(tsv_reader_builder().from_reader(reader))
}

/// Shared reader configuration for the variant lists
pub fn tsv_reader_builder() -> csv::ReaderBuilder {
    let mut builder = csv::ReaderBuilder::new();
    builder.delimiter(b'\t')
        .has_headers(false)
        .flexible(true)
        .quoting(false);
    builder
}

/// Set of chromosome names present in the reference
pub fn reference_contigs(reference_genome: &ReferenceGenome) -> FxHashSet<String> {
    reference_genome.contig_keys()
        .map(|k| k.to_string())
        .collect()
}

/// Returns the upper-case reference base at a 0-based position
pub fn reference_base(chrom_seq: &[u8], position: u64) -> u8 {
    chrom_seq[position as usize].to_ascii_uppercase()
}
