
use anyhow::Context;
use log::{debug, info};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use std::path::Path;

use crate::data_types::variants::VariantEntry;
use crate::parsing::variant_list::{open_tsv_reader, reference_base, reference_contigs, VariantList, VariantListError};

/// Columns that must open the header line, compared case-insensitively
const REQUIRED_COLUMNS: &str = "chr\tstart\tend\tref\talt";
/// Data rows need at least this many columns
const MIN_COLUMNS: usize = 5;

/// Loads an Annovar-style variant list from file
/// # Arguments
/// * `filename` - the list to load, optionally gzip compressed
/// * `reference_genome` - used to anchor indels and classify insertions
/// * `num_samples` - number of statistics records per variant
/// # Errors
/// * if the file cannot be read
/// * if the header or any row is malformed
pub fn load_annovar_file(filename: &Path, reference_genome: &ReferenceGenome, num_samples: usize) -> anyhow::Result<VariantList> {
    debug!("Loading Annovar variants from {filename:?}...");
    let csv_reader = open_tsv_reader(filename)?;
    let variant_list = parse_annovar(csv_reader, reference_genome, num_samples)
        .with_context(|| format!("Error while parsing {filename:?}:"))?;
    info!("Loaded {} variants from {filename:?}", variant_list.index.len());
    Ok(variant_list)
}

/// Parses Annovar rows: chr, start (1-based), end, ref, alt, then anything else.
/// "-" alleles are anchored on the preceding (deletions) or current (insertions) reference base.
pub fn parse_annovar<R: std::io::Read>(
    mut csv_reader: csv::Reader<R>, reference_genome: &ReferenceGenome, num_samples: usize
) -> anyhow::Result<VariantList> {
    let contigs = reference_contigs(reference_genome);
    let mut records = csv_reader.records();

    let header_row = records.next().ok_or(VariantListError::MissingHeader)??;
    let header: Vec<String> = header_row.iter().map(|s| s.to_string()).collect();
    let joined = header.join("\t");
    if !joined.to_ascii_lowercase().contains(REQUIRED_COLUMNS) {
        return Err(VariantListError::BadHeader { expected: REQUIRED_COLUMNS.to_string(), found: joined }.into());
    }

    let mut variant_list = VariantList {
        header,
        ..Default::default()
    };

    for (row_index, result) in records.enumerate() {
        let line = row_index + 2;
        let row = result?;
        let fields: Vec<String> = row.iter().map(|s| s.to_string()).collect();
        if fields.len() < MIN_COLUMNS {
            return Err(VariantListError::TooFewColumns { line, expected: MIN_COLUMNS, found: fields.len() }.into());
        }

        let chrom = fields[0].as_str();
        if !contigs.contains(chrom) {
            return Err(VariantListError::UnknownChromosome { line, chrom: chrom.to_string() }.into());
        }
        let chrom_seq = reference_genome.get_full_chromosome(chrom).unwrap();

        let start: u64 = fields[1].parse()
            .map_err(|_e| VariantListError::BadPosition { line, value: fields[1].clone() })?;
        let out_of_range = || VariantListError::PositionOutOfRange { line, chrom: chrom.to_string(), position: start };

        let (ref_field, alt_field) = (fields[3].as_bytes(), fields[4].as_bytes());
        if ref_field == b"-" && alt_field == b"-" {
            return Err(VariantListError::BothAllelesMissing { line }.into());
        }
        if start == 0 || start - 1 + ref_field.len() as u64 > chrom_seq.len() as u64 {
            return Err(out_of_range().into());
        }

        let mut pos0 = start - 1;
        let (ref_allele, alt_allele) = if alt_field == b"-" {
            // deletion, anchor on the base before
            if pos0 == 0 {
                return Err(out_of_range().into());
            }
            pos0 -= 1;
            let anchor = reference_base(chrom_seq, pos0);
            ([&[anchor][..], ref_field].concat(), vec![anchor])
        } else if ref_field == b"-" {
            // insertion, anchor on the current base
            let anchor = reference_base(chrom_seq, pos0);
            (vec![anchor], [&[anchor][..], alt_field].concat())
        } else {
            (ref_field.to_vec(), alt_field.to_vec())
        };

        let entry = VariantEntry::new(
            chrom.to_string(), pos0, &ref_allele, &alt_allele, chrom_seq, fields.clone(), num_samples
        ).with_context(|| format!("Error on line {line}:"))?;
        variant_list.index.insert(entry);
    }

    Ok(variant_list)
}
