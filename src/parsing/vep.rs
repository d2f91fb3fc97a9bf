
use anyhow::Context;
use indexmap::{IndexMap, IndexSet};
use itertools::Itertools;
use log::{debug, info};
use rust_lib_reference_genome::reference_genome::ReferenceGenome;
use std::path::Path;

use crate::data_types::variants::VariantEntry;
use crate::parsing::variant_list::{open_tsv_reader, reference_contigs, VariantList, VariantListError};

/// Loads a VEP-style variant list from file
/// # Arguments
/// * `filename` - the list to load, optionally gzip compressed
/// * `reference_genome` - used to validate coordinates and classify insertions
/// * `num_samples` - number of statistics records per variant
/// # Errors
/// * if the file cannot be read
/// * if the header or any row is malformed
pub fn load_vep_file(filename: &Path, reference_genome: &ReferenceGenome, num_samples: usize) -> anyhow::Result<VariantList> {
    debug!("Loading VEP variants from {filename:?}...");
    let csv_reader = open_tsv_reader(filename)?;
    let variant_list = parse_vep(csv_reader, reference_genome, num_samples)
        .with_context(|| format!("Error while parsing {filename:?}:"))?;
    info!("Loaded {} variants from {filename:?}", variant_list.index.len());
    Ok(variant_list)
}

/// Splits a `chr_pos_ref_alt` identifier; the chromosome is whatever remains left of the last three fields
fn split_identifier(identifier: &str) -> Option<(&str, &str, &str, &str)> {
    let mut parts = identifier.rsplitn(4, '_');
    let alt = parts.next()?;
    let ref_allele = parts.next()?;
    let pos = parts.next()?;
    let chrom = parts.next()?;
    if chrom.is_empty() {
        None
    } else {
        Some((chrom, pos, ref_allele, alt))
    }
}

/// Parses VEP rows keyed on the uploaded variation (`chr_pos_ref_alt`, 1-based, VCF anchored).
/// Rows sharing an identifier are merged, keeping the unique values of each column joined with ';'.
pub fn parse_vep<R: std::io::Read>(
    mut csv_reader: csv::Reader<R>, reference_genome: &ReferenceGenome, num_samples: usize
) -> anyhow::Result<VariantList> {
    let contigs = reference_contigs(reference_genome);
    let mut records = csv_reader.records();

    // "##" lines, then a single "#" header
    let mut info_lines = vec![];
    let mut header = None;
    let mut line = 0;
    for result in records.by_ref() {
        line += 1;
        let row = result?;
        let fields: Vec<&str> = row.iter().collect();
        let joined = fields.join("\t");
        if joined.starts_with("##") {
            info_lines.push(joined);
        } else if joined.starts_with('#') {
            header = Some(fields.iter().map(|s| s.to_string()).collect::<Vec<String>>());
            break;
        } else {
            break;
        }
    }
    let header = header.ok_or(VariantListError::MissingHeader)?;
    let num_columns = header.len();

    // identifier -> column -> unique values, first-seen order throughout
    let mut merged: IndexMap<String, (usize, Vec<IndexSet<String>>)> = Default::default();
    for result in records {
        line += 1;
        let row = result?;
        let Some(identifier) = row.get(0) else {
            continue;
        };
        if identifier.starts_with('#') {
            continue;
        }
        if row.len() < num_columns {
            return Err(VariantListError::TooFewColumns { line, expected: num_columns, found: row.len() }.into());
        }

        let (_first_line, columns) = merged.entry(identifier.to_string())
            .or_insert_with(|| (line, vec![]));
        for (column, value) in row.iter().skip(1).enumerate() {
            if columns.len() <= column {
                columns.push(IndexSet::new());
            }
            columns[column].insert(value.to_string());
        }
    }

    let mut variant_list = VariantList {
        info_lines,
        header,
        ..Default::default()
    };

    for (identifier, (line, columns)) in merged.into_iter() {
        let (chrom, pos, ref_allele, alt_allele) = split_identifier(&identifier)
            .ok_or_else(|| VariantListError::BadIdentifier { line, value: identifier.clone() })?;
        if !contigs.contains(chrom) {
            return Err(VariantListError::UnknownChromosome { line, chrom: chrom.to_string() }.into());
        }
        let chrom_seq = reference_genome.get_full_chromosome(chrom).unwrap();

        let position: u64 = pos.parse()
            .map_err(|_e| VariantListError::BadPosition { line, value: pos.to_string() })?;
        if position == 0 || position - 1 + ref_allele.len() as u64 > chrom_seq.len() as u64 {
            return Err(VariantListError::PositionOutOfRange { line, chrom: chrom.to_string(), position }.into());
        }

        let fields: Vec<String> = std::iter::once(identifier.clone())
            .chain(columns.iter().map(|values| values.iter().join(";")))
            .collect();

        let entry = VariantEntry::new(
            chrom.to_string(), position - 1, ref_allele.as_bytes(), alt_allele.as_bytes(), chrom_seq, fields, num_samples
        ).with_context(|| format!("Error on line {line}:"))?;
        variant_list.index.insert(entry);
    }

    Ok(variant_list)
}
