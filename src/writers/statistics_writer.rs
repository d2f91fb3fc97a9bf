
use anyhow::Context;
use csv::QuoteStyle;
use std::io::Write;
use std::path::Path;

use crate::data_types::statistics::REPORT_COLUMNS;
use crate::parsing::variant_list::VariantList;
use crate::util::file_io::{create_output, OutputWriter};

/// Writes the annotated variant table: the input rows with a statistics block appended per sample
pub struct StatisticsWriter<W: Write> {
    /// Handle on the output, info lines and rows share it so it must be flexible
    csv_writer: csv::Writer<W>
}

impl StatisticsWriter<OutputWriter> {
    /// Creates a new writer for a given filename, gzip compressed if it ends in ".gz"
    /// # Arguments
    /// * `filename` - the output path
    pub fn new(filename: &Path) -> anyhow::Result<Self> {
        let writer = create_output(filename)?;
        Ok(Self::from_writer(writer))
    }

    /// Flushes the table and closes the file, including the gzip trailer
    /// # Errors
    /// * if the final flush or trailer write fails
    pub fn finish(self) -> anyhow::Result<()> {
        self.into_inner()?.finish()
    }
}

impl<W: Write> StatisticsWriter<W> {
    /// Wraps any writer with the tab-delimited, unquoted output format
    pub fn from_writer(writer: W) -> Self {
        let csv_writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(QuoteStyle::Never)
            .flexible(true)
            .from_writer(writer);
        Self {
            csv_writer
        }
    }

    /// Writes the full table for a variant list, one row per variant in chromosome and position order.
    /// # Arguments
    /// * `variant_list` - the loaded list with statistics filled in
    /// * `sample_names` - one label per BAM, same order as the statistics records
    /// # Errors
    /// * if any write fails
    pub fn write_variant_list(&mut self, variant_list: &VariantList, sample_names: &[String]) -> anyhow::Result<()> {
        for info_line in variant_list.info_lines.iter() {
            self.csv_writer.write_record([info_line])?;
        }
        self.csv_writer.write_record(header_fields(&variant_list.header, sample_names))?;

        for entry in variant_list.index.canonical_entries() {
            let mut row: Vec<String> = entry.fields().to_vec();
            row.push(entry.kind().to_string());
            for statistics in entry.statistics().iter() {
                row.push(String::new());
                row.extend(statistics.report().to_fields());
            }
            self.csv_writer.write_record(&row)
                .with_context(|| format!("Error while writing row for {}:{}", entry.chrom(), entry.pos1() + 1))?;
        }

        self.csv_writer.flush()?;
        Ok(())
    }

    /// Flushes and hands back the inner writer
    pub fn into_inner(self) -> anyhow::Result<W> {
        self.csv_writer.into_inner()
            .map_err(|e| anyhow::anyhow!("Error while finalizing output: {}", e.error()))
    }
}

/// Output header: input columns, the variant type, then a labelled block per sample
fn header_fields(header: &[String], sample_names: &[String]) -> Vec<String> {
    let mut fields: Vec<String> = header.to_vec();
    fields.push("var_type".to_string());
    for sample_name in sample_names.iter() {
        fields.push(format!("{sample_name}:"));
        fields.extend(REPORT_COLUMNS.iter().map(|c| c.to_string()));
    }
    fields
}

/// Sample label for a BAM, which is just the file stem
/// # Examples
/// * `/data/tumor.bam` -> `tumor`
pub fn sample_name_from_path(filename: &Path) -> String {
    filename.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| filename.display().to_string())
}
