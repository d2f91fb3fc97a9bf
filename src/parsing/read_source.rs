
use anyhow::{Context, anyhow};
use log::trace;
use noodles::bam;
use noodles::core::{Position, Region};
use noodles::sam;
use noodles::sam::alignment::record::Cigar as _;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::Flags;
use noodles::sam::alignment::RecordBuf;
use std::collections::VecDeque;
use std::fs::File;
use std::path::{Path, PathBuf};

use crate::data_types::aligned_read::{AlignedRead, CigarKind, CigarOp};

/// Provides the reads overlapping a set of genomic windows
pub trait ReadSource {
    /// Restricts iteration to the 0-based inclusive windows on `chrom`; windows must be sorted and non-overlapping.
    /// Reads overlapping more than one window are returned once.
    fn set_regions(&mut self, chrom: &str, regions: &[(i64, i64)]) -> anyhow::Result<()>;

    /// Returns the next read in the current windows, or None when exhausted
    fn read_next(&mut self) -> anyhow::Result<Option<AlignedRead>>;

    /// Restricts iteration to `len` bases starting at 0-based `start`
    fn set_region(&mut self, chrom: &str, start: u64, len: u64) -> anyhow::Result<()> {
        let end = start + len.max(1) - 1;
        self.set_regions(chrom, &[(start as i64, end as i64)])
    }
}

/// Controls which flagged records are allowed through
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ReadFilter {
    /// if true, reads flagged as duplicates are kept
    pub count_duplicates: bool,
    /// if true, secondary alignments are kept
    pub count_secondary: bool
}

impl ReadFilter {
    /// Returns true if a record with these flags should be used
    pub fn passes(&self, flags: Flags) -> bool {
        !(flags.is_unmapped() ||
            flags.is_qc_fail() ||
            (flags.is_duplicate() && !self.count_duplicates) ||
            (flags.is_secondary() && !self.count_secondary))
    }
}

/// Indexed BAM access via noodles
pub struct BamReadSource {
    /// Path to the opened file
    filename: PathBuf,
    /// The indexed reader
    reader: bam::io::IndexedReader<noodles::bgzf::Reader<File>>,
    /// The parsed header, needed for queries
    header: sam::Header,
    /// Flag filters
    filter: ReadFilter,
    /// Reads from the most recent query, in file order
    buffer: VecDeque<AlignedRead>
}

impl BamReadSource {
    /// Opens an indexed BAM file
    /// # Arguments
    /// * `filename` - the BAM file, with a .bai or .csi next to it
    /// * `filter` - which flagged records to keep
    /// # Errors
    /// * if the file or its index cannot be opened
    /// * if the header fails to parse
    pub fn open(filename: &Path, filter: ReadFilter) -> anyhow::Result<Self> {
        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(filename)
            .with_context(|| format!("Error while opening {filename:?}:"))?;
        let header = reader.read_header()
            .with_context(|| format!("Error while reading header of {filename:?}:"))?;
        Ok(Self {
            filename: filename.to_path_buf(),
            reader,
            header,
            filter,
            buffer: Default::default()
        })
    }

    pub fn filename(&self) -> &Path {
        &self.filename
    }
}

impl ReadSource for BamReadSource {
    fn set_regions(&mut self, chrom: &str, regions: &[(i64, i64)]) -> anyhow::Result<()> {
        self.buffer.clear();
        let mut previous_end: Option<i64> = None;
        for &(begin, end) in regions.iter() {
            let start = Position::try_from(begin.max(0) as usize + 1)?;
            let stop = Position::try_from(end.max(begin).max(0) as usize + 1)?;
            let region = Region::new(chrom, start..=stop);
            trace!("Querying {region} in {:?}", self.filename);

            let query = self.reader.query(&self.header, &region)
                .with_context(|| format!("Error while querying {region} in {:?}:", self.filename))?;
            for result in query {
                let record = result?;
                let record = RecordBuf::try_from_alignment_record(&self.header, &record)?;
                if !self.filter.passes(record.flags()) {
                    continue;
                }
                let read = decode_record(&record)?;
                // anything starting inside the previous window was already returned
                if previous_end.is_some_and(|pe| read.start as i64 <= pe) {
                    continue;
                }
                self.buffer.push_back(read);
            }
            previous_end = Some(end);
        }
        Ok(())
    }

    fn read_next(&mut self) -> anyhow::Result<Option<AlignedRead>> {
        Ok(self.buffer.pop_front())
    }
}

/// Converts a noodles record into our detached representation
/// # Errors
/// * if the record is unmapped or the CIGAR fails to decode
fn decode_record(record: &RecordBuf) -> anyhow::Result<AlignedRead> {
    let start = record.alignment_start()
        .ok_or(anyhow!("Mapped record is missing an alignment start"))?;

    let mut cigar = vec![];
    for result in record.cigar().iter() {
        let op = result?;
        let kind = match op.kind() {
            Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch => CigarKind::Match,
            Kind::Insertion => CigarKind::Insertion,
            Kind::Deletion => CigarKind::Deletion,
            Kind::Skip => CigarKind::Skip,
            Kind::SoftClip => CigarKind::SoftClip,
            Kind::HardClip => CigarKind::HardClip,
            Kind::Pad => CigarKind::Pad
        };
        cigar.push(CigarOp::new(kind, op.len() as u64));
    }

    let qualities: &[u8] = record.quality_scores().as_ref();
    // 0xFF everywhere is how a missing quality string is stored
    let qualities = if qualities.iter().all(|&q| q == 0xff) {
        vec![]
    } else {
        qualities.to_vec()
    };

    Ok(AlignedRead {
        name: record.name().map(|n| n.to_vec()).unwrap_or_default(),
        start: usize::from(start) as u64 - 1,
        cigar,
        bases: record.sequence().as_ref().to_ascii_uppercase(),
        qualities,
        mapq: record.mapping_quality().map(|m| m.get()).unwrap_or(255),
        is_reverse: record.flags().is_reverse_complemented()
    })
}

/// Read source backed by pre-decoded reads, mostly for callers that already hold alignments in memory
#[derive(Clone, Debug, Default)]
pub struct InMemoryReadSource {
    /// (chromosome, read) pairs
    reads: Vec<(String, AlignedRead)>,
    /// Reads from the most recent query
    buffer: VecDeque<AlignedRead>
}

impl InMemoryReadSource {
    pub fn new(reads: Vec<(String, AlignedRead)>) -> Self {
        Self {
            reads,
            buffer: Default::default()
        }
    }

    /// Adds a single read
    pub fn push(&mut self, chrom: &str, read: AlignedRead) {
        self.reads.push((chrom.to_string(), read));
    }
}

impl ReadSource for InMemoryReadSource {
    fn set_regions(&mut self, chrom: &str, regions: &[(i64, i64)]) -> anyhow::Result<()> {
        let mut overlapping: Vec<&AlignedRead> = self.reads.iter()
            .filter(|(c, _r)| c == chrom)
            .map(|(_c, r)| r)
            .filter(|r| {
                let (start, end) = (r.start as i64, r.end() as i64);
                regions.iter().any(|&(b, e)| start <= e && b <= end)
            })
            .collect();
        overlapping.sort_by_key(|r| r.start);
        self.buffer = overlapping.into_iter().cloned().collect();
        Ok(())
    }

    fn read_next(&mut self) -> anyhow::Result<Option<AlignedRead>> {
        Ok(self.buffer.pop_front())
    }
}
