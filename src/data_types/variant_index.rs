
use indexmap::IndexMap;
use std::collections::BTreeMap;

use crate::data_types::statistics::Statistics;
use crate::data_types::variants::{VariantEntry, VariantKind};

/// Identifier of a variant in the arena
pub type VariantId = usize;

/// A single index slot: the variant and the breakpoint on the other side of it
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct IndexEntry {
    /// The other breakpoint of this variant; equal to the key for SNVs
    pub paired_position: u64,
    /// Arena identifier
    pub variant_id: VariantId
}

/// All variants sharing one breakpoint position
pub type PositionCluster = Vec<IndexEntry>;

/// Returns true if `position` is only ever the distal end of the variants in the cluster
pub fn is_second_breakpoint_only(position: u64, cluster: &[IndexEntry]) -> bool {
    cluster.iter().all(|e| e.paired_position < position)
}

/// Arena of variant entries plus a chromosome -> position -> cluster lookup.
/// Multi-base variants are indexed at both breakpoints; the lower key is the canonical one.
#[derive(Clone, Debug, Default)]
pub struct VariantIndex {
    /// The owned entries, identified by position in this Vec
    entries: Vec<VariantEntry>,
    /// Chromosome (first-seen order) -> sorted positions -> cluster
    chromosomes: IndexMap<String, BTreeMap<u64, PositionCluster>>
}

impl VariantIndex {
    /// Adds an entry to the arena and indexes it at each breakpoint
    pub fn insert(&mut self, entry: VariantEntry) -> VariantId {
        let variant_id = self.entries.len();
        let positions = self.chromosomes.entry(entry.chrom().to_string()).or_default();
        let (pos1, pos2) = (entry.pos1(), entry.pos2());
        positions.entry(pos1).or_default().push(IndexEntry { paired_position: pos2, variant_id });
        if pos2 != pos1 {
            positions.entry(pos2).or_default().push(IndexEntry { paired_position: pos1, variant_id });
        }
        self.entries.push(entry);
        variant_id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, variant_id: VariantId) -> &VariantEntry {
        &self.entries[variant_id]
    }

    pub fn entries(&self) -> &[VariantEntry] {
        &self.entries
    }

    /// Number of chromosomes with at least one variant
    pub fn num_chromosomes(&self) -> usize {
        self.chromosomes.len()
    }

    /// Returns the chromosome name and its position lookup
    pub fn chromosome(&self, chrom_index: usize) -> Option<(&str, &BTreeMap<u64, PositionCluster>)> {
        self.chromosomes.get_index(chrom_index)
            .map(|(name, positions)| (name.as_str(), positions))
    }

    /// Position lookup for a chromosome by name
    pub fn positions(&self, chrom: &str) -> Option<&BTreeMap<u64, PositionCluster>> {
        self.chromosomes.get(chrom)
    }

    /// The cluster at a position, empty if nothing is indexed there
    pub fn cluster(&self, chrom_index: usize, position: u64) -> &[IndexEntry] {
        self.chromosome(chrom_index)
            .and_then(|(_name, positions)| positions.get(&position))
            .map(|c| c.as_slice())
            .unwrap_or(&[])
    }

    /// True if every variant in the cluster is a single-base substitution
    pub fn is_snv_cluster(&self, cluster: &[IndexEntry]) -> bool {
        cluster.iter().all(|e| self.entries[e.variant_id].kind() == VariantKind::Snv)
    }

    /// Mutable handle on one (variant, sample) record
    pub fn statistics_mut(&mut self, variant_id: VariantId, sample_index: usize) -> &mut Statistics {
        &mut self.entries[variant_id].statistics_mut()[sample_index]
    }

    /// Iterates each variant exactly once, in chromosome then position order, using the low-key rule
    pub fn canonical_entries(&self) -> impl Iterator<Item = &VariantEntry> + '_ {
        self.chromosomes.values()
            .flat_map(|positions| positions.iter())
            .flat_map(move |(&position, cluster)| {
                cluster.iter()
                    .filter(move |e| position <= e.paired_position)
                    .map(move |e| &self.entries[e.variant_id])
            })
    }
}
