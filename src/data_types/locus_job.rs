
use crate::data_types::variant_index::{is_second_breakpoint_only, VariantIndex};

/// One unit of work: a single sample evaluated at a single position cluster
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct LocusJob {
    /// Sequential identifier, also the merge order
    job_id: usize,
    /// Index of the read collection
    sample_index: usize,
    /// Index of the chromosome in the variant index
    chrom_index: usize,
    /// 0-based key of the cluster
    position: u64
}

impl LocusJob {
    pub fn new(job_id: usize, sample_index: usize, chrom_index: usize, position: u64) -> Self {
        Self { job_id, sample_index, chrom_index, position }
    }

    /// Enumerates every (sample, cluster) pair, skipping clusters that only hold distal breakpoints.
    /// Jobs are ordered sample-major so consecutive jobs tend to share a read source.
    /// # Arguments
    /// * `index` - the loaded variants
    /// * `num_samples` - number of read collections
    pub fn enumerate(index: &VariantIndex, num_samples: usize) -> Vec<LocusJob> {
        let mut jobs = vec![];
        for sample_index in 0..num_samples {
            for chrom_index in 0..index.num_chromosomes() {
                let Some((_chrom, positions)) = index.chromosome(chrom_index) else {
                    continue;
                };
                for (&position, cluster) in positions.iter() {
                    if is_second_breakpoint_only(position, cluster) {
                        continue;
                    }
                    jobs.push(LocusJob::new(jobs.len(), sample_index, chrom_index, position));
                }
            }
        }
        jobs
    }

    // getters
    pub fn job_id(&self) -> usize {
        self.job_id
    }

    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    pub fn chrom_index(&self) -> usize {
        self.chrom_index
    }

    pub fn position(&self) -> u64 {
        self.position
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_types::variants::VariantEntry;

    #[test]
    fn test_enumerate() {
        //                     0123456789012345
        let chrom: &[u8] = b"ACGTACGGTCAGCTTA";
        let mut index = VariantIndex::default();
        index.insert(VariantEntry::new("chr1".to_string(), 3, b"TACG", b"T", chrom, vec![], 2).unwrap());
        index.insert(VariantEntry::new("chr1".to_string(), 5, b"C", b"A", chrom, vec![], 2).unwrap());
        index.insert(VariantEntry::new("chr2".to_string(), 1, b"C", b"G", chrom, vec![], 2).unwrap());

        let jobs = LocusJob::enumerate(&index, 2);
        // position 7 is only the far end of the deletion
        let keys: Vec<(usize, usize, u64)> = jobs.iter()
            .map(|j| (j.sample_index(), j.chrom_index(), j.position()))
            .collect();
        assert_eq!(keys, vec![
            (0, 0, 3), (0, 0, 5), (0, 1, 1),
            (1, 0, 3), (1, 0, 5), (1, 1, 1)
        ]);
        assert!(jobs.iter().enumerate().all(|(i, j)| j.job_id() == i));
    }
}
