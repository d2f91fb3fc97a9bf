
/// Typed view of an aligned read, independent of the file format it came from
pub mod aligned_read;
/// A single unit of work: one sample at one position cluster
pub mod locus_job;
/// Per-sample read evidence counters and the derived report values
pub mod statistics;
/// Position-keyed lookup of the loaded variants, plus the entry arena
pub mod variant_index;
/// Contains variant definition functionality and classification
pub mod variants;
