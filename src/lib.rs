/// Command line interface functionality
pub mod cli;
/// Contains various shared data types
pub mod data_types;
/// Local realignment engine for indel, insertion, and duplication loci
pub mod indel_realigner;
/// Splits the work into per-sample locus jobs and merges their results
pub mod job_scheduler;
/// Tooling for parsing input files into meaningful structs / data
pub mod parsing;
/// Pileup engine for loci where every variant is an SNV
pub mod snv_pileup;
/// Various utility functions that tend to be very generic
pub mod util;
/// All output writers
pub mod writers;
