
/// Helper functions for creating outputs and saving JSON via serde
pub mod file_io;
/// Interval merging and breakpoint windows
pub mod intervals;
/// Quality-aware local alignment scoring
pub mod local_alignment;
/// Helper functions for generating the progress bars
pub mod progress_bar;
