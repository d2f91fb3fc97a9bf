/*!
# Writers module
Contains the logic for writing the annotated output table.
*/
/// Generates the annotated variant table; each line corresponds to one input variant
pub mod statistics_writer;
