/*!
# CLI module
Command line interface functionality for abstats.
*/

/// The main CLI module that contains the top-level CLI parser and help text
pub mod core;
/// The annotate CLI subcommand
pub mod annotate;
