/*!
# Parsing module
Contains the logic for parsing input files into meaningful structs / data.
*/
/// Loader for Annovar-style variant lists
pub mod annovar;
/// Known polymorphic SNP sites loaded from a VCF
pub mod known_sites;
/// Read collection abstraction with a BAM and an in-memory implementation
pub mod read_source;
/// Shared container and helpers for both variant list formats
pub mod variant_list;
/// Loader for VEP-style variant lists
pub mod vep;
