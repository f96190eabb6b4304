//! Core helpers shared by every stage.
//!
//! - [`record`]: Mapped predicate, 0-based placement, CIGAR tallies and
//!   edit distance decoding for alignment records

pub mod record;
