//! # Workflows Module
//!
//! High-level entry points built on top of [`crate::engine`].
//!
//! - **Batch** ([`batch`]) - Runs one calculator over every structure of an
//!   input database, trajectory or structure file and records each result,
//!   successful or not, in an output database.
//! - **Scan** ([`scan`]) - Splits a structure into two fragments and builds a
//!   rigid displacement scan between them.
//! - **Energies** ([`energies`]) - Relative energies of one or more result
//!   databases, exported as CSV.

pub mod batch;
pub mod energies;
pub mod scan;
