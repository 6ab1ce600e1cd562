//! # Engine Module
//!
//! The plumbing between a job description and the external quantum-chemistry
//! programs.
//!
//! - **Configuration** ([`config`]) - Calculator, calculation type, method
//!   parameters, paths and per-engine settings, with validation
//! - **Labels** ([`label`]) - Calculation and database labels derived from a job
//! - **External commands** ([`command`]) - Launching engine binaries with
//!   redirected stdin/stdout in a given working directory
//! - **Calculators** ([`calculators`]) - DFTB+, Gaussian and VASP input writers
//!   and output parsers behind one trait
//! - **Progress Monitoring** ([`progress`]) - Callback-based progress events
//! - **Error Handling** ([`error`]) - Engine-level error type

pub mod calculators;
pub mod command;
pub mod config;
pub mod error;
pub mod label;
pub mod progress;
