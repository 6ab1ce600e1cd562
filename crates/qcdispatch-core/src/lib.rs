//! # qcdispatch Core Library
//!
//! Drives external quantum-chemistry engines over collections of molecular and
//! crystal structures and records the results in a structure database.
//!
//! ## Layout
//!
//! - **[`core`]: Data and formats.** Stateless structure models, element tables,
//!   structure file formats (extended XYZ, POSCAR, DFTB+ gen) and the JSON
//!   structure database.
//!
//! - **[`engine`]: Calculation plumbing.** Job configuration, label construction,
//!   external command execution and the calculator implementations for DFTB+,
//!   Gaussian and VASP.
//!
//! - **[`workflows`]: The Public API.** The batch driver that walks an input
//!   source and records every calculation, plus the displacement-scan generator
//!   and relative-energy analysis.

pub mod core;
pub mod engine;
pub mod workflows;
