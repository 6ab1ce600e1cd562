//! # Core Module
//!
//! Fundamental building blocks shared by the engine and the workflows.
//!
//! - **Structure Representation** ([`models`]) - Atoms, cells and the element table
//! - **File I/O** ([`io`]) - Extended XYZ, VASP POSCAR and DFTB+ gen formats
//! - **Structure Storage** ([`database`]) - Row-oriented structure database with key-value metadata

pub mod database;
pub mod io;
pub mod models;
