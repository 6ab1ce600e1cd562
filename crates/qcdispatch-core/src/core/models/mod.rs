//! Data models for atomic structures.

pub mod element;
pub mod structure;
