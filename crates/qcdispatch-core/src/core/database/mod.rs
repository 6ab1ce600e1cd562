//! Row-oriented structure database.
//!
//! A database is a single JSON document holding an ordered list of rows. Each
//! row stores one structure, optional energies and free-form key-value
//! metadata (`name`, `foreignkey`, `calc_type`, ...). Rows are appended and
//! never rewritten, and ids are assigned monotonically starting at 1.

pub mod discovery;
pub mod error;
pub mod row;
pub mod store;

pub use error::DatabaseError;
pub use row::{KeyValue, KeyValuePairs, Row};
pub use store::{Energies, StructureDatabase};
