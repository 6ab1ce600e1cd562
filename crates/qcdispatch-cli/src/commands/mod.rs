pub mod db;
pub mod energies;
pub mod run;
pub mod scan;
