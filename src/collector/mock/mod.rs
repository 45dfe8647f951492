//! In-memory filesystem for testing the snapshot reader.

mod filesystem;

pub use filesystem::MockFs;
