//! Snapshot collection from the shared metrics file.
//!
//! ```text
//!   training workload ──writes──▶ current.json
//!                                      │
//!                          ┌───────────▼───────────┐
//!                          │    SnapshotReader     │
//!                          │ exists → read → parse │
//!                          │      → validate       │
//!                          └───────────┬───────────┘
//!                                      │
//!                               ┌──────▼──────┐
//!                               │  FileSystem │ (trait)
//!                               └──────┬──────┘
//!                              ┌───────┴───────┐
//!                       ┌──────▼──────┐ ┌──────▼──────┐
//!                       │   RealFs    │ │   MockFs    │
//!                       └─────────────┘ └─────────────┘
//! ```

pub mod mock;
pub mod reader;
pub mod traits;

pub use mock::MockFs;
pub use reader::{ReadFailure, SnapshotReader, parse_snapshot};
pub use traits::{FileSystem, RealFs};
