//! Table Snapshot Module
//!
//! Point-in-time JSON exports of a table, written before a mutating
//! statement goes to review. Snapshots are audit artifacts: nothing restores
//! from them, and they reflect the table at submission, not at approval.

pub mod store;

pub use store::SnapshotService;
