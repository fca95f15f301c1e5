// ============================================================================
// Request Transaction Management
// ============================================================================
//
// Groups the per-database transactions of one request into four slots
// (master write, master read, shard write, shard read). Commits are issued
// target by target; there is no atomicity across databases.
//
// ============================================================================

pub mod report;
pub mod set;
pub mod state;

pub use report::{CommitOutcome, CommitReport};
pub use set::{ShardTxPolicy, TransactionSet};
pub use state::{SlotState, TxTarget};
