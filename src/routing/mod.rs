pub mod replica;
pub mod shard;
pub mod weights;

pub use replica::ReplicaSelector;
pub use shard::{ShardResolver, USER_SHARD_TABLE};
pub use weights::WeightTable;
