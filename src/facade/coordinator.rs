use std::sync::Arc;
use tracing::info;

use super::RequestContext;
use crate::config::GameConfig;
use crate::connection::{Connector, MySqlConnector};
use crate::core::Result;
use crate::metadata::MetadataRegistry;
use crate::routing::{ReplicaSelector, ShardResolver, WeightTable};
use crate::topology::Topology;
use crate::transaction::ShardTxPolicy;

/// Process-wide entry point: owns the topology and the shared routing state.
///
/// Build it once at startup and share the `Arc` with every request handler:
///
/// ```ignore
/// let coordinator = Coordinator::connect(GameConfig::load()?).await?;
/// let mut ctx = coordinator.begin_request()?;
/// // ... executor calls ...
/// ctx.commit().await?;
/// ctx.rollback().await?;
/// ```
pub struct Coordinator {
    config: GameConfig,
    topology: Topology,
    replicas: ReplicaSelector,
    metadata: MetadataRegistry,
    shards: ShardResolver,
}

impl Coordinator {
    /// Connect to MySQL for every target in `config`.
    pub async fn connect(config: GameConfig) -> Result<Arc<Self>> {
        Self::with_connector(config, &MySqlConnector::new()).await
    }

    pub async fn with_connector(config: GameConfig, connector: &dyn Connector) -> Result<Arc<Self>> {
        config.validate()?;
        let replicas = ReplicaSelector::new(config.replica_weight_entries())?;
        let shards = ShardResolver::new(WeightTable::new(config.shard_weight_entries())?);
        let topology = Topology::build(&config, connector).await?;

        info!(
            shards = topology.shard_count(),
            replicas = topology.replica_count(),
            policy = ?config.db.shard_transactions,
            "coordinator ready"
        );

        Ok(Arc::new(Self {
            config,
            topology,
            replicas,
            metadata: MetadataRegistry::new(),
            shards,
        }))
    }

    /// Open a request scope. The replica index is drawn here, once.
    pub fn begin_request(self: &Arc<Self>) -> Result<RequestContext> {
        let replica = self.replicas.decide_replica()?;
        Ok(RequestContext::new(Arc::clone(self), replica))
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn metadata(&self) -> &MetadataRegistry {
        &self.metadata
    }

    pub fn shards(&self) -> &ShardResolver {
        &self.shards
    }

    pub fn replicas(&self) -> &ReplicaSelector {
        &self.replicas
    }

    pub fn policy(&self) -> ShardTxPolicy {
        self.config.db.shard_transactions
    }

    pub fn shard_count(&self) -> u32 {
        self.config.db.shard
    }

    pub async fn close(&self) -> Result<()> {
        self.topology.close().await
    }
}
