use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::config::GameConfig;
use crate::connection::{Connector, Database, Target};
use crate::core::{DbError, Mode, Result, ShardId};

/// Every database handle the process uses, opened once at startup.
///
/// * master write: one handle on the primary
/// * shard write: one handle per shard on the primary
/// * master read: one handle per replica
/// * shard read: one map of shard handles per replica
pub struct Topology {
    master_write: Arc<dyn Database>,
    shard_write: BTreeMap<ShardId, Arc<dyn Database>>,
    master_read: Vec<Arc<dyn Database>>,
    shard_read: Vec<BTreeMap<ShardId, Arc<dyn Database>>>,
}

impl Topology {
    /// Open every target. The first failure closes whatever this call already
    /// opened and is returned with the failing target's label.
    pub async fn build(config: &GameConfig, connector: &dyn Connector) -> Result<Self> {
        let mut opened: Vec<Arc<dyn Database>> = Vec::new();
        match Self::open_all(config, connector, &mut opened).await {
            Ok(topology) => {
                info!(
                    shards = topology.shard_write.len(),
                    replicas = topology.master_read.len(),
                    "topology built"
                );
                Ok(topology)
            }
            Err(err) => {
                error!("topology build failed: {}", err);
                for db in opened {
                    if let Err(close_err) = db.close().await {
                        warn!(db = %db.target().label(), "close after failed build: {}", close_err);
                    }
                }
                Err(err)
            }
        }
    }

    async fn open_all(
        config: &GameConfig,
        connector: &dyn Connector,
        opened: &mut Vec<Arc<dyn Database>>,
    ) -> Result<Self> {
        let master_write = open(connector, config.master_target(None)?, opened).await?;

        let mut shard_write = BTreeMap::new();
        for shard in config.shard_ids() {
            let db = open(connector, config.shard_target(shard, None)?, opened).await?;
            shard_write.insert(shard, db);
        }

        let replica_count = config.server.replicas.len();
        let mut master_read = Vec::with_capacity(replica_count);
        let mut shard_read = Vec::with_capacity(replica_count);
        for replica in 0..replica_count {
            master_read.push(open(connector, config.master_target(Some(replica))?, opened).await?);

            let mut shards = BTreeMap::new();
            for shard in config.shard_ids() {
                let db = open(connector, config.shard_target(shard, Some(replica))?, opened).await?;
                shards.insert(shard, db);
            }
            shard_read.push(shards);
        }

        Ok(Self {
            master_write,
            shard_write,
            master_read,
            shard_read,
        })
    }

    pub fn master(&self, mode: Mode, replica: usize) -> Result<&Arc<dyn Database>> {
        match mode {
            Mode::Write => Ok(&self.master_write),
            Mode::Read => self
                .master_read
                .get(replica)
                .ok_or_else(|| replica_not_configured(replica)),
            Mode::Backup => Err(backup_not_configured()),
        }
    }

    pub fn shards(&self, mode: Mode, replica: usize) -> Result<&BTreeMap<ShardId, Arc<dyn Database>>> {
        match mode {
            Mode::Write => Ok(&self.shard_write),
            Mode::Read => self
                .shard_read
                .get(replica)
                .ok_or_else(|| replica_not_configured(replica)),
            Mode::Backup => Err(backup_not_configured()),
        }
    }

    pub fn shard(&self, mode: Mode, replica: usize, shard: ShardId) -> Result<&Arc<dyn Database>> {
        self.shards(mode, replica)?
            .get(&shard)
            .ok_or_else(|| DbError::NotConfigured(format!("shard {} is not configured", shard)))
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        self.shard_write.keys().copied().collect()
    }

    pub fn shard_count(&self) -> usize {
        self.shard_write.len()
    }

    pub fn replica_count(&self) -> usize {
        self.master_read.len()
    }

    /// Targets of every handle, in opening order.
    pub fn targets(&self) -> Vec<&Target> {
        self.handles().map(|db| db.target()).collect()
    }

    fn handles(&self) -> impl Iterator<Item = &Arc<dyn Database>> {
        std::iter::once(&self.master_write)
            .chain(self.shard_write.values())
            .chain(
                self.master_read
                    .iter()
                    .zip(self.shard_read.iter())
                    .flat_map(|(master, shards)| std::iter::once(master).chain(shards.values())),
            )
    }

    /// Close every handle, continuing past failures. Returns the last error.
    pub async fn close(&self) -> Result<()> {
        let mut last_error = None;
        for db in self.handles() {
            if let Err(err) = db.close().await {
                warn!(db = %db.target().label(), "close failed: {}", err);
                last_error = Some(err);
            }
        }
        match last_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

async fn open(
    connector: &dyn Connector,
    target: Target,
    opened: &mut Vec<Arc<dyn Database>>,
) -> Result<Arc<dyn Database>> {
    let db = connector.connect(&target).await.map_err(|err| match err {
        DbError::ConnectError { .. } => err,
        other => DbError::connect(target.label(), other.to_string()),
    })?;
    opened.push(Arc::clone(&db));
    Ok(db)
}

fn replica_not_configured(replica: usize) -> DbError {
    DbError::NotConfigured(format!("replica {} is not configured", replica))
}

fn backup_not_configured() -> DbError {
    DbError::NotConfigured("backup mode has no configured targets".into())
}
