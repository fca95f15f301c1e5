use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::Target;
use crate::core::{DbError, Result, ShardId};
use crate::transaction::ShardTxPolicy;

pub const GAMEMODE_ENV: &str = "GAMEMODE";
pub const DB_USER_ENV: &str = "GAMESHARD_DB_USER";
pub const DB_PASS_ENV: &str = "GAMESHARD_DB_PASS";

/// Process configuration for the coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameConfig {
    pub server: ServerConfig,
    pub db: DbConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(rename = "slave", default)]
    pub replicas: Vec<ReplicaConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    pub user: String,
    #[serde(default)]
    pub pass: String,
    /// Number of shards; shard ids are `1..=shard`.
    pub shard: u32,
    /// Assignment weight per shard id. Shards left out weigh 1.
    #[serde(default)]
    pub shard_weights: BTreeMap<u32, u32>,
    #[serde(default = "default_master_database")]
    pub master_database: String,
    #[serde(default = "default_shard_prefix")]
    pub shard_database_prefix: String,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub shard_transactions: ShardTxPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 0,
            connect_timeout_secs: 30,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

fn default_weight() -> u32 {
    1
}

fn default_master_database() -> String {
    "game_master".to_string()
}

fn default_shard_prefix() -> String {
    "game_shard_".to_string()
}

/// Config file name for a `GAMEMODE` value.
pub fn config_file_name(mode: Option<&str>) -> &'static str {
    match mode {
        Some("PRODUCTION") => "production.json",
        Some("DEVELOPMENT") => "development.json",
        _ => "local.json",
    }
}

impl GameConfig {
    /// Load `.env`, pick the file for `GAMEMODE` under `conf/game`, apply
    /// credential overrides and validate.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::load_from_dir("conf/game")
    }

    pub fn load_from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let mode = env::var(GAMEMODE_ENV).ok();
        let path: PathBuf = dir.as_ref().join(config_file_name(mode.as_deref()));
        let mut config = Self::parse_file(&path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::parse_file(path.as_ref())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: GameConfig = serde_json::from_str(json)
            .map_err(|err| DbError::ConfigError(format!("invalid config: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    fn parse_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DbError::ConfigError(format!("cannot read {}: {}", path.display(), err))
        })?;
        serde_json::from_str(&raw)
            .map_err(|err| DbError::ConfigError(format!("invalid {}: {}", path.display(), err)))
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(user) = env::var(DB_USER_ENV) {
            self.db.user = user;
        }
        if let Ok(pass) = env::var(DB_PASS_ENV) {
            self.db.pass = pass;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.db.user.is_empty() {
            return Err(DbError::ConfigError("db.user cannot be empty".into()));
        }
        if self.db.shard == 0 {
            return Err(DbError::ConfigError("db.shard must be >= 1".into()));
        }
        if let Some(unknown) = self
            .db
            .shard_weights
            .keys()
            .find(|id| **id == 0 || **id > self.db.shard)
        {
            return Err(DbError::ConfigError(format!(
                "shard_weights names unknown shard {}",
                unknown
            )));
        }
        if self.shard_weight_entries().iter().all(|(_, w)| *w == 0) {
            return Err(DbError::ConfigError("all shard weights are zero".into()));
        }
        if !self.server.replicas.is_empty() && self.server.replicas.iter().all(|r| r.weight == 0) {
            return Err(DbError::ConfigError("all replica weights are zero".into()));
        }
        let pool = &self.db.pool;
        if pool.max_connections == 0 {
            return Err(DbError::ConfigError("pool.max_connections must be > 0".into()));
        }
        if pool.min_connections > pool.max_connections {
            return Err(DbError::ConfigError(
                "pool.min_connections cannot exceed pool.max_connections".into(),
            ));
        }
        Ok(())
    }

    pub fn shard_ids(&self) -> Vec<ShardId> {
        (1..=self.db.shard).filter_map(|id| ShardId::new(id).ok()).collect()
    }

    pub fn shard_weight_entries(&self) -> Vec<(ShardId, u32)> {
        self.shard_ids()
            .into_iter()
            .map(|id| {
                let weight = self.db.shard_weights.get(&id.get()).copied().unwrap_or(1);
                (id, weight)
            })
            .collect()
    }

    pub fn replica_weight_entries(&self) -> Vec<(usize, u32)> {
        self.server
            .replicas
            .iter()
            .enumerate()
            .map(|(index, replica)| (index, replica.weight))
            .collect()
    }

    pub fn shard_database(&self, shard: ShardId) -> String {
        format!("{}{}", self.db.shard_database_prefix, shard)
    }

    fn base_target(&self, host: &str, port: u16, database: &str) -> Target {
        let pool = &self.db.pool;
        Target::new(&self.db.user, &self.db.pass)
            .host(host)
            .port(port)
            .database(database)
            .max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .connect_timeout(Duration::from_secs(pool.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(pool.max_lifetime_secs))
    }

    /// Master target on the primary (`None`) or on a replica.
    pub fn master_target(&self, replica: Option<usize>) -> Result<Target> {
        self.target_for(replica, &self.db.master_database)
    }

    pub fn shard_target(&self, shard: ShardId, replica: Option<usize>) -> Result<Target> {
        self.target_for(replica, &self.shard_database(shard))
    }

    fn target_for(&self, replica: Option<usize>, database: &str) -> Result<Target> {
        match replica {
            None => Ok(self.base_target(&self.server.host, self.server.port, database)),
            Some(index) => {
                let server = self.server.replicas.get(index).ok_or_else(|| {
                    DbError::NotConfigured(format!("replica {} is not configured", index))
                })?;
                Ok(self
                    .base_target(&server.host, server.port, database)
                    .replica(index))
            }
        }
    }
}
