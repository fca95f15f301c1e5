#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use gameshard::connection::{MockConnector, MockReply, MockStatement};
use gameshard::metadata::TableMetadata;
use gameshard::{Coordinator, GameConfig, Result, Row, ShardId, Value};
use serde_json::json;

pub const MASTER_W: &str = "primary:game_master";
pub const MASTER_R: &str = "replica0:game_master";
pub const SHARD1_W: &str = "primary:game_shard_1";
pub const SHARD2_W: &str = "primary:game_shard_2";
pub const SHARD1_R: &str = "replica0:game_shard_1";
pub const SHARD2_R: &str = "replica0:game_shard_2";

pub fn config(shards: u32, replicas: usize, policy: &str) -> GameConfig {
    let slaves: Vec<_> = (0..replicas)
        .map(|i| json!({ "host": "10.0.0.2", "port": 3307 + i, "weight": 1 }))
        .collect();
    let raw = json!({
        "server": { "host": "10.0.0.1", "port": 3306, "slave": slaves },
        "db": {
            "user": "game",
            "pass": "secret",
            "shard": shards,
            "shard_transactions": policy,
        }
    });
    GameConfig::from_json_str(&raw.to_string()).unwrap()
}

pub async fn coordinator(connector: &MockConnector, config: GameConfig) -> Arc<Coordinator> {
    Coordinator::with_connector(config, connector).await.unwrap()
}

/// Two shards, one replica, all-shards policy, with `user_item` sharded by
/// user and `user` on the master.
pub async fn game_coordinator(connector: &MockConnector) -> Arc<Coordinator> {
    let coordinator = coordinator(connector, config(2, 1, "all_shards")).await;
    coordinator
        .metadata()
        .preload([
            TableMetadata::sharded_by_user("user_item"),
            TableMetadata::master("user"),
            TableMetadata::master("user_shard"),
        ])
        .unwrap();
    coordinator
}

pub fn shard(id: u32) -> ShardId {
    ShardId::new(id).unwrap()
}

/// In-memory stand-in for the handful of tables the coordinator touches
/// itself, plus canned SELECT replies per table.
///
/// Rows written with `INSERT IGNORE` are kept per table by `id` and answer
/// `WHERE id = ?` lookups. Shards and replicas share one copy.
#[derive(Clone, Default)]
pub struct FakeStore {
    user_shard: Arc<Mutex<HashMap<String, i64>>>,
    sequences: Arc<Mutex<HashMap<String, u64>>>,
    canned: Arc<Mutex<HashMap<String, Vec<Row>>>>,
    tables: Arc<Mutex<HashMap<String, HashMap<String, Row>>>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn assign(&self, key: u64, shard: i64) {
        self.user_shard.lock().unwrap().insert(key.to_string(), shard);
    }

    pub fn assignment(&self, key: u64) -> Option<i64> {
        self.user_shard.lock().unwrap().get(&key.to_string()).copied()
    }

    pub fn assignments(&self) -> Vec<i64> {
        self.user_shard.lock().unwrap().values().copied().collect()
    }

    pub fn seed_sequence(&self, table: &str, value: u64) {
        self.sequences
            .lock()
            .unwrap()
            .insert(format!("seq_{}", table), value);
    }

    pub fn reply_rows(&self, table: &str, rows: Vec<Row>) {
        self.canned.lock().unwrap().insert(table.to_string(), rows);
    }

    pub fn stored(&self, table: &str, id: u64) -> Option<Row> {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .and_then(|rows| rows.get(&id.to_string()))
            .cloned()
    }

    pub fn install(&self, connector: &MockConnector) {
        let store = self.clone();
        connector.set_handler(move |statement| store.answer(statement));
    }

    fn answer(&self, statement: &MockStatement) -> Result<MockReply> {
        let sql = statement.sql.as_str();
        let args = &statement.args;

        if sql.starts_with("INSERT IGNORE INTO user_shard ") {
            let mut map = self.user_shard.lock().unwrap();
            let key = args[0].to_key();
            if map.contains_key(&key) {
                return Ok(MockReply::Affected(0));
            }
            map.insert(key, args[1].as_i64().unwrap());
            return Ok(MockReply::Affected(1));
        }

        if sql.starts_with("SELECT id, shard_id FROM user_shard ") {
            let map = self.user_shard.lock().unwrap();
            let rows = map
                .get(&args[0].to_key())
                .map(|shard| {
                    vec![Row::from_pairs([
                        ("id", args[0].clone()),
                        ("shard_id", Value::Integer(*shard)),
                    ])]
                })
                .unwrap_or_default();
            return Ok(MockReply::Rows(rows));
        }

        if let Some(rest) = sql.strip_prefix("INSERT IGNORE INTO ") {
            return Ok(self.insert_rows(rest, args));
        }

        if let Some(rest) = sql.strip_prefix("UPDATE seq_") {
            let table = format!("seq_{}", rest.split_whitespace().next().unwrap());
            let mut sequences = self.sequences.lock().unwrap();
            return Ok(match sequences.get_mut(&table) {
                Some(value) => {
                    *value += args[0].as_u64().unwrap();
                    MockReply::Affected(1)
                }
                None => MockReply::Affected(0),
            });
        }

        if let Some(table) = sql.strip_prefix("SELECT MAX(id) AS id FROM ") {
            let value = self
                .sequences
                .lock()
                .unwrap()
                .get(table)
                .map_or(Value::Null, |v| Value::Unsigned(*v));
            return Ok(MockReply::Rows(vec![Row::from_pairs([("id", value)])]));
        }

        if sql.starts_with("SELECT ") {
            let table = sql
                .split(" FROM ")
                .nth(1)
                .and_then(|rest| rest.split_whitespace().next())
                .unwrap_or_default();
            if let Some(rows) = self.select_by_id(table, sql, args) {
                return Ok(MockReply::Rows(rows));
            }
            let rows = self
                .canned
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default();
            return Ok(MockReply::Rows(rows));
        }

        Ok(MockReply::Affected(1))
    }

    /// `rest` is everything after `INSERT IGNORE INTO `.
    fn insert_rows(&self, rest: &str, args: &[Value]) -> MockReply {
        let table = rest.split_whitespace().next().unwrap().to_string();
        let columns: Vec<String> = rest[rest.find('(').unwrap() + 1..rest.find(')').unwrap()]
            .split(", ")
            .map(str::to_string)
            .collect();
        let id_index = columns.iter().position(|column| column == "id").unwrap();

        let mut tables = self.tables.lock().unwrap();
        let rows = tables.entry(table).or_default();
        let mut affected = 0;
        for values in args.chunks(columns.len()) {
            let key = values[id_index].to_key();
            if rows.contains_key(&key) {
                continue;
            }
            rows.insert(key, Row::new(columns.clone(), values.to_vec()));
            affected += 1;
        }
        MockReply::Affected(affected)
    }

    /// Answer `SELECT <columns> FROM <table> WHERE id = ?` from inserted
    /// rows. `None` when nothing was inserted into `table`.
    fn select_by_id(&self, table: &str, sql: &str, args: &[Value]) -> Option<Vec<Row>> {
        let tables = self.tables.lock().unwrap();
        let rows = tables.get(table)?;
        let filter = sql.split(" WHERE ").nth(1)?;
        if filter.trim_end_matches(" FOR UPDATE") != "id = ?" {
            return None;
        }

        let projection = sql.strip_prefix("SELECT ")?.split(" FROM ").next()?;
        let found = rows.get(&args[0].to_key()).map(|row| {
            Row::from_pairs(projection.split(", ").map(|column| {
                (column, row.get(column).cloned().unwrap_or(Value::Null))
            }))
        });
        Some(found.into_iter().collect())
    }
}

/// Labels of events of one kind, in order.
pub fn labels_of(connector: &MockConnector, kind: &str) -> Vec<String> {
    use gameshard::connection::MockEvent;
    connector
        .events()
        .into_iter()
        .filter(|event| {
            matches!(
                (kind, event),
                ("connect", MockEvent::Connect { .. })
                    | ("session", MockEvent::Session { .. })
                    | ("begin", MockEvent::Begin { .. })
                    | ("commit", MockEvent::Commit { .. })
                    | ("rollback", MockEvent::Rollback { .. })
                    | ("close", MockEvent::Close { .. })
            )
        })
        .map(|event| event.target().to_string())
        .collect()
}
