use crate::core::{DbError, Mode, Result, ShardId, Value};

/// Per-call routing options for reads.
///
/// `for_update` forces write mode. A shard key and an explicit shard id are
/// mutually exclusive; both are ignored for unsharded tables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Options {
    mode: Mode,
    for_update: bool,
    shard_key: Option<Value>,
    shard_id: Option<u32>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn write(self) -> Self {
        self.mode(Mode::Write)
    }

    pub fn for_update(mut self) -> Self {
        self.for_update = true;
        self
    }

    pub fn shard_key(mut self, key: impl Into<Value>) -> Self {
        self.shard_key = Some(key.into());
        self
    }

    pub fn shard_id(mut self, shard: u32) -> Self {
        self.shard_id = Some(shard);
        self
    }

    pub(crate) fn resolve(&self, shard_count: u32) -> Result<ResolvedOptions> {
        let route = match (&self.shard_key, self.shard_id) {
            (Some(_), Some(_)) => {
                return Err(DbError::InvalidOption(
                    "shard key and shard id cannot both be set".into(),
                ));
            }
            (Some(key), None) => Route::Key(key.clone()),
            (None, Some(id)) => {
                if id == 0 || id > shard_count {
                    return Err(DbError::InvalidOption(format!(
                        "shard id {} out of range 1..={}",
                        id, shard_count
                    )));
                }
                Route::Shard(ShardId::new(id)?)
            }
            (None, None) => Route::Record,
        };

        let mode = if self.for_update { Mode::Write } else { self.mode };
        Ok(ResolvedOptions {
            mode,
            for_update: self.for_update,
            route,
        })
    }
}

/// Where a sharded operation should look for its shard.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Route {
    /// The shard key carried by the record itself.
    Record,
    Key(Value),
    Shard(ShardId),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ResolvedOptions {
    pub mode: Mode,
    pub for_update: bool,
    pub route: Route,
}

impl ResolvedOptions {
    /// Options used by writes: write mode, routed by the record.
    pub fn write() -> Self {
        Self {
            mode: Mode::Write,
            for_update: false,
            route: Route::Record,
        }
    }
}
