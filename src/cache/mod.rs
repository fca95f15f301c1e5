use std::collections::HashMap;
use std::future::Future;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use crate::core::Result;

pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(10);

/// Lifetime of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    After(Duration),
    Never,
}

impl Expiry {
    fn deadline(&self) -> Option<Instant> {
        match self {
            Expiry::After(duration) => Some(Instant::now() + *duration),
            Expiry::Never => None,
        }
    }
}

struct Entry<V> {
    value: V,
    expires_at: Option<Instant>,
}

impl<V> Entry<V> {
    fn is_live(&self) -> bool {
        self.expires_at.is_none_or(|deadline| Instant::now() < deadline)
    }
}

/// Joins a primary key and its members into one cache key: `key_m1_m2`.
pub fn cache_key(primary: &str, members: &[&str]) -> String {
    let mut key = primary.to_string();
    for member in members {
        key.push('_');
        key.push_str(member);
    }
    key
}

/// Process-local key/value cache with per-entry expiry.
pub struct LocalCache<V> {
    entries: RwLock<HashMap<String, Entry<V>>>,
    default_expiry: Expiry,
}

impl<V: Clone> Default for LocalCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> LocalCache<V> {
    pub fn new() -> Self {
        Self::with_default_expiry(Expiry::After(DEFAULT_EXPIRY))
    }

    pub fn with_default_expiry(default_expiry: Expiry) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_expiry,
        }
    }

    pub fn set(&self, value: V, primary: &str, members: &[&str]) -> Result<()> {
        self.set_with_expiry(value, self.default_expiry, primary, members)
    }

    pub fn set_with_expiry(
        &self,
        value: V,
        expiry: Expiry,
        primary: &str,
        members: &[&str],
    ) -> Result<()> {
        let mut entries = self.entries.write()?;
        entries.insert(
            cache_key(primary, members),
            Entry {
                value,
                expires_at: expiry.deadline(),
            },
        );
        Ok(())
    }

    pub fn get(&self, primary: &str, members: &[&str]) -> Result<Option<V>> {
        let entries = self.entries.read()?;
        Ok(entries
            .get(&cache_key(primary, members))
            .filter(|entry| entry.is_live())
            .map(|entry| entry.value.clone()))
    }

    /// Return the cached value, or run `setter`, store its value with the
    /// default expiry and return it. Setter errors are not cached.
    pub async fn get_with_setter<F, Fut>(&self, setter: F, primary: &str, members: &[&str]) -> Result<V>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>>,
    {
        if let Some(value) = self.get(primary, members)? {
            return Ok(value);
        }
        let value = setter().await?;
        self.set(value.clone(), primary, members)?;
        Ok(value)
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.entries.read()?.is_empty())
    }
}
