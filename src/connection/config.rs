use std::fmt;
use std::time::Duration;

/// Which side of the replication pair a target lives on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Primary,
    Replica(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Replica(index) => write!(f, "replica{}", index),
        }
    }
}

/// Connection settings for one physical database target
///
/// One target exists per (server, database) pair of the topology.
#[derive(Debug, Clone)]
pub struct Target {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Database (schema) name
    pub database: String,

    /// Username for authentication
    pub username: String,

    /// Password for authentication
    pub password: String,

    /// Primary or replica index
    pub role: Role,

    /// Reject writes at the session level
    pub read_only: bool,

    /// Connection timeout
    pub connect_timeout: Duration,

    /// Maximum number of connections in pool
    pub max_connections: u32,

    /// Minimum number of connections in pool
    pub min_connections: u32,

    /// Connection idle timeout
    pub idle_timeout: Option<Duration>,

    /// Maximum connection lifetime
    pub max_lifetime: Option<Duration>,
}

impl Target {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            host: "localhost".to_string(),
            port: 3306,
            database: "game_master".to_string(),
            username: username.to_string(),
            password: password.to_string(),
            role: Role::Primary,
            read_only: false,
            connect_timeout: Duration::from_secs(30),
            max_connections: 10,
            min_connections: 0,
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
        }
    }

    pub fn database(mut self, database: &str) -> Self {
        self.database = database.to_string();
        self
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Mark the target as a read replica; sessions become read-only.
    pub fn replica(mut self, index: usize) -> Self {
        self.role = Role::Replica(index);
        self.read_only = true;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// Stable name used in logs and errors, e.g. `replica0:game_shard_2`.
    pub fn label(&self) -> String {
        format!("{}:{}", self.role, self.database)
    }

    /// Statements issued on every new physical connection.
    pub fn session_directives(&self) -> Vec<String> {
        if self.read_only {
            vec!["SET SESSION TRANSACTION READ ONLY".to_string()]
        } else {
            Vec::new()
        }
    }

    pub fn to_url(&self) -> String {
        format!(
            "mysql://{}:{}@{}:{}/{}",
            self.username,
            "***", // Don't expose password
            self.host,
            self.port,
            self.database
        )
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() {
            return Err("Username cannot be empty".to_string());
        }

        if self.database.is_empty() {
            return Err("Database name cannot be empty".to_string());
        }

        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.min_connections > self.max_connections {
            return Err("min_connections cannot exceed max_connections".to_string());
        }

        Ok(())
    }
}
