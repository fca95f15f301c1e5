//! In-process backend that records every interaction.
//!
//! `MockConnector` stands in for MySQL in tests and dry runs. Each connect,
//! session directive, begin, statement, commit, rollback and close is appended
//! to a shared journal, and statements are answered by a caller-supplied
//! handler.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::{Connector, Database, Target, Transaction};
use crate::core::{DbError, Result, Row, Statement, Value};

/// A statement as seen by the mock backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MockStatement {
    pub target: String,
    pub in_transaction: bool,
    pub sql: String,
    pub args: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MockEvent {
    Connect { target: String },
    Session { target: String, directive: String },
    Begin { target: String },
    Query(MockStatement),
    Commit { target: String },
    Rollback { target: String },
    Close { target: String },
}

impl MockEvent {
    pub fn target(&self) -> &str {
        match self {
            MockEvent::Connect { target }
            | MockEvent::Session { target, .. }
            | MockEvent::Begin { target }
            | MockEvent::Commit { target }
            | MockEvent::Rollback { target }
            | MockEvent::Close { target } => target,
            MockEvent::Query(statement) => &statement.target,
        }
    }
}

/// What the handler answers for a statement.
#[derive(Debug, Clone, PartialEq)]
pub enum MockReply {
    Rows(Vec<Row>),
    Affected(u64),
}

pub type MockHandler = Arc<dyn Fn(&MockStatement) -> Result<MockReply> + Send + Sync>;

struct MockState {
    events: Mutex<Vec<MockEvent>>,
    handler: RwLock<MockHandler>,
    failing_connects: Mutex<HashSet<String>>,
    failing_commits: Mutex<HashSet<String>>,
}

impl MockState {
    fn record(&self, event: MockEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn answer(&self, statement: MockStatement) -> Result<MockReply> {
        let handler = Arc::clone(&*self.handler.read()?);
        self.record(MockEvent::Query(statement.clone()));
        handler(&statement)
    }
}

/// Default answer: empty result sets and one affected row per write.
fn default_reply(statement: &MockStatement) -> Result<MockReply> {
    if statement.sql.trim_start().to_ascii_uppercase().starts_with("SELECT") {
        Ok(MockReply::Rows(Vec::new()))
    } else {
        Ok(MockReply::Affected(1))
    }
}

#[derive(Clone)]
pub struct MockConnector {
    state: Arc<MockState>,
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MockState {
                events: Mutex::new(Vec::new()),
                handler: RwLock::new(Arc::new(default_reply)),
                failing_connects: Mutex::new(HashSet::new()),
                failing_commits: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn with_handler<F>(self, handler: F) -> Self
    where
        F: Fn(&MockStatement) -> Result<MockReply> + Send + Sync + 'static,
    {
        self.set_handler(handler);
        self
    }

    pub fn set_handler<F>(&self, handler: F)
    where
        F: Fn(&MockStatement) -> Result<MockReply> + Send + Sync + 'static,
    {
        *self
            .state
            .handler
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(handler);
    }

    /// Make connecting to the target with this label fail.
    pub fn fail_connect(&self, label: impl Into<String>) {
        self.state
            .failing_connects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(label.into());
    }

    /// Make commits on the target with this label fail.
    pub fn fail_commit(&self, label: impl Into<String>) {
        self.state
            .failing_commits
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(label.into());
    }

    pub fn events(&self) -> Vec<MockEvent> {
        self.state
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn statements(&self) -> Vec<MockStatement> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                MockEvent::Query(statement) => Some(statement),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.state
            .events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, target: &Target) -> Result<Arc<dyn Database>> {
        let label = target.label();
        if self.state.failing_connects.lock()?.contains(&label) {
            return Err(DbError::connect(label, "connection refused"));
        }

        self.state.record(MockEvent::Connect {
            target: label.clone(),
        });
        for directive in target.session_directives() {
            self.state.record(MockEvent::Session {
                target: label.clone(),
                directive,
            });
        }

        Ok(Arc::new(MockDatabase {
            target: target.clone(),
            label,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockDatabase {
    target: Target,
    label: String,
    state: Arc<MockState>,
}

#[async_trait]
impl Database for MockDatabase {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>> {
        self.state.record(MockEvent::Begin {
            target: self.label.clone(),
        });
        Ok(Box::new(MockTransaction {
            target: self.target.clone(),
            label: self.label.clone(),
            state: Arc::clone(&self.state),
        }))
    }

    async fn fetch_all(&self, statement: &Statement) -> Result<Vec<Row>> {
        let reply = self.state.answer(mock_statement(&self.label, false, statement))?;
        Ok(into_rows(reply))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64> {
        let reply = self.state.answer(mock_statement(&self.label, false, statement))?;
        Ok(into_affected(reply))
    }

    async fn close(&self) -> Result<()> {
        self.state.record(MockEvent::Close {
            target: self.label.clone(),
        });
        Ok(())
    }
}

struct MockTransaction {
    target: Target,
    label: String,
    state: Arc<MockState>,
}

#[async_trait]
impl Transaction for MockTransaction {
    fn target(&self) -> &Target {
        &self.target
    }

    async fn fetch_all(&mut self, statement: &Statement) -> Result<Vec<Row>> {
        let reply = self.state.answer(mock_statement(&self.label, true, statement))?;
        Ok(into_rows(reply))
    }

    async fn execute(&mut self, statement: &Statement) -> Result<u64> {
        let reply = self.state.answer(mock_statement(&self.label, true, statement))?;
        Ok(into_affected(reply))
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        if self.state.failing_commits.lock()?.contains(&self.label) {
            return Err(DbError::transaction(format!(
                "{}: commit: deadlock found",
                self.label
            )));
        }
        self.state.record(MockEvent::Commit {
            target: self.label.clone(),
        });
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.record(MockEvent::Rollback {
            target: self.label.clone(),
        });
        Ok(())
    }
}

fn mock_statement(label: &str, in_transaction: bool, statement: &Statement) -> MockStatement {
    MockStatement {
        target: label.to_string(),
        in_transaction,
        sql: statement.sql.clone(),
        args: statement.args.clone(),
    }
}

fn into_rows(reply: MockReply) -> Vec<Row> {
    match reply {
        MockReply::Rows(rows) => rows,
        MockReply::Affected(_) => Vec::new(),
    }
}

fn into_affected(reply: MockReply) -> u64 {
    match reply {
        MockReply::Rows(rows) => rows.len() as u64,
        MockReply::Affected(count) => count,
    }
}
