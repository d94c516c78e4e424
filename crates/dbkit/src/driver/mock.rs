//! In-memory driver for unit tests: records every call and fails on demand.

use super::{Driver, DriverError, Link, LinkResult, Platform};
use crate::config::Config;
use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::value::Value;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
pub(crate) struct MockState {
    /// Final SQL of every execute/query call, in order.
    pub statements: Vec<String>,
    pub params: Vec<Vec<Value>>,
    pub begins: usize,
    pub commits: usize,
    pub rollbacks: usize,
    /// Hostnames of every connect attempt.
    pub connects: Vec<String>,
    pub closed: usize,
    fail_hosts: Vec<String>,
    fail_sql: Vec<String>,
    responses: Vec<(String, Vec<Row>)>,
    affected: u64,
    last_affected: u64,
    next_id: i64,
}

/// Handle shared between a test and the links it hands out.
#[derive(Debug, Clone)]
pub(crate) struct MockDriver {
    platform: Platform,
    state: Arc<Mutex<MockState>>,
}

impl MockDriver {
    pub(crate) fn new(platform: Platform) -> Self {
        Self {
            platform,
            state: Arc::new(Mutex::new(MockState {
                affected: 1,
                ..MockState::default()
            })),
        }
    }

    pub(crate) fn mysql() -> Self {
        Self::new(Platform::mysql())
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    /// Refuse connections to `host`.
    pub(crate) fn fail_host(&self, host: &str) {
        self.state().fail_hosts.push(host.to_string());
    }

    /// Fail every statement containing `needle`.
    pub(crate) fn fail_sql(&self, needle: &str) {
        self.state().fail_sql.push(needle.to_string());
    }

    pub(crate) fn clear_failures(&self) {
        let mut state = self.state();
        state.fail_hosts.clear();
        state.fail_sql.clear();
    }

    /// Answer queries containing `needle` with `rows` of `columns`.
    pub(crate) fn respond(&self, needle: &str, columns: &[&str], rows: Vec<Vec<Value>>) {
        let columns: Arc<[String]> = columns.iter().map(|c| c.to_string()).collect();
        let rows = rows
            .into_iter()
            .map(|values| Row::new(Arc::clone(&columns), values))
            .collect();
        self.state().responses.push((needle.to_string(), rows));
    }

    pub(crate) fn set_affected(&self, rows: u64) {
        self.state().affected = rows;
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.state().statements.clone()
    }

    pub(crate) fn arc(&self) -> Arc<dyn Driver> {
        Arc::new(self.clone())
    }
}

impl Driver for MockDriver {
    fn tag(&self) -> &'static str {
        "mock"
    }

    fn platform(&self) -> Platform {
        self.platform.clone()
    }

    fn connect(&self, config: &Config) -> DbResult<Box<dyn Link>> {
        let mut state = self.state();
        state.connects.push(config.hostname.clone());
        if state.fail_hosts.contains(&config.hostname) {
            return Err(DbError::Connection(format!(
                "mock refused {}",
                config.hostname
            )));
        }
        Ok(Box::new(MockLink {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockLink {
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    fn record(&mut self, sql: &str, params: &[Value]) -> LinkResult<MutexGuard<'_, MockState>> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());
        state.params.push(params.to_vec());
        if state.fail_sql.iter().any(|needle| sql.contains(needle.as_str())) {
            state.last_affected = 0;
            return Err(DriverError::new("1064", format!("mock rejected: {sql}")));
        }
        Ok(state)
    }
}

impl Link for MockLink {
    fn execute(&mut self, sql: &str, params: &[Value]) -> LinkResult<u64> {
        let mut state = self.record(sql, params)?;
        if sql.starts_with("INSERT") {
            state.next_id += 1;
        }
        state.last_affected = state.affected;
        Ok(state.affected)
    }

    fn query(&mut self, sql: &str, params: &[Value]) -> LinkResult<Vec<Row>> {
        let mut state = self.record(sql, params)?;
        let rows: Vec<Row> = state
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default();
        state.last_affected = rows.len() as u64;
        Ok(rows)
    }

    fn begin(&mut self) -> LinkResult<()> {
        self.state.lock().unwrap().begins += 1;
        Ok(())
    }

    fn commit(&mut self) -> LinkResult<()> {
        self.state.lock().unwrap().commits += 1;
        Ok(())
    }

    fn rollback(&mut self) -> LinkResult<()> {
        self.state.lock().unwrap().rollbacks += 1;
        Ok(())
    }

    fn affected_rows(&self) -> u64 {
        self.state.lock().unwrap().last_affected
    }

    fn last_insert_id(&mut self) -> Option<Value> {
        let id = self.state.lock().unwrap().next_id;
        (id > 0).then_some(Value::Int(id))
    }

    fn ping(&mut self) -> bool {
        true
    }

    fn server_version(&mut self) -> LinkResult<String> {
        Ok("mock-1.0".to_string())
    }

    fn close(self: Box<Self>) {
        self.state.lock().unwrap().closed += 1;
    }
}
