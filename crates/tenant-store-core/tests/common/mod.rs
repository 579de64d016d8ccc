// crates/tenant-store-core/tests/common/mod.rs
// ============================================================================
// Module: Shared Test Doubles
// Description: In-memory store connections and fixed stack sources.
// Purpose: Drive the registry and instrumentation without a database.
// ============================================================================

//! ## Overview
//! [`MockFactory`] hands out in-memory connections whose failures and delays
//! are scripted through [`MockBehavior`]. [`ScriptedStack`] supplies fixed
//! stack text to the instrumentation middleware.

#![allow(dead_code, reason = "Helpers are shared across test binaries.")]

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use serde_json::json;
use tenant_store_core::ConnectionFactory;
use tenant_store_core::ConnectionOptions;
use tenant_store_core::Operation;
use tenant_store_core::StackCapture;
use tenant_store_core::StoreConnection;
use tenant_store_core::StoreError;

// ============================================================================
// SECTION: Connections
// ============================================================================

/// Behavior knobs shared by a factory and its connections.
#[derive(Default)]
pub struct MockBehavior {
    /// Fail every `connect` call.
    pub fail_connect: bool,
    /// Fail `disconnect` calls.
    pub fail_disconnect: bool,
    /// Reject targets containing this fragment at construction.
    pub reject_target: Option<String>,
    /// Delay applied to `execute`.
    pub execute_delay: Duration,
    /// Delay applied to `create`, widening construction races.
    pub create_delay: Duration,
    /// Delay applied to `connect`, holding handles in `Pending`.
    pub connect_delay: Duration,
}

/// Counting connection factory.
#[derive(Default)]
pub struct MockFactory {
    /// Behavior knobs.
    pub behavior: MockBehavior,
    /// Successful constructions.
    pub created: AtomicUsize,
    /// Construction attempts, successful or not.
    pub attempts: AtomicUsize,
    /// Completed disconnects across all connections.
    pub disconnects: Arc<AtomicUsize>,
    /// Executions across all connections.
    pub executions: Arc<AtomicUsize>,
    /// Targets seen by `create`, in order.
    pub targets: Mutex<Vec<String>>,
    /// Options seen by `create`, in order.
    pub options: Mutex<Vec<ConnectionOptions>>,
}

impl MockFactory {
    /// Factory applying `behavior` to every connection it creates.
    pub fn with_behavior(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Successful constructions so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Construction attempts so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Completed disconnects so far.
    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    /// Operations that reached a connection so far.
    pub fn executions(&self) -> usize {
        self.executions.load(Ordering::SeqCst)
    }

    /// Targets passed to `create`, in order.
    pub fn targets(&self) -> Vec<String> {
        self.targets.lock().unwrap().clone()
    }
}

impl ConnectionFactory for MockFactory {
    fn create(
        &self,
        target: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn StoreConnection>, StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if !self.behavior.create_delay.is_zero() {
            std::thread::sleep(self.behavior.create_delay);
        }
        if let Some(fragment) = &self.behavior.reject_target
            && target.contains(fragment.as_str())
        {
            return Err(StoreError::Construction(format!("rejected target {target}")));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        self.targets.lock().unwrap().push(target.to_string());
        self.options.lock().unwrap().push(*options);
        Ok(Arc::new(MockConnection {
            target: target.to_string(),
            fail_connect: self.behavior.fail_connect,
            fail_disconnect: self.behavior.fail_disconnect,
            execute_delay: self.behavior.execute_delay,
            connect_delay: self.behavior.connect_delay,
            disconnects: Arc::clone(&self.disconnects),
            executions: Arc::clone(&self.executions),
        }))
    }
}

/// In-memory connection echoing the operation it received.
pub struct MockConnection {
    /// Target the connection was built for.
    target: String,
    /// Fail `connect`.
    fail_connect: bool,
    /// Fail `disconnect`.
    fail_disconnect: bool,
    /// Delay applied to `execute`.
    execute_delay: Duration,
    /// Delay applied to `connect`.
    connect_delay: Duration,
    /// Shared disconnect counter.
    disconnects: Arc<AtomicUsize>,
    /// Shared execution counter.
    executions: Arc<AtomicUsize>,
}

#[async_trait]
impl StoreConnection for MockConnection {
    async fn connect(&self) -> Result<(), StoreError> {
        if !self.connect_delay.is_zero() {
            tokio::time::sleep(self.connect_delay).await;
        }
        if self.fail_connect {
            return Err(StoreError::Connection(format!("unreachable: {}", self.target)));
        }
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), StoreError> {
        if self.fail_disconnect {
            return Err(StoreError::Connection("disconnect refused".to_string()));
        }
        self.disconnects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, operation: &Operation) -> Result<Value, StoreError> {
        if !self.execute_delay.is_zero() {
            tokio::time::sleep(self.execute_delay).await;
        }
        self.executions.fetch_add(1, Ordering::SeqCst);
        if operation.model == "Broken" {
            return Err(StoreError::Operation("relation does not exist".to_string()));
        }
        Ok(json!({"target": self.target, "model": operation.model}))
    }
}

// ============================================================================
// SECTION: Stack Sources
// ============================================================================

/// Stack capture cycling through fixed traces.
pub struct ScriptedStack {
    /// Traces returned in rotation.
    traces: Vec<String>,
    /// Index of the next trace.
    next: AtomicUsize,
}

impl ScriptedStack {
    /// Stack source rotating through `traces`.
    pub fn new(traces: Vec<String>) -> Self {
        Self {
            traces,
            next: AtomicUsize::new(0),
        }
    }

    /// A single application frame at `file:line`.
    pub fn at(file: &str, line: u32) -> Self {
        Self::new(vec![app_trace(file, line)])
    }
}

impl StackCapture for ScriptedStack {
    fn capture(&self) -> String {
        if self.traces.is_empty() {
            return String::new();
        }
        let index = self.next.fetch_add(1, Ordering::SeqCst) % self.traces.len();
        self.traces[index].clone()
    }
}

/// Renders a Rust-style backtrace whose first application frame is `file:line`.
pub fn app_trace(file: &str, line: u32) -> String {
    format!(
        "   0: std::backtrace::Backtrace::force_capture\n             at /rustc/x/library/std/src/backtrace.rs:312:13\n   \
         1: tenant_store_core::instrument::QueryInstrumentation::observe\n             at ./src/instrument.rs:140:9\n   \
         2: app::loader::load\n             at {file}:{line}:5\n   \
         3: app::main\n             at src/main.rs:1:1"
    )
}
