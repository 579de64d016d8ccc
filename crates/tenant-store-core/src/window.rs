// crates/tenant-store-core/src/window.rs
// ============================================================================
// Module: Operation Window Tracker
// Description: Sliding-window burst detection keyed by operation signature.
// Purpose: Flag repeated identical reads issued in quick succession.
// Dependencies: tenant-store-config
// ============================================================================

//! ## Overview
//! The tracker keeps one [`WindowEntry`] per operation signature. A repeat
//! within the window increments the entry; reaching the threshold emits a
//! [`BurstWarning`] and deletes the entry so the next occurrence starts a
//! fresh window. Once the table grows past its size cap, entries idle for
//! `window * stale_multiple` are evicted.
//!
//! Security posture: signatures embed filter values; the table is bounded
//! and never persisted.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

use tenant_store_config::InstrumentationConfig;

use crate::call_site::CallSite;
use crate::clock::Clock;
use crate::clock::SystemClock;
use crate::diagnostics::BurstWarning;
use crate::diagnostics::CallSiteCount;
use crate::diagnostics::DiagnosticEvent;
use crate::diagnostics::DiagnosticSink;
use crate::error::InstrumentationError;
use crate::operation::OperationSignature;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Window tracker tuning.
///
/// # Invariants
/// - `threshold >= 2`, `max_entries >= 1`, `stale_multiple >= 1` when built
///   from a validated [`InstrumentationConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSettings {
    /// Window size in milliseconds.
    pub window_ms: u64,
    /// Occurrences within the window that trigger a warning.
    pub threshold: u32,
    /// Table size above which stale eviction runs.
    pub max_entries: usize,
    /// Idle multiple of the window after which an entry is stale.
    pub stale_multiple: u32,
}

impl WindowSettings {
    /// Returns the window as a duration.
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Returns the idle age at which entries are evicted.
    #[must_use]
    pub fn stale_after(&self) -> Duration {
        self.window().saturating_mul(self.stale_multiple)
    }
}

impl Default for WindowSettings {
    fn default() -> Self {
        Self::from(&InstrumentationConfig::default())
    }
}

impl From<&InstrumentationConfig> for WindowSettings {
    fn from(config: &InstrumentationConfig) -> Self {
        Self {
            window_ms: config.window_ms,
            threshold: config.threshold,
            max_entries: config.max_entries,
            stale_multiple: config.stale_multiple,
        }
    }
}

// ============================================================================
// SECTION: Entries
// ============================================================================

/// Occurrence record for one signature.
#[derive(Debug, Clone)]
pub struct WindowEntry {
    /// Occurrences in the current window.
    pub count: u32,
    /// Instant of the latest occurrence.
    pub last_seen_at: Instant,
    /// Resolved call sites in arrival order.
    pub call_sites: Vec<CallSite>,
}

impl WindowEntry {
    /// Starts a new window at `now`.
    fn start(now: Instant, call_site: Option<CallSite>) -> Self {
        Self {
            count: 1,
            last_seen_at: now,
            call_sites: call_site.into_iter().collect(),
        }
    }
}

// ============================================================================
// SECTION: Tracker
// ============================================================================

/// Signature-keyed sliding-window tracker.
///
/// # Invariants
/// - Check, increment, and evict-or-insert for one `record` call happen under
///   a single lock acquisition.
/// - Warnings are delivered to the sink after the lock is released.
pub struct OperationWindowTracker {
    /// Tuning.
    settings: WindowSettings,
    /// Entries by signature key.
    entries: Mutex<HashMap<String, WindowEntry>>,
    /// Time source.
    clock: Arc<dyn Clock>,
    /// Destination for burst warnings.
    sink: Arc<dyn DiagnosticSink>,
}

impl OperationWindowTracker {
    /// Creates a tracker using the system clock.
    #[must_use]
    pub fn new(settings: WindowSettings, sink: Arc<dyn DiagnosticSink>) -> Self {
        Self::with_clock(settings, sink, Arc::new(SystemClock))
    }

    /// Creates a tracker with an explicit clock.
    #[must_use]
    pub fn with_clock(
        settings: WindowSettings,
        sink: Arc<dyn DiagnosticSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            settings,
            entries: Mutex::new(HashMap::new()),
            clock,
            sink,
        }
    }

    /// Returns the tracker settings.
    #[must_use]
    pub const fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    /// Records one occurrence of `signature`.
    ///
    /// Returns the warning when this occurrence reached the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`InstrumentationError::Poisoned`] when the table lock is
    /// poisoned.
    pub fn record(
        &self,
        signature: &OperationSignature,
        call_site: Option<CallSite>,
    ) -> Result<Option<BurstWarning>, InstrumentationError> {
        let now = self.clock.now();
        let window = self.settings.window();
        let warning = {
            let mut entries = self.entries.lock().map_err(|_| InstrumentationError::Poisoned)?;
            let key = signature.as_str();
            let fired = match entries.get_mut(key) {
                Some(entry) if now.saturating_duration_since(entry.last_seen_at) < window => {
                    entry.count = entry.count.saturating_add(1);
                    entry.last_seen_at = now;
                    entry.call_sites.extend(call_site);
                    entry.count >= self.settings.threshold
                }
                _ => {
                    entries.insert(key.to_string(), WindowEntry::start(now, call_site));
                    false
                }
            };
            let warning = if fired {
                entries.remove(key).map(|entry| {
                    BurstWarning::new(
                        signature,
                        entry.count,
                        self.settings.window_ms,
                        aggregate_call_sites(&entry.call_sites),
                    )
                })
            } else {
                None
            };
            if entries.len() > self.settings.max_entries {
                let stale_after = self.settings.stale_after();
                entries.retain(|_, entry| now.saturating_duration_since(entry.last_seen_at) < stale_after);
            }
            warning
        };
        if let Some(warning) = &warning {
            self.sink.record(&DiagnosticEvent::BurstWarning(warning.clone()));
        }
        Ok(warning)
    }

    /// Returns the number of tracked signatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    /// Returns true when no signature is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Aggregates call sites per `(file, line)` in first-seen order.
fn aggregate_call_sites(call_sites: &[CallSite]) -> Vec<CallSiteCount> {
    let mut counts: Vec<CallSiteCount> = Vec::new();
    for site in call_sites {
        match counts.iter_mut().find(|count| count.file == site.file && count.line == site.line) {
            Some(count) => count.count = count.count.saturating_add(1),
            None => counts.push(CallSiteCount {
                file: site.file.clone(),
                line: site.line,
                function: site.function.clone(),
                count: 1,
            }),
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    #![allow(clippy::panic, reason = "Test fixtures panic on setup failure.")]

    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::OperationWindowTracker;
    use super::WindowSettings;
    use super::aggregate_call_sites;
    use crate::call_site::CallSite;
    use crate::clock::ManualClock;
    use crate::diagnostics::MemoryDiagnosticSink;
    use crate::operation::ActionKind;
    use crate::operation::Operation;
    use crate::operation::OperationSignature;

    fn signature(id: u64) -> Option<OperationSignature> {
        Operation::new("User", ActionKind::FindUnique, json!({"where": {"id": id}})).signature().ok()
    }

    fn site(file: &str, line: u32) -> CallSite {
        CallSite {
            file: file.to_string(),
            line,
            function: None,
        }
    }

    #[test]
    fn aggregation_preserves_first_seen_order() {
        let counts = aggregate_call_sites(&[site("b.rs", 2), site("a.rs", 1), site("b.rs", 2)]);
        let flat: Vec<(&str, u32, u32)> =
            counts.iter().map(|count| (count.file.as_str(), count.line, count.count)).collect();
        assert_eq!(flat, vec![("b.rs", 2, 2), ("a.rs", 1, 1)]);
    }

    #[test]
    fn threshold_three_fires_on_third_occurrence() {
        let sink = Arc::new(MemoryDiagnosticSink::new());
        let clock = Arc::new(ManualClock::new());
        let settings = WindowSettings {
            threshold: 3,
            ..WindowSettings::default()
        };
        let tracker = OperationWindowTracker::with_clock(settings, sink.clone(), clock.clone());
        let Some(sig) = signature(1) else {
            panic!("signature");
        };
        assert_eq!(tracker.record(&sig, None).ok().flatten(), None);
        clock.advance(Duration::from_millis(10));
        assert_eq!(tracker.record(&sig, None).ok().flatten(), None);
        clock.advance(Duration::from_millis(10));
        let warning = tracker.record(&sig, Some(site("a.rs", 4))).ok().flatten();
        assert_eq!(warning.map(|warning| warning.count), Some(3));
        assert_eq!(sink.bursts().len(), 1);
        assert!(tracker.is_empty());
    }

    #[test]
    fn stale_eviction_keeps_recent_entries() {
        let sink = Arc::new(MemoryDiagnosticSink::new());
        let clock = Arc::new(ManualClock::new());
        let settings = WindowSettings {
            window_ms: 100,
            threshold: 2,
            max_entries: 2,
            stale_multiple: 2,
        };
        let tracker = OperationWindowTracker::with_clock(settings, sink, clock.clone());
        for id in 0..2 {
            let Some(sig) = signature(id) else {
                panic!("signature");
            };
            assert!(tracker.record(&sig, None).is_ok());
        }
        clock.advance(Duration::from_millis(200));
        let Some(fresh) = signature(99) else {
            panic!("signature");
        };
        assert!(tracker.record(&fresh, None).is_ok());
        assert_eq!(tracker.len(), 1);
    }
}
