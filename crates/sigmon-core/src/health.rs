//! Health and watchdog supervision
//!
//! Components report their state with [`HealthCheck::update_component_status`];
//! the pipeline bumps counters with `record_message` / `record_error`. Two
//! background loops run once [`HealthCheck::start`] is called:
//!
//! - the check loop refreshes uptime and re-derives overall health
//! - the watchdog loop raises a [`WatchdogAlarm`] when the check loop has
//!   not ticked for longer than the watchdog timeout

use crate::config::HealthSettings;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HealthError {
    #[error("health supervisor already running")]
    AlreadyRunning,
}

/// Health of a single pipeline component
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentStatus {
    pub name: String,
    pub healthy: bool,
    pub message: String,
    pub last_check: DateTime<Utc>,
}

/// Component state as seen by readers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComponentState {
    /// Never reported
    Unknown,
    Healthy,
    Unhealthy,
}

/// Aggregate health, returned to readers as an independent copy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Status {
    pub healthy: bool,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub messages_processed: u64,
    pub sessions_active: u64,
    pub error_count: u64,
    pub last_error: Option<String>,
    pub component_status: BTreeMap<String, ComponentStatus>,
}

impl Status {
    fn new() -> Self {
        Self {
            healthy: true,
            timestamp: Utc::now(),
            uptime_seconds: 0,
            messages_processed: 0,
            sessions_active: 0,
            error_count: 0,
            last_error: None,
            component_status: BTreeMap::new(),
        }
    }

    fn derive_health(&mut self) {
        self.healthy = self.component_status.values().all(|c| c.healthy);
    }

    /// Export in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let mut output = String::new();

        output.push_str("# HELP sigmon_healthy Overall health (1 = healthy)\n");
        output.push_str("# TYPE sigmon_healthy gauge\n");
        output.push_str(&format!("sigmon_healthy {}\n\n", u8::from(self.healthy)));

        output.push_str("# HELP sigmon_uptime_seconds Time since the supervisor started\n");
        output.push_str("# TYPE sigmon_uptime_seconds gauge\n");
        output.push_str(&format!("sigmon_uptime_seconds {}\n\n", self.uptime_seconds));

        output.push_str("# HELP sigmon_messages_processed_total Decoded signaling messages\n");
        output.push_str("# TYPE sigmon_messages_processed_total counter\n");
        output.push_str(&format!(
            "sigmon_messages_processed_total {}\n\n",
            self.messages_processed
        ));

        output.push_str("# HELP sigmon_errors_total Decode and pipeline errors\n");
        output.push_str("# TYPE sigmon_errors_total counter\n");
        output.push_str(&format!("sigmon_errors_total {}\n\n", self.error_count));

        output.push_str("# HELP sigmon_sessions_active Active correlated sessions\n");
        output.push_str("# TYPE sigmon_sessions_active gauge\n");
        output.push_str(&format!("sigmon_sessions_active {}\n\n", self.sessions_active));

        if !self.component_status.is_empty() {
            output.push_str("# HELP sigmon_component_healthy Per-component health (1 = healthy)\n");
            output.push_str("# TYPE sigmon_component_healthy gauge\n");
            for (name, component) in &self.component_status {
                output.push_str(&format!(
                    "sigmon_component_healthy{{component=\"{}\"}} {}\n",
                    name,
                    u8::from(component.healthy)
                ));
            }
            output.push('\n');
        }

        output
    }
}

/// Raised when the check loop has stalled past the watchdog timeout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchdogAlarm {
    pub stalled_for: Duration,
    pub timeout: Duration,
}

impl fmt::Display for WatchdogAlarm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "watchdog timeout: no health check for {:?} (limit {:?})",
            self.stalled_for, self.timeout
        )
    }
}

/// Edge detector: fires once when a stall crosses the timeout and re-arms
/// when a fresh check is observed.
#[derive(Debug, Default)]
pub struct WatchdogState {
    tripped: bool,
}

impl WatchdogState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true exactly once per sustained stall
    pub fn observe(&mut self, since_last_check: Duration, timeout: Duration) -> bool {
        if since_last_check > timeout {
            if self.tripped {
                return false;
            }
            self.tripped = true;
            true
        } else {
            self.tripped = false;
            false
        }
    }
}

struct State {
    status: Status,
    started: Instant,
    last_check: Instant,
}

/// Health supervisor shared by every pipeline component
pub struct HealthCheck {
    settings: HealthSettings,
    state: Arc<Mutex<State>>,
    /// Loop handles while started, `None` when stopped
    tasks: Mutex<Option<Vec<JoinHandle<()>>>>,
}

impl HealthCheck {
    pub fn new(settings: HealthSettings) -> Self {
        let now = Instant::now();
        Self {
            settings,
            state: Arc::new(Mutex::new(State {
                status: Status::new(),
                started: now,
                last_check: now,
            })),
            tasks: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &HealthSettings {
        &self.settings
    }

    /// Spawn the enabled loops; alarms arrive on the returned receiver
    pub fn start(&self) -> Result<mpsc::Receiver<WatchdogAlarm>, HealthError> {
        let mut running = self.tasks.lock();
        if running.is_some() {
            warn!("Health supervisor already started");
            return Err(HealthError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::channel(4);
        let tasks = running.insert(Vec::new());

        {
            // Loops measure stalls from the moment they start
            let mut state = self.state.lock();
            state.last_check = Instant::now();
        }

        if self.settings.enabled {
            tasks.push(tokio::spawn(check_loop(
                self.state.clone(),
                self.settings.check_interval(),
            )));
        }

        if self.settings.watchdog_enabled {
            tasks.push(tokio::spawn(watchdog_loop(
                self.state.clone(),
                self.settings.watchdog_timeout(),
                self.settings.restart_on_failure,
                tx,
            )));
        }

        info!(
            check = self.settings.enabled,
            watchdog = self.settings.watchdog_enabled,
            "Health supervisor started"
        );
        Ok(rx)
    }

    /// Abort both loops; the supervisor may be started again afterwards
    pub fn stop(&self) {
        if let Some(tasks) = self.tasks.lock().take() {
            for task in tasks {
                task.abort();
            }
            debug!("Health supervisor stopped");
        }
    }

    pub fn status(&self) -> Status {
        self.state.lock().status.clone()
    }

    pub fn is_healthy(&self) -> bool {
        self.state.lock().status.healthy
    }

    pub fn component_state(&self, name: &str) -> ComponentState {
        match self.state.lock().status.component_status.get(name) {
            None => ComponentState::Unknown,
            Some(c) if c.healthy => ComponentState::Healthy,
            Some(_) => ComponentState::Unhealthy,
        }
    }

    pub fn update_component_status(&self, name: &str, healthy: bool, message: impl Into<String>) {
        let mut state = self.state.lock();
        state.status.component_status.insert(
            name.to_string(),
            ComponentStatus {
                name: name.to_string(),
                healthy,
                message: message.into(),
                last_check: Utc::now(),
            },
        );
        state.status.derive_health();
    }

    pub fn record_message(&self) {
        self.state.lock().status.messages_processed += 1;
    }

    pub fn record_error(&self, err: impl fmt::Display) {
        let mut state = self.state.lock();
        state.status.error_count += 1;
        state.status.last_error = Some(err.to_string());
    }

    pub fn update_session_count(&self, count: u64) {
        self.state.lock().status.sessions_active = count;
    }
}

impl Drop for HealthCheck {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().take().into_iter().flatten() {
            task.abort();
        }
    }
}

async fn check_loop(state: Arc<Mutex<State>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let mut state = state.lock();
        let now = Instant::now();
        state.last_check = now;
        state.status.timestamp = Utc::now();
        state.status.uptime_seconds = now.duration_since(state.started).as_secs();
        state.status.derive_health();
    }
}

async fn watchdog_loop(
    state: Arc<Mutex<State>>,
    timeout: Duration,
    restart_on_failure: bool,
    alarms: mpsc::Sender<WatchdogAlarm>,
) {
    let mut ticker = tokio::time::interval(timeout / 2);
    let mut watchdog = WatchdogState::new();

    loop {
        ticker.tick().await;
        let since_last_check = state.lock().last_check.elapsed();

        if !watchdog.observe(since_last_check, timeout) {
            continue;
        }

        let alarm = WatchdogAlarm {
            stalled_for: since_last_check,
            timeout,
        };

        if restart_on_failure {
            error!("{}", alarm);
            if alarms.try_send(alarm).is_err() {
                warn!("Watchdog alarm receiver unavailable");
            }
        } else {
            warn!("{} (restart disabled)", alarm);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(enabled: bool, check_ms: u64, watchdog: bool, timeout_ms: u64) -> HealthSettings {
        HealthSettings {
            enabled,
            check_interval_ms: check_ms,
            watchdog_enabled: watchdog,
            watchdog_timeout_ms: timeout_ms,
            restart_on_failure: true,
        }
    }

    #[test]
    fn test_watchdog_state_fires_once_per_stall() {
        let timeout = Duration::from_secs(10);
        let mut wd = WatchdogState::new();

        assert!(!wd.observe(Duration::from_secs(3), timeout));
        assert!(wd.observe(Duration::from_secs(11), timeout));
        assert!(!wd.observe(Duration::from_secs(16), timeout));
        assert!(!wd.observe(Duration::from_secs(21), timeout));

        // A fresh check re-arms the detector
        assert!(!wd.observe(Duration::from_secs(1), timeout));
        assert!(wd.observe(Duration::from_secs(12), timeout));
    }

    #[test]
    fn test_watchdog_state_ignores_short_stalls() {
        let timeout = Duration::from_secs(10);
        let mut wd = WatchdogState::new();
        for secs in [2, 9, 10, 4, 10] {
            assert!(!wd.observe(Duration::from_secs(secs), timeout));
        }
    }

    #[test]
    fn test_overall_health_is_and_of_components() {
        let hc = HealthCheck::new(HealthSettings::default());
        assert!(hc.is_healthy());
        assert_eq!(hc.component_state("capture"), ComponentState::Unknown);

        hc.update_component_status("capture", true, "running");
        hc.update_component_status("decoder", false, "no decoders");
        assert!(!hc.is_healthy());
        assert_eq!(hc.component_state("decoder"), ComponentState::Unhealthy);

        hc.update_component_status("decoder", true, "5 decoders");
        assert!(hc.is_healthy());
        assert_eq!(hc.component_state("decoder"), ComponentState::Healthy);
    }

    #[test]
    fn test_status_is_a_deep_copy() {
        let hc = HealthCheck::new(HealthSettings::default());
        hc.update_component_status("capture", true, "running");

        let mut snapshot = hc.status();
        snapshot.component_status.clear();
        snapshot.messages_processed = 99;

        let status = hc.status();
        assert_eq!(status.component_status.len(), 1);
        assert_eq!(status.messages_processed, 0);
    }

    #[test]
    fn test_counters() {
        let hc = HealthCheck::new(HealthSettings::default());
        hc.record_message();
        hc.record_message();
        hc.record_error("CAP: insufficient data");
        hc.update_session_count(7);

        let status = hc.status();
        assert_eq!(status.messages_processed, 2);
        assert_eq!(status.error_count, 1);
        assert_eq!(status.last_error.as_deref(), Some("CAP: insufficient data"));
        assert_eq!(status.sessions_active, 7);
    }

    #[test]
    fn test_prometheus_export() {
        let hc = HealthCheck::new(HealthSettings::default());
        hc.update_component_status("capture", false, "stopped");
        hc.record_message();

        let text = hc.status().to_prometheus();
        assert!(text.contains("sigmon_healthy 0"));
        assert!(text.contains("sigmon_messages_processed_total 1"));
        assert!(text.contains("sigmon_component_healthy{component=\"capture\"} 0"));
    }

    #[tokio::test]
    async fn test_stalled_checks_raise_one_alarm() {
        // Check loop disabled: last_check never advances
        let hc = HealthCheck::new(settings(false, 1000, true, 100));
        let mut alarms = hc.start().unwrap();

        let alarm = tokio::time::timeout(Duration::from_secs(2), alarms.recv())
            .await
            .expect("alarm in time")
            .expect("channel open");
        assert_eq!(alarm.timeout, Duration::from_millis(100));
        assert!(alarm.stalled_for > alarm.timeout);

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(alarms.try_recv().is_err());

        hc.stop();
    }

    #[tokio::test]
    async fn test_running_checks_keep_watchdog_quiet() {
        let hc = HealthCheck::new(settings(true, 10, true, 200));
        let mut alarms = hc.start().unwrap();

        tokio::time::sleep(Duration::from_millis(500)).await;
        assert!(alarms.try_recv().is_err());
        hc.stop();
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_until_stopped() {
        let hc = HealthCheck::new(settings(false, 1000, false, 1000));
        let _alarms = hc.start().unwrap();
        assert_eq!(hc.start().unwrap_err(), HealthError::AlreadyRunning);

        hc.stop();
        assert!(hc.start().is_ok());
        hc.stop();
    }
}
