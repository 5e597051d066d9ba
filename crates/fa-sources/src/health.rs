//! Connection health of a source
//!
//! A streaming source runs two tasks against the same [`SourceHealth`]: the
//! reconnect loop and the health-check loop. Every field is a single atomic so
//! neither task ever holds a lock across an await point.
//!
//! ```text
//! Disconnected → Connecting → Connected
//!                     ↘            ↓
//!                      Disconnected
//! ```

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Connection lifecycle of a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
}

/// Error when an invalid state transition is attempted
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid connection transition from {from:?} to {to:?}: {reason}")]
pub struct InvalidTransition {
    pub from: ConnectionState,
    pub to: ConnectionState,
    pub reason: &'static str,
}

impl ConnectionState {
    /// Attempt a transition to a new state
    pub fn try_transition(self, to: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        use ConnectionState::*;

        let valid = matches!(
            (self, to),
            (Disconnected, Connecting)
                | (Connecting, Connected)
                | (Connecting, Disconnected)
                | (Connected, Disconnected)
        );

        if valid {
            Ok(to)
        } else {
            Err(InvalidTransition {
                from: self,
                to,
                reason: Self::transition_error_reason(self, to),
            })
        }
    }

    pub fn can_transition_to(self, to: ConnectionState) -> bool {
        self.try_transition(to).is_ok()
    }

    fn transition_error_reason(from: ConnectionState, to: ConnectionState) -> &'static str {
        use ConnectionState::*;

        match (from, to) {
            (a, b) if a == b => "already in this state",
            (Disconnected, Connected) => "must connect before being connected",
            (Connected, Connecting) => "must disconnect before reconnecting",
            _ => "transition not allowed",
        }
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Exponential reconnect backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max: max.max(base),
        }
    }

    /// `min(base * 2^attempt, max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        2u32.checked_pow(attempt)
            .and_then(|factor| self.base.checked_mul(factor))
            .map_or(self.max, |delay| delay.min(self.max))
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(300))
    }
}

const NO_EVENT: i64 = i64::MIN;

/// Health record of one source
#[derive(Debug)]
pub struct SourceHealth {
    source_id: String,
    healthy: AtomicBool,
    reconnect_attempts: AtomicU32,
    reconnect_delay_ms: AtomicU64,
    /// Milliseconds since the epoch, `NO_EVENT` until the first event
    last_event_ms: AtomicI64,
    state: AtomicU8,
}

impl SourceHealth {
    /// A disconnected, not yet healthy record
    pub fn new(source_id: impl Into<String>, initial_delay: Duration) -> Self {
        Self {
            source_id: source_id.into(),
            healthy: AtomicBool::new(false),
            reconnect_attempts: AtomicU32::new(0),
            reconnect_delay_ms: AtomicU64::new(duration_ms(initial_delay)),
            last_event_ms: AtomicI64::new(NO_EVENT),
            state: AtomicU8::new(ConnectionState::Disconnected as u8),
        }
    }

    /// Record for a source without a connection of its own
    pub fn passive(source_id: impl Into<String>) -> Self {
        let health = Self::new(source_id, Duration::ZERO);
        health.healthy.store(true, Ordering::SeqCst);
        health
            .state
            .store(ConnectionState::Connected as u8, Ordering::SeqCst);
        health
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Delay the next failed attempt will wait
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms.load(Ordering::SeqCst))
    }

    pub fn last_event_time(&self) -> Option<DateTime<Utc>> {
        match self.last_event_ms.load(Ordering::SeqCst) {
            NO_EVENT => None,
            ms => Utc.timestamp_millis_opt(ms).single(),
        }
    }

    pub fn set_last_event_time(&self, at: Option<DateTime<Utc>>) {
        let ms = at.map_or(NO_EVENT, |t| t.timestamp_millis());
        self.last_event_ms.store(ms, Ordering::SeqCst);
    }

    pub fn record_event(&self) {
        self.set_last_event_time(Some(Utc::now()));
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Move to `to` if the transition is valid from the current state
    pub fn transition(&self, to: ConnectionState) -> Result<ConnectionState, InvalidTransition> {
        let mut current = self.state();
        loop {
            current.try_transition(to)?;
            match self.state.compare_exchange(
                current as u8,
                to as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return Ok(to),
                Err(actual) => current = ConnectionState::from_u8(actual),
            }
        }
    }

    /// Successful connect: healthy, counters reset, staleness clock restarted
    pub fn mark_connected(&self, backoff: &Backoff) -> Result<(), InvalidTransition> {
        self.transition(ConnectionState::Connected)?;
        self.healthy.store(true, Ordering::SeqCst);
        self.reconnect_attempts.store(0, Ordering::SeqCst);
        self.reconnect_delay_ms
            .store(duration_ms(backoff.base), Ordering::SeqCst);
        self.record_event();
        Ok(())
    }

    /// Connection lost or never established
    pub fn mark_disconnected(&self) {
        self.healthy.store(false, Ordering::SeqCst);
        self.state
            .store(ConnectionState::Disconnected as u8, Ordering::SeqCst);
    }

    /// Record a failed attempt and return how long to wait before the next one
    pub fn record_failure(&self, backoff: &Backoff) -> Duration {
        self.healthy.store(false, Ordering::SeqCst);
        let wait = self.reconnect_delay();
        let attempts = self
            .reconnect_attempts
            .fetch_add(1, Ordering::SeqCst)
            .saturating_add(1);
        self.reconnect_delay_ms
            .store(duration_ms(backoff.delay_for(attempts)), Ordering::SeqCst);
        wait
    }

    /// True when no event arrived within `stale_after`
    pub fn is_stale(&self, stale_after: Duration, now: DateTime<Utc>) -> bool {
        match self.last_event_time() {
            Some(last) => (now - last).to_std().map_or(false, |idle| idle > stale_after),
            None => false,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        HealthSnapshot {
            healthy: self.is_healthy(),
            state: self.state(),
            reconnect_attempts: self.reconnect_attempts(),
            reconnect_delay_secs: self.reconnect_delay().as_secs_f64(),
            last_event_time: self.last_event_time(),
        }
    }
}

/// Point-in-time view of a [`SourceHealth`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthSnapshot {
    pub healthy: bool,
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    pub reconnect_delay_secs: f64,
    pub last_event_time: Option<DateTime<Utc>>,
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
