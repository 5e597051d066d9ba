//! Human confirmation of sensitive tool calls
//!
//! A caller registers a request and waits on a oneshot channel; whoever
//! reviews the request resolves it by id. The wait is bounded by
//! `min(requested, max_timeout)` and the request leaves the pending map on
//! every exit path, including cancellation of the waiting future.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

/// A tool call waiting for approval
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConfirmationRequest {
    pub id: String,
    pub conversation_id: String,
    pub tool_name: String,
    pub arguments: Value,
    pub created_at: DateTime<Utc>,
}

impl ConfirmationRequest {
    pub fn new(
        conversation_id: impl Into<String>,
        tool_name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            conversation_id: conversation_id.into(),
            tool_name: tool_name.into(),
            arguments,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Approved,
    Denied,
    TimedOut,
}

struct Pending {
    request: ConfirmationRequest,
    reply: oneshot::Sender<bool>,
}

/// Registry of confirmation requests awaiting a decision
pub struct PendingConfirmations {
    max_timeout: Duration,
    pending: DashMap<String, Pending>,
}

/// Removes the request when the wait ends, however it ends
struct PendingGuard<'a> {
    pending: &'a DashMap<String, Pending>,
    id: String,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.id);
    }
}

impl PendingConfirmations {
    pub fn new(max_timeout: Duration) -> Self {
        Self {
            max_timeout,
            pending: DashMap::new(),
        }
    }

    pub fn max_timeout(&self) -> Duration {
        self.max_timeout
    }

    /// Register `request` and wait for a decision
    pub async fn request(
        &self,
        request: ConfirmationRequest,
        timeout: Duration,
    ) -> ConfirmationOutcome {
        let effective = timeout.min(self.max_timeout);
        let (reply, decision) = oneshot::channel();
        let id = request.id.clone();

        info!(
            request_id = %id,
            tool = %request.tool_name,
            timeout_secs = effective.as_secs_f64(),
            "Waiting for confirmation"
        );
        self.pending.insert(id.clone(), Pending { request, reply });
        let _guard = PendingGuard {
            pending: &self.pending,
            id: id.clone(),
        };

        match tokio::time::timeout(effective, decision).await {
            Ok(Ok(true)) => ConfirmationOutcome::Approved,
            Ok(Ok(false)) | Ok(Err(_)) => ConfirmationOutcome::Denied,
            Err(_) => {
                debug!(request_id = %id, "Confirmation timed out");
                ConfirmationOutcome::TimedOut
            }
        }
    }

    /// Deliver a decision; false when no such request is waiting
    pub fn resolve(&self, id: &str, approved: bool) -> bool {
        match self.pending.remove(id) {
            Some((_, pending)) => pending.reply.send(approved).is_ok(),
            None => false,
        }
    }

    /// Requests currently waiting, oldest first
    pub fn list_pending(&self) -> Vec<ConfirmationRequest> {
        let mut requests: Vec<ConfirmationRequest> = self
            .pending
            .iter()
            .map(|entry| entry.value().request.clone())
            .collect();
        requests.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        requests
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
