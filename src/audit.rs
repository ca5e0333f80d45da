//! Structured audit trail for authentication decisions.
//!
//! Recording must never slow down or fail a login, so events go through a
//! bounded channel to a background writer. When the queue is full the event
//! is dropped and counted against a warning log line; audit here is
//! best-effort by contract.

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::store::AuditSink;

const DEFAULT_QUEUE_DEPTH: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One recorded authentication event.
///
/// Failure events for unknown users and wrong passwords carry the same
/// `action`/`reason` shape so the trail itself cannot be used to tell the two
/// cases apart.
#[derive(Clone, Debug)]
pub struct AuditEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub action: String,
    pub outcome: AuditOutcome,
    /// Stable error code on failure, `None` on success.
    pub reason: Option<String>,
    pub actor: Option<Uuid>,
    pub username: Option<String>,
    pub ip: Option<IpAddr>,
}

impl AuditEvent {
    #[must_use]
    pub fn success(action: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            at,
            action: action.into(),
            outcome: AuditOutcome::Success,
            reason: None,
            actor: None,
            username: None,
            ip: None,
        }
    }

    #[must_use]
    pub fn failure(action: impl Into<String>, reason: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            at,
            action: action.into(),
            outcome: AuditOutcome::Failure,
            reason: Some(reason.into()),
            actor: None,
            username: None,
            ip: None,
        }
    }

    #[must_use]
    pub fn with_actor(mut self, actor: Uuid) -> Self {
        self.actor = Some(actor);
        self
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }
}

/// Hands events to a background writer without blocking the caller.
pub struct AuditRecorder {
    tx: mpsc::Sender<AuditEvent>,
}

impl AuditRecorder {
    /// Spawn the writer task with the default queue depth.
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_queue_depth(sink, DEFAULT_QUEUE_DEPTH)
    }

    #[must_use]
    pub fn with_queue_depth(sink: Arc<dyn AuditSink>, depth: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(depth);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if let Err(err) = sink.append(event).await {
                    warn!(error = %err, "failed to persist audit event");
                }
            }
        });
        Self { tx }
    }

    /// Queue an event. Drops it with a warning when the queue is full or the
    /// writer is gone.
    pub fn record(&self, event: AuditEvent) {
        if let Err(err) = self.tx.try_send(event) {
            match err {
                mpsc::error::TrySendError::Full(dropped) => {
                    warn!(action = %dropped.action, "audit queue full, dropping event");
                }
                mpsc::error::TrySendError::Closed(dropped) => {
                    warn!(action = %dropped.action, "audit writer gone, dropping event");
                }
            }
        }
    }
}
