//! Audit events emitted by the envelope core.
//!
//! The core only produces events; storing, exporting and rotating the audit
//! log belong to the [`AuditSink`] implementation supplied by the host.
//! Event details never contain plaintext field values or key material.

use crate::identity::{Requester, Role, UserId};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Action recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    RecordCreate,
    RecordRead,
    RecordList,
    KeyRegister,
    KeyRotate,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::RecordCreate => write!(f, "record_create"),
            AuditAction::RecordRead => write!(f, "record_read"),
            AuditAction::RecordList => write!(f, "record_list"),
            AuditAction::KeyRegister => write!(f, "key_register"),
            AuditAction::KeyRotate => write!(f, "key_rotate"),
        }
    }
}

/// Decision recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditDecision {
    Allowed,
    Denied,
    Failed,
}

/// A single audit log entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub action: AuditAction,
    pub actor_id: Option<UserId>,
    pub actor_role: Option<Role>,
    pub target_id: Option<String>,
    pub target_type: Option<String>,
    pub decision: AuditDecision,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, decision: AuditDecision) -> Self {
        Self {
            id: Uuid::now_v7(),
            action,
            actor_id: None,
            actor_role: None,
            target_id: None,
            target_type: None,
            decision,
            details: String::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_actor(mut self, requester: &Requester) -> Self {
        self.actor_id = Some(requester.id.clone());
        self.actor_role = Some(requester.role);
        self
    }

    pub fn with_target(mut self, target_type: &str, target_id: impl Into<String>) -> Self {
        self.target_type = Some(target_type.to_string());
        self.target_id = Some(target_id.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = details.into();
        self
    }
}

/// Destination for audit events.
///
/// Recording is infallible from the core's point of view: a sink that cannot
/// persist an event must deal with that itself rather than fail the request.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent);
}

// ── TracingAuditSink ────────────────────────────────────────────

/// Writes audit events to the `medvault::audit` tracing target.
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: AuditEvent) {
        let actor = event.actor_id.as_ref().map(UserId::as_str).unwrap_or("-");
        let target = event.target_id.as_deref().unwrap_or("-");
        match event.decision {
            AuditDecision::Allowed => info!(
                target: "medvault::audit",
                action = %event.action,
                actor,
                target_id = target,
                "{}",
                event.details
            ),
            AuditDecision::Denied | AuditDecision::Failed => warn!(
                target: "medvault::audit",
                action = %event.action,
                decision = ?event.decision,
                actor,
                target_id = target,
                "{}",
                event.details
            ),
        }
    }
}

// ── MemoryAuditSink ─────────────────────────────────────────────

/// Keeps events in memory, bounded to the most recent `capacity` entries.
#[derive(Clone)]
pub struct MemoryAuditSink {
    events: Arc<RwLock<Vec<AuditEvent>>>,
    capacity: usize,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::with_capacity(10_000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            capacity,
        }
    }

    /// Returns a snapshot of recorded events, oldest first.
    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    /// Returns recorded events for one action.
    pub async fn events_for(&self, action: AuditAction) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|e| e.action == action)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: AuditEvent) {
        let mut events = self.events.write().await;
        events.push(event);
        if events.len() > self.capacity {
            let excess = events.len() - self.capacity;
            events.drain(..excess);
        }
    }
}
