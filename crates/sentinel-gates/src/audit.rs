//! # Action Audit Log
//!
//! Bounded, append-only record of governance actions.
//!
//! ## Hard Laws
//! 1. Entries are never updated or deleted; the oldest is evicted once the
//!    ring is full.
//! 2. Ids come from one append sequence taken under the same lock as the ring,
//!    so id order equals buffer order.
//! 3. `recent(n)` is most-recent-first.

use crate::certification::{CertLevel, CertificationSummary};
use crate::health::{Mode, SystemHealthSnapshot};
use crate::kill_switch::{ActorId, ModuleId, ToggleOutcome};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::debug;

/// Default ring capacity.
pub const DEFAULT_AUDIT_CAPACITY: usize = 50;

// =============================================================================
// Entry
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditKind {
    HealthRecomputed,
    SwitchToggled,
    PhaseEvaluated,
    ReconcileFailed,
}

impl std::fmt::Display for AuditKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditKind::HealthRecomputed => write!(f, "HEALTH_RECOMPUTED"),
            AuditKind::SwitchToggled => write!(f, "SWITCH_TOGGLED"),
            AuditKind::PhaseEvaluated => write!(f, "PHASE_EVALUATED"),
            AuditKind::ReconcileFailed => write!(f, "RECONCILE_FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditPayload {
    HealthRecomputed {
        score: f64,
        mode: Mode,
        errors_last_hour: u32,
        active_interlock_count: u32,
    },
    SwitchToggled {
        module: ModuleId,
        is_active: bool,
        previously_active: bool,
        reason: String,
        actor: ActorId,
        /// Issued by the interlock controller rather than an operator.
        automatic: bool,
        /// Manual deactivation of a safety module while the latch condition held.
        overrides_safety_invariant: bool,
        sequence: u64,
        #[serde(default)]
        superseded: bool,
    },
    PhaseEvaluated {
        overall_progress_pct: u32,
        level: CertLevel,
        phase1_pct: u32,
        phase2_pct: u32,
        phase3_pct: u32,
    },
    ReconcileFailed {
        module: ModuleId,
        mode: Mode,
        error: String,
    },
}

impl AuditPayload {
    pub fn kind(&self) -> AuditKind {
        match self {
            AuditPayload::HealthRecomputed { .. } => AuditKind::HealthRecomputed,
            AuditPayload::SwitchToggled { .. } => AuditKind::SwitchToggled,
            AuditPayload::PhaseEvaluated { .. } => AuditKind::PhaseEvaluated,
            AuditPayload::ReconcileFailed { .. } => AuditKind::ReconcileFailed,
        }
    }

    pub fn health(snapshot: &SystemHealthSnapshot) -> Self {
        AuditPayload::HealthRecomputed {
            score: snapshot.score,
            mode: snapshot.mode,
            errors_last_hour: snapshot.errors_last_hour,
            active_interlock_count: snapshot.active_interlock_count,
        }
    }

    pub fn toggle(
        outcome: &ToggleOutcome,
        reason: &str,
        actor: &ActorId,
        automatic: bool,
        overrides: bool,
    ) -> Self {
        AuditPayload::SwitchToggled {
            module: outcome.switch.module.clone(),
            is_active: outcome.switch.is_active,
            previously_active: outcome.previously_active,
            reason: reason.to_string(),
            actor: actor.clone(),
            automatic,
            overrides_safety_invariant: overrides,
            sequence: outcome.sequence,
            superseded: outcome.superseded,
        }
    }

    pub fn certification(summary: &CertificationSummary) -> Self {
        AuditPayload::PhaseEvaluated {
            overall_progress_pct: summary.overall_progress_pct,
            level: summary.level,
            phase1_pct: summary.phases.phase1.progress_pct,
            phase2_pct: summary.phases.phase2.progress_pct,
            phase3_pct: summary.phases.phase3.progress_pct,
        }
    }
}

/// One audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Assigned by [`ActionAuditLog::append`]; 0 until appended.
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub kind: AuditKind,
    pub payload: AuditPayload,
}

impl AuditEntry {
    pub fn new(timestamp: DateTime<Utc>, payload: AuditPayload) -> Self {
        Self {
            id: 0,
            timestamp,
            kind: payload.kind(),
            payload,
        }
    }

    /// One-line operator message.
    pub fn message(&self) -> String {
        match &self.payload {
            AuditPayload::HealthRecomputed {
                score,
                mode,
                errors_last_hour,
                ..
            } => format!(
                "[HEALTH] mode={} dhi={:.1}% errors_1h={}",
                mode.as_str().to_uppercase(),
                score * 100.0,
                errors_last_hour
            ),
            AuditPayload::SwitchToggled {
                module,
                is_active,
                reason,
                overrides_safety_invariant,
                ..
            } => {
                let state = if *is_active { "ACTIVE" } else { "INACTIVE" };
                let flag = if *overrides_safety_invariant { " [OVERRIDE]" } else { "" };
                format!("[KILL] {module} => {state} ({reason}){flag}")
            }
            AuditPayload::PhaseEvaluated {
                overall_progress_pct,
                level,
                ..
            } => format!("[CERT] overall={overall_progress_pct}% level={level}"),
            AuditPayload::ReconcileFailed { module, mode, error } => {
                format!("[RECONCILE] failed module={module} mode={mode}: {error}")
            }
        }
    }
}

// =============================================================================
// Ring
// =============================================================================

#[derive(Debug)]
struct Ring {
    entries: VecDeque<AuditEntry>,
    appended: u64,
}

/// Bounded ring of [`AuditEntry`].
#[derive(Debug)]
pub struct ActionAuditLog {
    ring: Mutex<Ring>,
    capacity: usize,
}

impl ActionAuditLog {
    /// Capacity is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            ring: Mutex::new(Ring {
                entries: VecDeque::with_capacity(capacity),
                appended: 0,
            }),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest when full. Returns the assigned id.
    pub fn append(&self, mut entry: AuditEntry) -> u64 {
        let mut ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.appended += 1;
        entry.id = ring.appended;
        let id = entry.id;

        debug!(id, kind = %entry.kind, "{}", entry.message());

        if ring.entries.len() == self.capacity {
            ring.entries.pop_front();
        }
        ring.entries.push_back(entry);
        id
    }

    pub fn record(&self, timestamp: DateTime<Utc>, payload: AuditPayload) -> u64 {
        self.append(AuditEntry::new(timestamp, payload))
    }

    /// Up to `n` entries, most recent first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let ring = self.ring.lock().unwrap_or_else(|e| e.into_inner());
        ring.entries.iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Entries appended since construction, including evicted ones.
    pub fn total_appended(&self) -> u64 {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).appended
    }
}

impl Default for ActionAuditLog {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}
