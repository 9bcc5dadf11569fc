//! # Governance Control View
//!
//! Read-only snapshot of the governance engine for dashboards and the CLI.
//!
//! ## Design Principle
//! The view never holds the engine. It captures health, switches,
//! certification and recent audit entries at one instant, bounded and
//! serializable.

use chrono::{DateTime, Utc};
use sentinel_gates::{
    AuditEntry, CertificationSummary, GovernanceEngine, HealthGuards, KillSwitch,
    KillSwitchPosture, Mode, ReadinessBand, SystemHealthSnapshot,
};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// Schema version for control view serialization.
pub const CONTROL_VIEW_SCHEMA_VERSION: &str = "governance_view_v1.0";

/// Maximum number of audit entries to retain in the view.
pub const MAX_ACTION_HISTORY: usize = 50;

// =============================================================================
// Governance Control View
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernanceControlView {
    pub schema_version: String,

    /// Latest health snapshot, if any cycle has completed.
    pub health: Option<SystemHealthSnapshot>,

    /// Sentinel guards for `health`.
    pub guards: Option<HealthGuards>,

    /// The last fact fetch failed and `health` predates it.
    pub stale: bool,

    pub last_error: Option<String>,

    pub certification: Option<CertificationSummary>,

    pub band: Option<ReadinessBand>,

    pub next_milestones: Vec<String>,

    /// All switches, ordered by module.
    pub kill_switches: Vec<KillSwitch>,

    pub posture: KillSwitchPosture,

    /// Recent audit entries (bounded, newest first).
    pub recent_actions: Vec<AuditEntry>,

    pub generated_at: DateTime<Utc>,
}

impl GovernanceControlView {
    /// Capture the engine's current state.
    pub fn from_engine(engine: &GovernanceEngine) -> Self {
        let status = engine.status();
        let kill_switches = engine.registry().list();
        let posture = KillSwitchPosture::from_switches(&kill_switches);
        let band = status.summary.as_ref().map(|s| s.band());
        let next_milestones = status
            .summary
            .as_ref()
            .map(|s| s.next_milestones().iter().map(|m| m.to_string()).collect())
            .unwrap_or_default();

        Self {
            schema_version: CONTROL_VIEW_SCHEMA_VERSION.to_string(),
            health: status.snapshot,
            guards: status.guards,
            stale: status.stale,
            last_error: status.last_error,
            certification: status.summary,
            band,
            next_milestones,
            kill_switches,
            posture,
            recent_actions: engine.audit().recent(MAX_ACTION_HISTORY),
            generated_at: engine.clock().now(),
        }
    }

    pub fn mode(&self) -> Option<Mode> {
        self.health.as_ref().map(|h| h.mode)
    }

    /// Check if the safety latch condition currently holds.
    pub fn is_latched(&self) -> bool {
        self.mode().is_some_and(|m| m.requires_latch())
    }

    pub fn active_kill_switches(&self) -> impl Iterator<Item = &KillSwitch> {
        self.kill_switches.iter().filter(|s| s.is_active)
    }

    pub fn has_active_kill_switches(&self) -> bool {
        self.active_kill_switches().next().is_some()
    }

    /// Operator-facing text rendering.
    pub fn render_text(&self) -> String {
        let mut out = String::new();

        match &self.health {
            Some(h) => {
                let (label, _) = format_mode(h.mode);
                let _ = writeln!(
                    out,
                    "Health: {} dhi={:.1}% errors_1h={} interlocks={}{}",
                    label,
                    h.score_pct(),
                    h.errors_last_hour,
                    h.active_interlock_count,
                    if self.stale { " (STALE)" } else { "" }
                );
            }
            None => {
                let _ = writeln!(out, "Health: no snapshot");
            }
        }
        if let Some(g) = &self.guards {
            let _ = writeln!(
                out,
                "Guards: anomaly_sentinel={} dhi_threshold={} mode_normal={}",
                guard_label(g.anomaly_sentinel),
                guard_label(g.dhi_threshold),
                guard_label(g.mode_normal)
            );
        }

        let _ = writeln!(
            out,
            "Kill switches: {}/{} active, posture={:?}",
            self.posture.active_switches, self.posture.total_switches, self.posture.status
        );
        for switch in &self.kill_switches {
            let _ = writeln!(
                out,
                "  {:<22} {:<8} {}",
                switch.module.as_str(),
                switch.state().to_string(),
                switch.reason.as_deref().unwrap_or("-")
            );
        }

        if let Some(cert) = &self.certification {
            let _ = writeln!(
                out,
                "Certification: {}% {} ({})",
                cert.overall_progress_pct,
                cert.level,
                cert.level.status_label()
            );
            let _ = writeln!(
                out,
                "  phase1={}% phase2={}% phase3={}%",
                cert.phases.phase1.progress_pct,
                cert.phases.phase2.progress_pct,
                cert.phases.phase3.progress_pct
            );
        }
        if let Some(band) = self.band {
            let _ = writeln!(out, "Status: {}", band.description());
        }
        for milestone in &self.next_milestones {
            let _ = writeln!(out, "  next: {}", milestone);
        }

        if !self.recent_actions.is_empty() {
            let _ = writeln!(out, "Recent actions:");
            for entry in self.recent_actions.iter().take(10) {
                let _ = writeln!(
                    out,
                    "  {} {}",
                    entry.timestamp.format("%H:%M:%S"),
                    entry.message()
                );
            }
        }
        if let Some(err) = &self.last_error {
            let _ = writeln!(out, "Last error: {}", err);
        }
        out
    }
}

// =============================================================================
// Display Helpers
// =============================================================================

fn guard_label(passed: bool) -> &'static str {
    if passed { "ok" } else { "FAIL" }
}

/// Format mode for display with color hint.
pub fn format_mode(mode: Mode) -> (&'static str, &'static str) {
    match mode {
        Mode::Normal => ("NORMAL", "green"),
        Mode::Degraded => ("DEGRADED", "yellow"),
        Mode::Critical => ("CRITICAL", "red"),
        Mode::Safe => ("SAFE", "blue"),
    }
}
