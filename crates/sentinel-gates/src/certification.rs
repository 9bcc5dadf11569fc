//! # Certification Gate
//!
//! Weighted, checklist-driven readiness evaluation for the staged production
//! rollout.
//!
//! ## Phases
//! - **phase1** Controlled freeze (shadow mode): 30% of overall progress
//! - **phase2** Certification & canary go-live: 50%
//! - **phase3** Ongoing roadmap: 20%
//!
//! ## Arithmetic
//! - `progress_pct = round(100 * completed_weight / total_weight)` per phase
//!   (a phase with no weight reports 0)
//! - `overall = round((30*p1 + 50*p2 + 20*p3) / 100)` in integer arithmetic
//! - Level ladder: `>=100 L5, >=90 L4, >=80 L3, >=70 L2, else L1`
//!
//! Evaluation is a pure function of `(facts, checklist)`: the same pair always
//! yields an identical [`CertificationSummary`].

use crate::facts::{Fact, FactRule, FactSet};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

// =============================================================================
// Phase
// =============================================================================

/// Rollout phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhaseId {
    Phase1,
    Phase2,
    Phase3,
}

impl PhaseId {
    pub const ALL: [PhaseId; 3] = [PhaseId::Phase1, PhaseId::Phase2, PhaseId::Phase3];

    /// Share of overall progress, in percent.
    pub fn overall_weight_pct(&self) -> u32 {
        match self {
            PhaseId::Phase1 => 30,
            PhaseId::Phase2 => 50,
            PhaseId::Phase3 => 20,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            PhaseId::Phase1 => "Controlled Freeze (Shadow Mode)",
            PhaseId::Phase2 => "Certification & Progressive Go-Live",
            PhaseId::Phase3 => "Ongoing Autonomy Roadmap",
        }
    }
}

impl std::fmt::Display for PhaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PhaseId::Phase1 => write!(f, "phase1"),
            PhaseId::Phase2 => write!(f, "phase2"),
            PhaseId::Phase3 => write!(f, "phase3"),
        }
    }
}

// =============================================================================
// Level
// =============================================================================

/// Discrete certification level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CertLevel {
    L1,
    L2,
    L3,
    L4,
    L5,
}

impl CertLevel {
    pub fn from_progress(overall_pct: u32) -> Self {
        if overall_pct >= 100 {
            CertLevel::L5
        } else if overall_pct >= 90 {
            CertLevel::L4
        } else if overall_pct >= 80 {
            CertLevel::L3
        } else if overall_pct >= 70 {
            CertLevel::L2
        } else {
            CertLevel::L1
        }
    }

    pub fn status_label(&self) -> &'static str {
        match self {
            CertLevel::L5 => "Production Certified",
            CertLevel::L4 => "Pre-Production",
            CertLevel::L3 => "Staging Ready",
            CertLevel::L2 => "Development Advanced",
            CertLevel::L1 => "Development Core",
        }
    }
}

impl std::fmt::Display for CertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CertLevel::L1 => "L1",
            CertLevel::L2 => "L2",
            CertLevel::L3 => "L3",
            CertLevel::L4 => "L4",
            CertLevel::L5 => "L5",
        };
        f.write_str(s)
    }
}

/// Display band over overall progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadinessBand {
    ProductionCertified,
    AdvancedPreProduction,
    SecuredPreProduction,
    AdvancedDevelopment,
}

impl ReadinessBand {
    pub fn from_progress(overall_pct: u32) -> Self {
        if overall_pct >= 100 {
            ReadinessBand::ProductionCertified
        } else if overall_pct >= 95 {
            ReadinessBand::AdvancedPreProduction
        } else if overall_pct >= 87 {
            ReadinessBand::SecuredPreProduction
        } else {
            ReadinessBand::AdvancedDevelopment
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ReadinessBand::ProductionCertified => "Production ready, fully certified",
            ReadinessBand::AdvancedPreProduction => "Final validation before full certification",
            ReadinessBand::SecuredPreProduction => "Shadow mode, controlled freeze in progress",
            ReadinessBand::AdvancedDevelopment => "Preparing certification",
        }
    }
}

/// Next milestones for an overall progress value.
pub fn next_milestones(overall_pct: u32) -> &'static [&'static str] {
    if overall_pct >= 95 {
        &[
            "Final certification to 100%",
            "Go-live validation",
            "Production deployment",
        ]
    } else if overall_pct >= 85 {
        &[
            "Complete phase2 certification",
            "Canary deployment validation",
            "Security audit finalization",
        ]
    } else {
        &[
            "Activate critical kill switches",
            "Deploy shadow monitoring",
            "Complete infrastructure freeze",
        ]
    }
}

// =============================================================================
// Checklist
// =============================================================================

/// Pure predicate over facts.
#[derive(Clone)]
pub enum Predicate {
    Rule(FactRule),
    Custom(Arc<dyn Fn(&FactSet) -> bool + Send + Sync>),
}

impl Predicate {
    pub fn holds(&self, facts: &FactSet) -> bool {
        match self {
            Predicate::Rule(rule) => rule.evaluate(facts),
            Predicate::Custom(f) => f(facts),
        }
    }
}

impl std::fmt::Debug for Predicate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Predicate::Rule(rule) => f.debug_tuple("Rule").field(rule).finish(),
            Predicate::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One weighted checklist item.
#[derive(Debug, Clone)]
pub struct CertificationChecklistItem {
    pub id: String,
    pub phase: PhaseId,
    pub predicate: Predicate,
    pub weight: f64,
}

impl CertificationChecklistItem {
    pub fn rule(id: &str, phase: PhaseId, weight: f64, rule: FactRule) -> Self {
        Self {
            id: id.to_string(),
            phase,
            predicate: Predicate::Rule(rule),
            weight,
        }
    }

    pub fn custom<F>(id: &str, phase: PhaseId, weight: f64, f: F) -> Self
    where
        F: Fn(&FactSet) -> bool + Send + Sync + 'static,
    {
        Self {
            id: id.to_string(),
            phase,
            predicate: Predicate::Custom(Arc::new(f)),
            weight,
        }
    }
}

/// Serializable checklist item (configuration form).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChecklistItemSpec {
    pub id: String,
    pub phase: PhaseId,
    #[serde(default = "default_item_weight")]
    pub weight: f64,
    pub rule: FactRule,
}

fn default_item_weight() -> f64 {
    1.0
}

impl From<ChecklistItemSpec> for CertificationChecklistItem {
    fn from(spec: ChecklistItemSpec) -> Self {
        CertificationChecklistItem {
            id: spec.id,
            phase: spec.phase,
            predicate: Predicate::Rule(spec.rule),
            weight: spec.weight,
        }
    }
}

/// Checklist configuration error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CertificationError {
    #[error("Duplicate checklist item id: {0}")]
    DuplicateItem(String),

    #[error("Checklist item '{id}' has invalid weight {weight}")]
    InvalidWeight { id: String, weight: f64 },
}

/// Reject duplicate ids and negative or non-finite weights.
pub fn validate_checklist(
    checklist: &[CertificationChecklistItem],
) -> Result<(), CertificationError> {
    let mut seen = BTreeSet::new();
    for item in checklist {
        if !seen.insert(item.id.as_str()) {
            return Err(CertificationError::DuplicateItem(item.id.clone()));
        }
        if !item.weight.is_finite() || item.weight < 0.0 {
            return Err(CertificationError::InvalidWeight {
                id: item.id.clone(),
                weight: item.weight,
            });
        }
    }
    Ok(())
}

/// Rollout checklist used when no override is configured.
///
/// Fact names consumed:
/// - phase1: `kill_switches.critical_active`, `shadow_monitoring.active`,
///   `pipelines.frozen`, `api_keys.rotated_last_24h`
/// - phase2: `k6.*`, `security_audit.*`, `control_room.*`, `docs.*`,
///   `paper_trading.*`, `canary.*`
/// - phase3: `meta_governance.metrics`, `federated.communicating_agents`,
///   `ai_regulation.voted_decisions`, `causal.active_graphs`
pub fn default_checklist() -> Vec<CertificationChecklistItem> {
    use FactRule as R;
    use PhaseId::*;

    vec![
        // Freeze
        CertificationChecklistItem::rule(
            "critical_kill_switches",
            Phase1,
            1.0,
            R::at_least("kill_switches.critical_active", 2.0),
        ),
        CertificationChecklistItem::rule(
            "shadow_monitoring",
            Phase1,
            1.0,
            R::flag("shadow_monitoring.active"),
        ),
        CertificationChecklistItem::rule(
            "infrastructure_frozen",
            Phase1,
            1.0,
            R::at_least("pipelines.frozen", 1.0),
        ),
        CertificationChecklistItem::rule(
            "api_keys_rotated",
            Phase1,
            1.0,
            R::at_least("api_keys.rotated_last_24h", 3.0),
        ),
        // Certification & canary
        CertificationChecklistItem::rule(
            "load_test",
            Phase2,
            1.0,
            R::All(vec![
                R::at_least("k6.req_per_min", 10_000.0),
                R::at_least("k6.duration_minutes", 30.0),
                R::below("k6.p99_latency_ms", 1_500.0),
            ]),
        ),
        CertificationChecklistItem::rule(
            "security_audit",
            Phase2,
            1.0,
            R::All(vec![
                R::equals("security_audit.auth_status", 401.0),
                R::equals("security_audit.killswitch_status", 503.0),
                R::flag("security_audit.alerting"),
            ]),
        ),
        CertificationChecklistItem::rule(
            "control_room",
            Phase2,
            1.0,
            R::All(vec![
                R::flag("control_room.grafana"),
                R::flag("control_room.prometheus"),
                R::flag("control_room.alerts"),
            ]),
        ),
        CertificationChecklistItem::rule(
            "operations_manual",
            Phase2,
            1.0,
            R::All(vec![
                R::flag("docs.operations_manual"),
                R::flag("docs.architecture_diagram"),
                R::flag("docs.killswitch_procedures"),
            ]),
        ),
        CertificationChecklistItem::rule(
            "paper_trading_48h",
            Phase2,
            1.0,
            R::All(vec![
                R::at_least("paper_trading.duration_hours", 48.0),
                R::flag("paper_trading.pnl_coherent"),
                R::equals("paper_trading.mode", "NORMAL"),
            ]),
        ),
        CertificationChecklistItem::rule(
            "canary_live_strategy",
            Phase2,
            1.0,
            R::All(vec![
                R::at_most("canary.portfolio_pct", 0.1),
                R::at_least("canary.duration_hours", 24.0),
                R::at_most("canary.pnl_diff_pct", 5.0),
                R::equals("canary.system_health", "NORMAL"),
            ]),
        ),
        // Ongoing
        CertificationChecklistItem::rule(
            "meta_governance",
            Phase3,
            1.0,
            R::at_least("meta_governance.metrics", 5.0),
        ),
        CertificationChecklistItem::rule(
            "federated_learning",
            Phase3,
            1.0,
            R::at_least("federated.communicating_agents", 20.0),
        ),
        CertificationChecklistItem::rule(
            "ai_regulation",
            Phase3,
            1.0,
            R::at_least("ai_regulation.voted_decisions", 10.0),
        ),
        CertificationChecklistItem::rule(
            "causal_reasoning",
            Phase3,
            1.0,
            R::at_least("causal.active_graphs", 5.0),
        ),
    ]
}

// =============================================================================
// Results
// =============================================================================

/// Outcome of one checklist item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResult {
    pub id: String,
    pub satisfied: bool,
}

/// Progress of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub phase: PhaseId,
    pub completed_weight: f64,
    pub total_weight: f64,
    pub progress_pct: u32,
    pub item_results: Vec<ItemResult>,
}

impl PhaseStatus {
    pub fn is_complete(&self) -> bool {
        self.progress_pct >= 100
    }

    pub fn satisfied_count(&self) -> usize {
        self.item_results.iter().filter(|r| r.satisfied).count()
    }
}

/// Per-phase statuses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatuses {
    pub phase1: PhaseStatus,
    pub phase2: PhaseStatus,
    pub phase3: PhaseStatus,
}

impl PhaseStatuses {
    pub fn get(&self, phase: PhaseId) -> &PhaseStatus {
        match phase {
            PhaseId::Phase1 => &self.phase1,
            PhaseId::Phase2 => &self.phase2,
            PhaseId::Phase3 => &self.phase3,
        }
    }
}

/// Result of a certification evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CertificationSummary {
    pub overall_progress_pct: u32,
    pub level: CertLevel,
    pub phases: PhaseStatuses,
}

impl CertificationSummary {
    pub fn band(&self) -> ReadinessBand {
        ReadinessBand::from_progress(self.overall_progress_pct)
    }

    pub fn next_milestones(&self) -> &'static [&'static str] {
        next_milestones(self.overall_progress_pct)
    }
}

// =============================================================================
// Evaluation
// =============================================================================

fn phase_status(
    phase: PhaseId,
    facts: &FactSet,
    checklist: &[CertificationChecklistItem],
) -> PhaseStatus {
    let mut completed_weight = 0.0;
    let mut total_weight = 0.0;
    let mut item_results = Vec::new();

    for item in checklist.iter().filter(|i| i.phase == phase) {
        let satisfied = item.predicate.holds(facts);
        total_weight += item.weight;
        if satisfied {
            completed_weight += item.weight;
        }
        item_results.push(ItemResult {
            id: item.id.clone(),
            satisfied,
        });
    }

    let progress_pct = if total_weight > 0.0 {
        (100.0 * completed_weight / total_weight).round().clamp(0.0, 100.0) as u32
    } else {
        0
    };

    PhaseStatus {
        phase,
        completed_weight,
        total_weight,
        progress_pct,
        item_results,
    }
}

/// Weighted overall progress, rounded half up.
pub fn overall_progress(phase1_pct: u32, phase2_pct: u32, phase3_pct: u32) -> u32 {
    let weighted = PhaseId::Phase1.overall_weight_pct() * phase1_pct
        + PhaseId::Phase2.overall_weight_pct() * phase2_pct
        + PhaseId::Phase3.overall_weight_pct() * phase3_pct;
    (weighted + 50) / 100
}

/// Evaluate a checklist against facts.
pub fn evaluate(facts: &[Fact], checklist: &[CertificationChecklistItem]) -> CertificationSummary {
    let set = FactSet::from_facts(facts);
    let phases = PhaseStatuses {
        phase1: phase_status(PhaseId::Phase1, &set, checklist),
        phase2: phase_status(PhaseId::Phase2, &set, checklist),
        phase3: phase_status(PhaseId::Phase3, &set, checklist),
    };
    let overall_progress_pct = overall_progress(
        phases.phase1.progress_pct,
        phases.phase2.progress_pct,
        phases.phase3.progress_pct,
    );

    CertificationSummary {
        overall_progress_pct,
        level: CertLevel::from_progress(overall_progress_pct),
        phases,
    }
}

/// Gate bound to a fixed checklist.
#[derive(Debug, Clone)]
pub struct CertificationGate {
    checklist: Vec<CertificationChecklistItem>,
}

impl CertificationGate {
    pub fn new(checklist: Vec<CertificationChecklistItem>) -> Result<Self, CertificationError> {
        validate_checklist(&checklist)?;
        Ok(Self { checklist })
    }

    pub fn checklist(&self) -> &[CertificationChecklistItem] {
        &self.checklist
    }

    pub fn evaluate(&self, facts: &[Fact]) -> CertificationSummary {
        let summary = evaluate(facts, &self.checklist);
        debug!(
            overall = summary.overall_progress_pct,
            level = %summary.level,
            phase1 = summary.phases.phase1.progress_pct,
            phase2 = summary.phases.phase2.progress_pct,
            phase3 = summary.phases.phase3.progress_pct,
            "Certification evaluated"
        );
        summary
    }
}

impl Default for CertificationGate {
    fn default() -> Self {
        Self {
            checklist: default_checklist(),
        }
    }
}
