//! # Health Scorer
//!
//! Composite health index (DHI) and operating-mode derivation.
//!
//! ## Scoring
//! - Base score starts at `HealthPolicy::base_score` (0.5).
//! - Each signal adds `value * weight`. Absent signals contribute nothing.
//! - Any active interlock multiplies the score by `interlock_penalty` (0.7).
//! - The result is clamped to [0, 1].
//!
//! ## Mode Ladder (first match wins)
//! 1. `force_safe` → `Safe`
//! 2. active interlocks > `critical_interlock_count` (2) → `Critical`
//! 3. score < `critical_below` (0.4) → `Critical`
//! 4. score < `degraded_below` (0.6) → `Degraded`
//! 5. otherwise → `Normal`
//!
//! ## Sentinel Guards
//! [`HealthGuards`] reduces a snapshot to pass/fail checks exported as
//! `health.guards.*` facts:
//! - `anomaly_sentinel`: `errors_last_hour <= max_errors_last_hour` (5)
//! - `dhi_threshold`: `score >= min_guard_score` (0.7)
//! - `mode_normal`: mode is `Normal`
//!
//! Scoring is pure. Recording the snapshot is the caller's job.

use crate::facts::{Fact, FactValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tolerance applied to the weight budget check.
const WEIGHT_EPSILON: f64 = 1e-9;

// =============================================================================
// Mode
// =============================================================================

/// Discrete operating mode derived from the health score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Normal,
    Degraded,
    Critical,
    /// Only reachable through the external `force_safe` signal.
    Safe,
}

impl Mode {
    /// Modes that require the safety latch to be engaged.
    pub fn requires_latch(&self) -> bool {
        matches!(self, Mode::Critical | Mode::Safe)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Degraded => "degraded",
            Mode::Critical => "critical",
            Mode::Safe => "safe",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = HealthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(Mode::Normal),
            "degraded" => Ok(Mode::Degraded),
            "critical" => Ok(Mode::Critical),
            "safe" => Ok(Mode::Safe),
            other => Err(HealthError::UnknownMode(other.to_string())),
        }
    }
}

// =============================================================================
// Signals & Snapshot
// =============================================================================

/// One weighted scoring input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthSignal {
    pub name: String,
    /// Normalized value in [0, 1].
    pub value: f64,
    /// Non-negative contribution weight.
    pub weight: f64,
}

impl HealthSignal {
    pub fn new(name: impl Into<String>, value: f64, weight: f64) -> Self {
        Self {
            name: name.into(),
            value,
            weight,
        }
    }

    fn validate(&self) -> Result<(), HealthError> {
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(HealthError::InvalidSignal {
                name: self.name.clone(),
                reason: format!("weight {} must be finite and >= 0", self.weight),
            });
        }
        if !self.value.is_finite() || !(0.0..=1.0).contains(&self.value) {
            return Err(HealthError::InvalidSignal {
                name: self.name.clone(),
                reason: format!("value {} outside [0, 1]", self.value),
            });
        }
        Ok(())
    }
}

/// Inputs for one scoring call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthInputs {
    pub signals: Vec<HealthSignal>,
    pub errors_last_hour: u32,
    pub active_interlock_count: u32,
    /// Upstream sentinel emergency declaration.
    #[serde(default)]
    pub force_safe: bool,
}

/// Immutable result of a health recomputation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemHealthSnapshot {
    pub score: f64,
    pub mode: Mode,
    pub errors_last_hour: u32,
    pub active_interlock_count: u32,
    pub computed_at: DateTime<Utc>,
}

impl SystemHealthSnapshot {
    /// Score as a percentage with one decimal, for operator display.
    pub fn score_pct(&self) -> f64 {
        (self.score * 1000.0).round() / 10.0
    }
}

// =============================================================================
// Policy
// =============================================================================

/// Scoring constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthPolicy {
    #[serde(default = "default_base_score")]
    pub base_score: f64,
    #[serde(default = "default_interlock_penalty")]
    pub interlock_penalty: f64,
    #[serde(default = "default_critical_below")]
    pub critical_below: f64,
    #[serde(default = "default_degraded_below")]
    pub degraded_below: f64,
    /// More active interlocks than this forces `Critical`.
    #[serde(default = "default_critical_interlock_count")]
    pub critical_interlock_count: u32,
    /// More errors in the last hour than this trips the anomaly guard.
    #[serde(default = "default_max_errors_last_hour")]
    pub max_errors_last_hour: u32,
    #[serde(default = "default_min_guard_score")]
    pub min_guard_score: f64,
}

fn default_base_score() -> f64 {
    0.5
}

fn default_interlock_penalty() -> f64 {
    0.7
}

fn default_critical_below() -> f64 {
    0.4
}

fn default_degraded_below() -> f64 {
    0.6
}

fn default_critical_interlock_count() -> u32 {
    2
}

fn default_max_errors_last_hour() -> u32 {
    5
}

fn default_min_guard_score() -> f64 {
    0.7
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            base_score: default_base_score(),
            interlock_penalty: default_interlock_penalty(),
            critical_below: default_critical_below(),
            degraded_below: default_degraded_below(),
            critical_interlock_count: default_critical_interlock_count(),
            max_errors_last_hour: default_max_errors_last_hour(),
            min_guard_score: default_min_guard_score(),
        }
    }
}

impl HealthPolicy {
    /// Reject policies whose thresholds cannot produce a coherent ladder.
    pub fn validate(&self) -> Result<(), HealthError> {
        let unit = 0.0..=1.0;
        if !unit.contains(&self.base_score)
            || !unit.contains(&self.interlock_penalty)
            || !unit.contains(&self.critical_below)
            || !unit.contains(&self.degraded_below)
            || !unit.contains(&self.min_guard_score)
        {
            return Err(HealthError::InvalidPolicy(
                "score constants must lie in [0, 1]".to_string(),
            ));
        }
        if self.critical_below > self.degraded_below {
            return Err(HealthError::InvalidPolicy(format!(
                "critical_below {} exceeds degraded_below {}",
                self.critical_below, self.degraded_below
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Sentinel Guards
// =============================================================================

/// Pass/fail guards derived from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthGuards {
    pub anomaly_sentinel: bool,
    pub dhi_threshold: bool,
    pub mode_normal: bool,
}

impl HealthGuards {
    /// Guards under the default thresholds.
    pub fn from_snapshot(snapshot: &SystemHealthSnapshot) -> Self {
        Self::evaluate(snapshot, &HealthPolicy::default())
    }

    pub fn evaluate(snapshot: &SystemHealthSnapshot, policy: &HealthPolicy) -> Self {
        Self {
            anomaly_sentinel: snapshot.errors_last_hour <= policy.max_errors_last_hour,
            dhi_threshold: snapshot.score >= policy.min_guard_score,
            mode_normal: snapshot.mode == Mode::Normal,
        }
    }

    pub fn all_clear(&self) -> bool {
        self.anomaly_sentinel && self.dhi_threshold && self.mode_normal
    }

    /// `health.guards.<name>` flags plus `health.guards.all_clear`.
    pub fn facts(&self) -> Vec<Fact> {
        [
            ("health.guards.anomaly_sentinel", self.anomaly_sentinel),
            ("health.guards.dhi_threshold", self.dhi_threshold),
            ("health.guards.mode_normal", self.mode_normal),
            ("health.guards.all_clear", self.all_clear()),
        ]
        .into_iter()
        .map(|(name, passed)| Fact::new(name, FactValue::Bool(passed)))
        .collect()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health scoring error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HealthError {
    #[error("Invalid signal '{name}': {reason}")]
    InvalidSignal { name: String, reason: String },

    #[error("Signal weights sum to {total}, exceeding 1.0")]
    WeightBudgetExceeded { total: f64 },

    #[error("Invalid health policy: {0}")]
    InvalidPolicy(String),

    #[error("Unknown mode: {0}")]
    UnknownMode(String),
}

impl HealthError {
    /// Whether the error stems from malformed signal input.
    pub fn is_invalid_signal(&self) -> bool {
        matches!(
            self,
            HealthError::InvalidSignal { .. } | HealthError::WeightBudgetExceeded { .. }
        )
    }
}

// =============================================================================
// Scorer
// =============================================================================

/// Stateless scorer parameterized by a [`HealthPolicy`].
#[derive(Debug, Clone, Default)]
pub struct HealthScorer {
    policy: HealthPolicy,
}

impl HealthScorer {
    pub fn new(policy: HealthPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &HealthPolicy {
        &self.policy
    }

    /// Raw score before the clamp. Exposed for bound checks.
    pub fn raw_score(
        &self,
        signals: &[HealthSignal],
        active_interlock_count: u32,
    ) -> Result<f64, HealthError> {
        let mut total_weight = 0.0;
        for signal in signals {
            signal.validate()?;
            total_weight += signal.weight;
        }
        if total_weight > 1.0 + WEIGHT_EPSILON {
            return Err(HealthError::WeightBudgetExceeded {
                total: total_weight,
            });
        }

        let mut score = self.policy.base_score;
        for signal in signals {
            score += signal.value * signal.weight;
        }
        if active_interlock_count > 0 {
            score *= self.policy.interlock_penalty;
        }
        Ok(score)
    }

    /// Derive the mode for an already clamped score.
    pub fn mode_for(&self, score: f64, active_interlock_count: u32, force_safe: bool) -> Mode {
        if force_safe {
            Mode::Safe
        } else if active_interlock_count > self.policy.critical_interlock_count {
            Mode::Critical
        } else if score < self.policy.critical_below {
            Mode::Critical
        } else if score < self.policy.degraded_below {
            Mode::Degraded
        } else {
            Mode::Normal
        }
    }

    /// Sentinel guards for a snapshot under this scorer's thresholds.
    pub fn guards(&self, snapshot: &SystemHealthSnapshot) -> HealthGuards {
        HealthGuards::evaluate(snapshot, &self.policy)
    }

    /// Compute a new snapshot.
    pub fn compute(
        &self,
        inputs: &HealthInputs,
        computed_at: DateTime<Utc>,
    ) -> Result<SystemHealthSnapshot, HealthError> {
        let raw = self.raw_score(&inputs.signals, inputs.active_interlock_count)?;
        let score = raw.clamp(0.0, 1.0);
        let mode = self.mode_for(score, inputs.active_interlock_count, inputs.force_safe);

        Ok(SystemHealthSnapshot {
            score,
            mode,
            errors_last_hour: inputs.errors_last_hour,
            active_interlock_count: inputs.active_interlock_count,
            computed_at,
        })
    }
}

/// Score with the default policy.
pub fn compute_health(
    signals: &[HealthSignal],
    errors_last_hour: u32,
    active_interlock_count: u32,
    force_safe: bool,
    computed_at: DateTime<Utc>,
) -> Result<SystemHealthSnapshot, HealthError> {
    let inputs = HealthInputs {
        signals: signals.to_vec(),
        errors_last_hour,
        active_interlock_count,
        force_safe,
    };
    HealthScorer::default().compute(&inputs, computed_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn reference_signals() -> Vec<HealthSignal> {
        vec![
            HealthSignal::new("regime", 0.8, 0.3),
            HealthSignal::new("strategy", 0.6, 0.3),
        ]
    }

    // -------------------------------------------------------------------------
    // Scoring
    // -------------------------------------------------------------------------

    #[test]
    fn test_reference_example_normal() {
        let snap = compute_health(&reference_signals(), 0, 0, false, ts()).unwrap();
        assert!((snap.score - 0.92).abs() < 1e-9);
        assert_eq!(snap.mode, Mode::Normal);
        assert_eq!(snap.computed_at, ts());
    }

    #[test]
    fn test_single_interlock_penalty() {
        let snap = compute_health(&reference_signals(), 0, 1, false, ts()).unwrap();
        assert!((snap.score - 0.644).abs() < 1e-9);
        assert_eq!(snap.mode, Mode::Normal);
    }

    #[test]
    fn test_no_signals_uses_base_score() {
        let snap = compute_health(&[], 3, 0, false, ts()).unwrap();
        assert!((snap.score - 0.5).abs() < 1e-12);
        assert_eq!(snap.mode, Mode::Degraded);
        assert_eq!(snap.errors_last_hour, 3);
    }

    #[test]
    fn test_full_weight_bounds() {
        let scorer = HealthScorer::default();
        for value in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let signals = vec![
                HealthSignal::new("a", value, 0.5),
                HealthSignal::new("b", 1.0 - value, 0.25),
                HealthSignal::new("c", value, 0.25),
            ];
            let raw = scorer.raw_score(&signals, 0).unwrap();
            assert!((0.5..=1.5).contains(&raw), "raw {raw}");

            let inputs = HealthInputs {
                signals,
                ..Default::default()
            };
            let snap = scorer.compute(&inputs, ts()).unwrap();
            assert!((0.0..=1.0).contains(&snap.score));
        }
    }

    #[test]
    fn test_score_clamped_to_one() {
        let signals = vec![HealthSignal::new("all", 1.0, 1.0)];
        let snap = compute_health(&signals, 0, 0, false, ts()).unwrap();
        assert_eq!(snap.score, 1.0);
    }

    // -------------------------------------------------------------------------
    // Mode Ladder
    // -------------------------------------------------------------------------

    #[test]
    fn test_many_interlocks_force_critical() {
        let signals = vec![HealthSignal::new("all", 1.0, 1.0)];
        let snap = compute_health(&signals, 0, 3, false, ts()).unwrap();
        // 1.5 * 0.7 clamps to 1.0; the interlock count alone decides.
        assert_eq!(snap.score, 1.0);
        assert_eq!(snap.mode, Mode::Critical);
    }

    #[test]
    fn test_low_score_is_critical() {
        // 0.5 * 0.7 = 0.35 < 0.4
        let snap = compute_health(&[], 0, 1, false, ts()).unwrap();
        assert!((snap.score - 0.35).abs() < 1e-9);
        assert_eq!(snap.mode, Mode::Critical);
    }

    #[test]
    fn test_force_safe_overrides_everything() {
        let signals = vec![HealthSignal::new("all", 1.0, 1.0)];
        let snap = compute_health(&signals, 0, 0, true, ts()).unwrap();
        assert_eq!(snap.mode, Mode::Safe);

        let snap = compute_health(&[], 0, 5, true, ts()).unwrap();
        assert_eq!(snap.mode, Mode::Safe);
    }

    #[test]
    fn test_mode_strings_round_trip() {
        for mode in [Mode::Normal, Mode::Degraded, Mode::Critical, Mode::Safe] {
            assert_eq!(mode.to_string().parse::<Mode>().unwrap(), mode);
        }
        assert!("frozen".parse::<Mode>().is_err());
        assert_eq!(serde_json::to_string(&Mode::Safe).unwrap(), "\"safe\"");
    }

    // -------------------------------------------------------------------------
    // Validation
    // -------------------------------------------------------------------------

    #[test]
    fn test_negative_weight_rejected() {
        let signals = vec![HealthSignal::new("bad", 0.5, -0.1)];
        let err = compute_health(&signals, 0, 0, false, ts()).unwrap_err();
        assert!(matches!(err, HealthError::InvalidSignal { ref name, .. } if name == "bad"));
        assert!(err.is_invalid_signal());
    }

    #[test]
    fn test_value_out_of_range_rejected() {
        for value in [-0.01, 1.01, f64::NAN] {
            let signals = vec![HealthSignal::new("bad", value, 0.1)];
            assert!(compute_health(&signals, 0, 0, false, ts()).is_err());
        }
    }

    #[test]
    fn test_weight_budget_exceeded() {
        let signals = vec![
            HealthSignal::new("a", 0.5, 0.6),
            HealthSignal::new("b", 0.5, 0.6),
        ];
        let err = compute_health(&signals, 0, 0, false, ts()).unwrap_err();
        assert!(matches!(err, HealthError::WeightBudgetExceeded { .. }));
    }

    #[test]
    fn test_policy_validation() {
        assert!(HealthPolicy::default().validate().is_ok());
        let bad = HealthPolicy {
            critical_below: 0.7,
            degraded_below: 0.6,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(HealthError::InvalidPolicy(_))));
    }

    // -------------------------------------------------------------------------
    // Sentinel Guards
    // -------------------------------------------------------------------------

    fn guarded(score: f64, errors_last_hour: u32, mode: Mode) -> SystemHealthSnapshot {
        SystemHealthSnapshot {
            score,
            mode,
            errors_last_hour,
            active_interlock_count: 0,
            computed_at: ts(),
        }
    }

    #[test]
    fn test_anomaly_guard_error_boundary() {
        let at_limit = HealthGuards::from_snapshot(&guarded(0.9, 5, Mode::Normal));
        assert!(at_limit.anomaly_sentinel);
        assert!(at_limit.all_clear());

        let over = HealthGuards::from_snapshot(&guarded(0.9, 6, Mode::Normal));
        assert!(!over.anomaly_sentinel);
        assert!(over.dhi_threshold);
        assert!(!over.all_clear());
    }

    #[test]
    fn test_dhi_guard_score_boundary() {
        assert!(HealthGuards::from_snapshot(&guarded(0.7, 0, Mode::Normal)).dhi_threshold);
        assert!(!HealthGuards::from_snapshot(&guarded(0.69, 0, Mode::Normal)).dhi_threshold);
    }

    #[test]
    fn test_mode_guard_and_facts() {
        let guards = HealthGuards::from_snapshot(&guarded(0.65, 0, Mode::Degraded));
        assert!(guards.anomaly_sentinel);
        assert!(!guards.dhi_threshold);
        assert!(!guards.mode_normal);

        let facts = guards.facts();
        let find = |name: &str| facts.iter().find(|f| f.name == name).map(|f| f.value.clone());
        assert_eq!(find("health.guards.anomaly_sentinel"), Some(FactValue::Bool(true)));
        assert_eq!(find("health.guards.dhi_threshold"), Some(FactValue::Bool(false)));
        assert_eq!(find("health.guards.mode_normal"), Some(FactValue::Bool(false)));
        assert_eq!(find("health.guards.all_clear"), Some(FactValue::Bool(false)));
    }

    #[test]
    fn test_guard_thresholds_follow_policy() {
        let scorer = HealthScorer::new(HealthPolicy {
            max_errors_last_hour: 10,
            min_guard_score: 0.5,
            ..Default::default()
        });
        let guards = scorer.guards(&guarded(0.55, 8, Mode::Normal));
        assert!(guards.all_clear());

        let bad = HealthPolicy {
            min_guard_score: 1.5,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(HealthError::InvalidPolicy(_))));
    }
}
