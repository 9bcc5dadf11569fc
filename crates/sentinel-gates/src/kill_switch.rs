//! # Kill-Switch Registry
//!
//! Per-module safety interlocks. A kill switch that is ACTIVE tells downstream
//! execution components "do not act" for that module.
//!
//! ## Hard Laws
//! - One switch per module, created at construction (default INACTIVE), never deleted.
//! - Toggling to the current value is a re-affirmation: reason, actor and
//!   timestamp are refreshed and the toggle is still reported to the caller.
//! - Writes to the same module are ordered by a sequence number drawn at call
//!   entry. A write that arrives holding an older sequence than the one already
//!   applied is discarded (last-write-wins by sequence, not by arrival).
//! - Different modules never contend: each module has its own lock.
//!
//! Cross-module rules live in [`crate::interlock`], not here.

use crate::facts::{Fact, FactValue};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

// =============================================================================
// Well-known modules
// =============================================================================

pub const LIVE_TRADING: &str = "LIVE_TRADING";
pub const EXECUTION: &str = "EXECUTION";
pub const STRATEGY_GENERATION: &str = "STRATEGY_GENERATION";
pub const DATA_INGESTION: &str = "DATA_INGESTION";
pub const RISK_MANAGEMENT: &str = "RISK_MANAGEMENT";

/// Modules known to a default registry.
pub const DEFAULT_MODULES: [&str; 5] = [
    LIVE_TRADING,
    EXECUTION,
    STRATEGY_GENERATION,
    DATA_INGESTION,
    RISK_MANAGEMENT,
];

/// Modules whose activation counts toward a secured posture.
pub const CRITICAL_MODULES: [&str; 3] = [LIVE_TRADING, EXECUTION, STRATEGY_GENERATION];

/// Active critical switches needed for a secured posture.
pub const CRITICAL_REQUIRED_ACTIVE: usize = 2;

// =============================================================================
// Identifiers
// =============================================================================

/// Functional module identifier (open enumeration).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModuleId(String);

impl ModuleId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn live_trading() -> Self {
        Self::new(LIVE_TRADING)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_critical(&self) -> bool {
        CRITICAL_MODULES.contains(&self.0.as_str())
    }
}

impl From<&str> for ModuleId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ModuleId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ModuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of whoever initiated a toggle.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Actor used for automatic interlock activations.
    pub const SYSTEM: &'static str = "SYSTEM";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM)
    }

    pub fn is_system(&self) -> bool {
        self.0 == Self::SYSTEM
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ActorId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ActorId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for ActorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// =============================================================================
// Switch State
// =============================================================================

/// Textual switch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SwitchState {
    Active,
    Inactive,
}

impl From<bool> for SwitchState {
    fn from(active: bool) -> Self {
        if active {
            SwitchState::Active
        } else {
            SwitchState::Inactive
        }
    }
}

impl std::fmt::Display for SwitchState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SwitchState::Active => write!(f, "ACTIVE"),
            SwitchState::Inactive => write!(f, "INACTIVE"),
        }
    }
}

/// Current state of one module's interlock.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KillSwitch {
    pub module: ModuleId,
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub activated_by: Option<ActorId>,
    pub updated_at: DateTime<Utc>,
}

impl KillSwitch {
    fn inactive(module: ModuleId, created_at: DateTime<Utc>) -> Self {
        Self {
            module,
            is_active: false,
            reason: None,
            activated_by: None,
            updated_at: created_at,
        }
    }

    pub fn state(&self) -> SwitchState {
        SwitchState::from(self.is_active)
    }
}

// =============================================================================
// Toggle Request / Outcome
// =============================================================================

/// A request to set a module's switch.
#[derive(Debug, Clone, PartialEq)]
pub struct ToggleRequest {
    pub module: ModuleId,
    pub is_active: bool,
    pub reason: String,
    pub actor: ActorId,
    pub at: DateTime<Utc>,
}

/// Result of applying a [`ToggleRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToggleOutcome {
    /// State after the call.
    pub switch: KillSwitch,
    pub previously_active: bool,
    /// Sequence drawn at call entry.
    pub sequence: u64,
    /// A newer write was already applied; this one was discarded.
    pub superseded: bool,
}

impl ToggleOutcome {
    /// Whether `is_active` flipped.
    pub fn changed(&self) -> bool {
        !self.superseded && self.previously_active != self.switch.is_active
    }
}

/// Kill-switch registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KillSwitchError {
    #[error("Unknown module: {0}")]
    UnknownModule(ModuleId),

    #[error("Registry lock poisoned for module {0}")]
    Poisoned(ModuleId),
}

// =============================================================================
// Posture
// =============================================================================

/// Secured when enough critical switches are engaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostureStatus {
    Secured,
    Vulnerable,
}

/// Aggregate view over all switches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchPosture {
    pub status: PostureStatus,
    pub total_switches: usize,
    pub active_switches: usize,
    pub critical_active: usize,
    pub critical_required: usize,
}

impl KillSwitchPosture {
    pub fn from_switches(switches: &[KillSwitch]) -> Self {
        let active_switches = switches.iter().filter(|s| s.is_active).count();
        let critical_active = switches
            .iter()
            .filter(|s| s.is_active && s.module.is_critical())
            .count();
        let status = if critical_active >= CRITICAL_REQUIRED_ACTIVE {
            PostureStatus::Secured
        } else {
            PostureStatus::Vulnerable
        };
        Self {
            status,
            total_switches: switches.len(),
            active_switches,
            critical_active,
            critical_required: CRITICAL_REQUIRED_ACTIVE,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

#[derive(Debug)]
struct Slot {
    switch: KillSwitch,
    /// Sequence of the last applied write (0 = never written).
    applied_seq: u64,
}

/// Registry of per-module interlocks.
///
/// The module set is fixed at construction so lookups need no outer lock;
/// each slot has its own mutex.
#[derive(Debug)]
pub struct KillSwitchRegistry {
    slots: BTreeMap<ModuleId, Mutex<Slot>>,
    next_seq: AtomicU64,
}

impl KillSwitchRegistry {
    /// Create a registry with one inactive switch per module.
    pub fn new<I, M>(modules: I, created_at: DateTime<Utc>) -> Self
    where
        I: IntoIterator<Item = M>,
        M: Into<ModuleId>,
    {
        let slots = modules
            .into_iter()
            .map(|m| {
                let module = m.into();
                let slot = Slot {
                    switch: KillSwitch::inactive(module.clone(), created_at),
                    applied_seq: 0,
                };
                (module, Mutex::new(slot))
            })
            .collect();
        Self {
            slots,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Registry over [`DEFAULT_MODULES`].
    pub fn with_default_modules(created_at: DateTime<Utc>) -> Self {
        Self::new(DEFAULT_MODULES, created_at)
    }

    /// Check whether a module is registered.
    pub fn contains(&self, module: &ModuleId) -> bool {
        self.slots.contains_key(module)
    }

    /// Current state of one module.
    pub fn get(&self, module: &ModuleId) -> Result<KillSwitch, KillSwitchError> {
        let slot = self
            .slots
            .get(module)
            .ok_or_else(|| KillSwitchError::UnknownModule(module.clone()))?;
        let guard = slot
            .lock()
            .map_err(|_| KillSwitchError::Poisoned(module.clone()))?;
        Ok(guard.switch.clone())
    }

    /// All switches, ordered by module id.
    pub fn list(&self) -> Vec<KillSwitch> {
        self.slots
            .values()
            .map(|slot| match slot.lock() {
                Ok(guard) => guard.switch.clone(),
                Err(poisoned) => poisoned.into_inner().switch.clone(),
            })
            .collect()
    }

    /// Number of active switches.
    pub fn active_count(&self) -> usize {
        self.list().iter().filter(|s| s.is_active).count()
    }

    pub fn posture(&self) -> KillSwitchPosture {
        KillSwitchPosture::from_switches(&self.list())
    }

    /// Draw the next write sequence.
    pub(crate) fn next_sequence(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply a toggle with a sequence drawn now.
    ///
    /// Crate-private: outside callers go through the interlock controller,
    /// which records every write to the audit log.
    pub(crate) fn apply(&self, request: ToggleRequest) -> Result<ToggleOutcome, KillSwitchError> {
        if !self.contains(&request.module) {
            return Err(KillSwitchError::UnknownModule(request.module));
        }
        let sequence = self.next_sequence();
        self.apply_sequenced(request, sequence)
    }

    /// Apply a toggle carrying a sequence drawn earlier via [`Self::next_sequence`].
    pub(crate) fn apply_sequenced(
        &self,
        request: ToggleRequest,
        sequence: u64,
    ) -> Result<ToggleOutcome, KillSwitchError> {
        let slot = self
            .slots
            .get(&request.module)
            .ok_or_else(|| KillSwitchError::UnknownModule(request.module.clone()))?;
        let mut guard = slot
            .lock()
            .map_err(|_| KillSwitchError::Poisoned(request.module.clone()))?;

        let previously_active = guard.switch.is_active;
        if sequence < guard.applied_seq {
            return Ok(ToggleOutcome {
                switch: guard.switch.clone(),
                previously_active,
                sequence,
                superseded: true,
            });
        }

        guard.switch.is_active = request.is_active;
        guard.switch.reason = Some(request.reason);
        guard.switch.activated_by = Some(request.actor);
        guard.switch.updated_at = request.at;
        guard.applied_seq = sequence;

        Ok(ToggleOutcome {
            switch: guard.switch.clone(),
            previously_active,
            sequence,
            superseded: false,
        })
    }

    /// Export registry state as certification facts.
    pub fn facts(&self) -> Vec<Fact> {
        switch_facts(&self.list())
    }
}

/// Facts describing a set of switches.
///
/// - `kill_switches.total`, `kill_switches.active`, `kill_switches.critical_active` (numbers)
/// - `kill_switch.<MODULE>.active` (flag per module)
pub fn switch_facts(switches: &[KillSwitch]) -> Vec<Fact> {
    let posture = KillSwitchPosture::from_switches(switches);
    let mut facts = vec![
        Fact::new("kill_switches.total", FactValue::Number(posture.total_switches as f64)),
        Fact::new("kill_switches.active", FactValue::Number(posture.active_switches as f64)),
        Fact::new(
            "kill_switches.critical_active",
            FactValue::Number(posture.critical_active as f64),
        ),
    ];
    for switch in switches {
        facts.push(Fact::new(
            format!("kill_switch.{}.active", switch.module),
            FactValue::Bool(switch.is_active),
        ));
    }
    facts
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap()
    }

    fn registry() -> KillSwitchRegistry {
        KillSwitchRegistry::with_default_modules(t0())
    }

    fn toggle(
        reg: &KillSwitchRegistry,
        module: &ModuleId,
        is_active: bool,
        reason: &str,
        actor: &ActorId,
        at: DateTime<Utc>,
    ) -> Result<KillSwitch, KillSwitchError> {
        let request = ToggleRequest {
            module: module.clone(),
            is_active,
            reason: reason.to_string(),
            actor: actor.clone(),
            at,
        };
        reg.apply(request).map(|outcome| outcome.switch)
    }

    // -------------------------------------------------------------------------
    // Basic Access
    // -------------------------------------------------------------------------

    #[test]
    fn test_default_modules_start_inactive() {
        let reg = registry();
        let all = reg.list();
        assert_eq!(all.len(), DEFAULT_MODULES.len());
        assert!(all.iter().all(|s| !s.is_active && s.reason.is_none()));
        assert!(all.iter().all(|s| s.updated_at == t0()));
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn test_unknown_module_rejected() {
        let reg = registry();
        let ghost = ModuleId::new("GHOST");
        assert_eq!(
            reg.get(&ghost).unwrap_err(),
            KillSwitchError::UnknownModule(ghost.clone())
        );
        let err = toggle(&reg, &ghost, true, "test", &ActorId::new("op1"), t0()).unwrap_err();
        assert!(matches!(err, KillSwitchError::UnknownModule(_)));
    }

    #[test]
    fn test_toggle_sets_metadata() {
        let reg = registry();
        let at = t0() + Duration::minutes(5);
        let ks = toggle(&reg, &ModuleId::live_trading(), true, "drill", &ActorId::new("op1"), at)
            .unwrap();
        assert!(ks.is_active);
        assert_eq!(ks.state(), SwitchState::Active);
        assert_eq!(ks.reason.as_deref(), Some("drill"));
        assert_eq!(ks.activated_by, Some(ActorId::new("op1")));
        assert_eq!(ks.updated_at, at);
        assert_eq!(reg.get(&ModuleId::live_trading()).unwrap(), ks);
    }

    // -------------------------------------------------------------------------
    // Idempotence
    // -------------------------------------------------------------------------

    #[test]
    fn test_repeat_activation_is_reaffirmation() {
        let reg = registry();
        let module = ModuleId::new(EXECUTION);
        let first = reg
            .apply(ToggleRequest {
                module: module.clone(),
                is_active: true,
                reason: "first".into(),
                actor: "op1".into(),
                at: t0(),
            })
            .unwrap();
        assert!(first.changed());

        let later = t0() + Duration::seconds(30);
        let second = reg
            .apply(ToggleRequest {
                module: module.clone(),
                is_active: true,
                reason: "second".into(),
                actor: "op2".into(),
                at: later,
            })
            .unwrap();
        assert!(!second.changed());
        assert!(second.previously_active);
        assert!(second.switch.is_active);
        assert_eq!(second.switch.reason.as_deref(), Some("second"));
        assert_eq!(second.switch.activated_by, Some(ActorId::new("op2")));
        assert_eq!(second.switch.updated_at, later);
        assert!(second.sequence > first.sequence);
    }

    // -------------------------------------------------------------------------
    // Sequence Ordering
    // -------------------------------------------------------------------------

    #[test]
    fn test_stale_sequence_is_superseded() {
        let reg = registry();
        let module = ModuleId::live_trading();
        let early = reg.next_sequence();
        let late = reg.next_sequence();

        let request = |active: bool, reason: &str| ToggleRequest {
            module: module.clone(),
            is_active: active,
            reason: reason.to_string(),
            actor: ActorId::new("op"),
            at: t0(),
        };

        // The later call lands first.
        let applied = reg.apply_sequenced(request(true, "late"), late).unwrap();
        assert!(!applied.superseded);

        // The earlier call arrives afterwards and must not win.
        let stale = reg.apply_sequenced(request(false, "early"), early).unwrap();
        assert!(stale.superseded);
        assert!(!stale.changed());

        let current = reg.get(&module).unwrap();
        assert!(current.is_active);
        assert_eq!(current.reason.as_deref(), Some("late"));
    }

    #[test]
    fn test_concurrent_toggles_on_distinct_modules() {
        let reg = Arc::new(registry());
        let handles: Vec<_> = DEFAULT_MODULES
            .iter()
            .map(|m| {
                let reg = Arc::clone(&reg);
                let module = ModuleId::new(*m);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        toggle(&reg, &module, i % 2 == 0, "flap", &ActorId::new("op"), t0())
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        // Last iteration (i = 99) deactivates every module.
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn test_concurrent_toggles_same_module_keep_highest_sequence() {
        let reg = Arc::new(registry());
        let module = ModuleId::live_trading();
        let handles: Vec<_> = (0..8)
            .map(|n| {
                let reg = Arc::clone(&reg);
                let module = module.clone();
                std::thread::spawn(move || {
                    let mut max_seq = 0;
                    for _ in 0..50 {
                        let outcome = reg
                            .apply(ToggleRequest {
                                module: module.clone(),
                                is_active: n % 2 == 0,
                                reason: format!("writer-{n}"),
                                actor: ActorId::new("op"),
                                at: t0(),
                            })
                            .unwrap();
                        if !outcome.superseded {
                            max_seq = max_seq.max(outcome.sequence);
                        }
                    }
                    (max_seq, n)
                })
            })
            .collect();
        let (max_applied, winner) = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .max_by_key(|(seq, _)| *seq)
            .unwrap();
        assert_eq!(max_applied, 400);

        // The surviving state belongs to the writer that applied sequence 400.
        let final_state = reg.get(&module).unwrap();
        assert_eq!(final_state.reason, Some(format!("writer-{winner}")));
        assert_eq!(final_state.is_active, winner % 2 == 0);
    }

    // -------------------------------------------------------------------------
    // Posture & Facts
    // -------------------------------------------------------------------------

    #[test]
    fn test_posture_secured_with_two_critical() {
        let reg = registry();
        let op = ActorId::new("op1");
        toggle(&reg, &ModuleId::new(DATA_INGESTION), true, "x", &op, t0()).unwrap();
        toggle(&reg, &ModuleId::new(LIVE_TRADING), true, "x", &op, t0()).unwrap();
        assert_eq!(reg.posture().status, PostureStatus::Vulnerable);

        toggle(&reg, &ModuleId::new(EXECUTION), true, "x", &op, t0()).unwrap();
        let posture = reg.posture();
        assert_eq!(posture.status, PostureStatus::Secured);
        assert_eq!(posture.active_switches, 3);
        assert_eq!(posture.critical_active, 2);
        assert_eq!(posture.total_switches, 5);
    }

    #[test]
    fn test_registry_facts() {
        let reg = registry();
        toggle(&reg, &ModuleId::live_trading(), true, "x", &ActorId::system(), t0()).unwrap();
        let facts = reg.facts();
        let find = |name: &str| facts.iter().find(|f| f.name == name).map(|f| f.value.clone());
        assert_eq!(find("kill_switches.active"), Some(FactValue::Number(1.0)));
        assert_eq!(find("kill_switches.critical_active"), Some(FactValue::Number(1.0)));
        assert_eq!(find("kill_switch.LIVE_TRADING.active"), Some(FactValue::Bool(true)));
        assert_eq!(find("kill_switch.EXECUTION.active"), Some(FactValue::Bool(false)));
    }
}
