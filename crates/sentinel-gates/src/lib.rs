//! # Sentinel Gates
//!
//! Health scoring, kill-switch governance and staged certification for a
//! live trading stack.
//!
//! ## Components
//! - **HealthScorer**: composite health index (DHI), operating mode and sentinel guards
//! - **KillSwitchRegistry**: per-module interlocks, last-write-wins by sequence
//! - **InterlockController**: safety latch (critical/safe ⇒ LIVE_TRADING active)
//! - **CertificationGate**: weighted phase checklists, L1..L5 levels
//! - **ActionAuditLog**: bounded ring of governance actions
//! - **GovernanceEngine**: single update path wiring the above together
//!
//! ## Usage
//! ```ignore
//! use sentinel_gates::{GovernanceEngine, GovernanceSettings, JsonFileFactProvider};
//!
//! let engine = GovernanceEngine::new(GovernanceSettings::default(), clock, actors)?;
//! let cycle = engine.refresh(&JsonFileFactProvider::new("facts.json"))?;
//! println!("{} {}", cycle.snapshot.mode, cycle.summary.level);
//! ```

pub mod audit;
pub mod certification;
pub mod engine;
pub mod facts;
pub mod health;
pub mod interlock;
pub mod kill_switch;
pub mod ports;

pub use audit::{ActionAuditLog, AuditEntry, AuditKind, AuditPayload, DEFAULT_AUDIT_CAPACITY};
pub use certification::{
    CertLevel, CertificationChecklistItem, CertificationError, CertificationGate,
    CertificationSummary, ChecklistItemSpec, ItemResult, PhaseId, PhaseStatus, PhaseStatuses,
    Predicate, ReadinessBand, default_checklist, evaluate, next_milestones, validate_checklist,
};
pub use engine::{
    EngineCycle, EngineError, EngineStatus, GovernanceEngine, GovernanceObserver,
    GovernanceSettings, SubscriptionId,
};
pub use facts::{
    Fact, FactDocument, FactError, FactProvider, FactRule, FactSet, FactUpdate, FactValue,
    JsonFileFactProvider,
};
pub use health::{
    HealthError, HealthGuards, HealthInputs, HealthPolicy, HealthScorer, HealthSignal, Mode,
    SystemHealthSnapshot, compute_health,
};
pub use interlock::{InterlockController, InterlockError};
pub use kill_switch::{
    ActorId, CRITICAL_MODULES, DEFAULT_MODULES, KillSwitch, KillSwitchError, KillSwitchPosture,
    KillSwitchRegistry, ModuleId, PostureStatus, SwitchState, ToggleOutcome, ToggleRequest,
    switch_facts,
};
pub use ports::{ActorResolver, Clock, FixedClock, StaticActorResolver, SystemClock};
