//! # Governance Engine
//!
//! Single event-driven update path tying scorer, interlocks, certification and
//! audit together.
//!
//! ## Cycle
//! 1. Score the pushed signals (interlock count read from the registry)
//! 2. Record `HealthRecomputed`
//! 3. Reconcile the safety latch
//! 4. Evaluate certification over pushed facts, sentinel guard facts and
//!    registry facts
//! 5. Record `PhaseEvaluated`
//! 6. Store the latest state and notify observers
//!
//! An invalid signal aborts the cycle before anything is stored, so the
//! previous snapshot stays current. A provider failure marks it stale.

use crate::audit::{ActionAuditLog, AuditPayload, DEFAULT_AUDIT_CAPACITY};
use crate::certification::{
    CertificationChecklistItem, CertificationError, CertificationGate, CertificationSummary,
    default_checklist,
};
use crate::facts::{FactError, FactProvider, FactUpdate};
use crate::health::{HealthError, HealthGuards, HealthPolicy, HealthScorer, SystemHealthSnapshot};
use crate::interlock::{InterlockController, InterlockError};
use crate::kill_switch::{
    DEFAULT_MODULES, KillSwitch, KillSwitchRegistry, LIVE_TRADING, ModuleId, ToggleOutcome,
};
use crate::ports::{ActorResolver, Clock};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{info, warn};

// =============================================================================
// Errors
// =============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Health(#[from] HealthError),

    #[error(transparent)]
    Interlock(#[from] InterlockError),

    #[error(transparent)]
    Facts(#[from] FactError),

    #[error(transparent)]
    Certification(#[from] CertificationError),

    #[error("Safety module {0} is not a registered module")]
    UnregisteredSafetyModule(ModuleId),
}

// =============================================================================
// Settings
// =============================================================================

/// Construction parameters.
#[derive(Debug, Clone)]
pub struct GovernanceSettings {
    pub policy: HealthPolicy,
    pub modules: Vec<ModuleId>,
    pub safety_modules: Vec<ModuleId>,
    pub audit_capacity: usize,
    pub checklist: Vec<CertificationChecklistItem>,
}

impl Default for GovernanceSettings {
    fn default() -> Self {
        Self {
            policy: HealthPolicy::default(),
            modules: DEFAULT_MODULES.iter().map(|m| ModuleId::new(*m)).collect(),
            safety_modules: vec![ModuleId::new(LIVE_TRADING)],
            audit_capacity: DEFAULT_AUDIT_CAPACITY,
            checklist: default_checklist(),
        }
    }
}

// =============================================================================
// Cycle / Status
// =============================================================================

/// Result of one completed cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineCycle {
    pub cycle: u64,
    pub snapshot: SystemHealthSnapshot,
    pub guards: HealthGuards,
    pub summary: CertificationSummary,
    /// Switches engaged by the latch during this cycle.
    pub changed_switches: Vec<KillSwitch>,
}

/// Latest known state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineStatus {
    pub snapshot: Option<SystemHealthSnapshot>,
    pub guards: Option<HealthGuards>,
    pub summary: Option<CertificationSummary>,
    /// Last fact fetch failed; `snapshot` is from an earlier cycle.
    pub stale: bool,
    pub last_error: Option<String>,
    pub cycles: u64,
}

/// Receives every completed cycle.
pub trait GovernanceObserver: Send + Sync {
    fn on_cycle(&self, cycle: &EngineCycle);
}

impl<F> GovernanceObserver for F
where
    F: Fn(&EngineCycle) + Send + Sync,
{
    fn on_cycle(&self, cycle: &EngineCycle) {
        self(cycle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

// =============================================================================
// Engine
// =============================================================================

pub struct GovernanceEngine {
    scorer: HealthScorer,
    gate: CertificationGate,
    registry: Arc<KillSwitchRegistry>,
    controller: Arc<InterlockController>,
    audit: Arc<ActionAuditLog>,
    clock: Arc<dyn Clock>,
    actors: Arc<dyn ActorResolver>,
    latest: RwLock<EngineStatus>,
    observers: Mutex<Vec<(SubscriptionId, Arc<dyn GovernanceObserver>)>>,
    next_subscription: AtomicU64,
}

impl GovernanceEngine {
    pub fn new(
        settings: GovernanceSettings,
        clock: Arc<dyn Clock>,
        actors: Arc<dyn ActorResolver>,
    ) -> Result<Self, EngineError> {
        settings.policy.validate()?;
        let gate = CertificationGate::new(settings.checklist)?;

        let registry = Arc::new(KillSwitchRegistry::new(settings.modules, clock.now()));
        if let Some(missing) = settings
            .safety_modules
            .iter()
            .find(|m| !registry.contains(m))
        {
            return Err(EngineError::UnregisteredSafetyModule(missing.clone()));
        }

        let audit = Arc::new(ActionAuditLog::new(settings.audit_capacity));
        let controller = Arc::new(InterlockController::with_safety_modules(
            Arc::clone(&registry),
            Arc::clone(&audit),
            Arc::clone(&clock),
            settings.safety_modules,
        ));

        Ok(Self {
            scorer: HealthScorer::new(settings.policy),
            gate,
            registry,
            controller,
            audit,
            clock,
            actors,
            latest: RwLock::new(EngineStatus::default()),
            observers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(0),
        })
    }

    pub fn registry(&self) -> &Arc<KillSwitchRegistry> {
        &self.registry
    }

    pub fn controller(&self) -> &Arc<InterlockController> {
        &self.controller
    }

    pub fn audit(&self) -> &Arc<ActionAuditLog> {
        &self.audit
    }

    pub fn gate(&self) -> &CertificationGate {
        &self.gate
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Run one cycle over pushed facts.
    pub fn apply_facts(&self, update: FactUpdate) -> Result<EngineCycle, EngineError> {
        let computed_at = self.clock.now();
        let active = self.registry.active_count() as u32;

        let snapshot = match self.scorer.compute(&update.health_inputs(active), computed_at) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Health cycle skipped, keeping previous snapshot");
                self.write_latest(|status| status.last_error = Some(e.to_string()));
                return Err(e.into());
            }
        };

        let guards = self.scorer.guards(&snapshot);
        self.audit.record(computed_at, AuditPayload::health(&snapshot));
        info!(
            mode = %snapshot.mode,
            dhi = snapshot.score_pct(),
            errors_1h = snapshot.errors_last_hour,
            interlocks = snapshot.active_interlock_count,
            guards_clear = guards.all_clear(),
            "Health recomputed"
        );
        self.write_latest(|status| {
            status.snapshot = Some(snapshot.clone());
            status.guards = Some(guards);
            status.stale = false;
            status.last_error = None;
        });

        let changed_switches = match self.controller.reconcile(&snapshot) {
            Ok(changed) => changed,
            Err(e) => {
                self.write_latest(|status| status.last_error = Some(e.to_string()));
                return Err(e.into());
            }
        };

        // Registry facts last so they override pushed values of the same name.
        let mut facts = update.facts;
        facts.extend(guards.facts());
        facts.extend(self.registry.facts());
        let summary = self.gate.evaluate(&facts);
        self.audit
            .record(self.clock.now(), AuditPayload::certification(&summary));
        info!(
            overall = summary.overall_progress_pct,
            level = %summary.level,
            "Certification evaluated"
        );

        let mut cycle_no = 0;
        self.write_latest(|status| {
            status.summary = Some(summary.clone());
            status.cycles += 1;
            cycle_no = status.cycles;
        });

        let cycle = EngineCycle {
            cycle: cycle_no,
            snapshot,
            guards,
            summary,
            changed_switches,
        };
        self.notify(&cycle);
        Ok(cycle)
    }

    /// Pull from a provider and run a cycle.
    pub fn refresh(&self, provider: &dyn FactProvider) -> Result<EngineCycle, EngineError> {
        match provider.fetch() {
            Ok(update) => self.apply_facts(update),
            Err(e) => {
                warn!(error = %e, "Fact fetch failed, snapshot marked stale");
                self.write_latest(|status| {
                    status.stale = true;
                    status.last_error = Some(e.to_string());
                });
                Err(e.into())
            }
        }
    }

    /// Operator toggle; actor comes from the injected resolver.
    pub fn manual_toggle(
        &self,
        module: &ModuleId,
        is_active: bool,
        reason: &str,
    ) -> Result<ToggleOutcome, EngineError> {
        let actor = self.actors.resolve();
        Ok(self.controller.toggle(module, is_active, reason, &actor)?)
    }

    pub fn subscribe<O>(&self, observer: O) -> SubscriptionId
    where
        O: GovernanceObserver + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::SeqCst) + 1);
        self.observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(observer)));
        id
    }

    /// Returns whether the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock().unwrap_or_else(|e| e.into_inner());
        let before = observers.len();
        observers.retain(|(sid, _)| *sid != id);
        observers.len() != before
    }

    pub fn status(&self) -> EngineStatus {
        self.latest.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn write_latest(&self, f: impl FnOnce(&mut EngineStatus)) {
        let mut guard = self.latest.write().unwrap_or_else(|e| e.into_inner());
        f(&mut guard);
    }

    fn notify(&self, cycle: &EngineCycle) {
        // Snapshot the list so observers may (un)subscribe from the callback.
        let observers: Vec<_> = self
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, o)| Arc::clone(o))
            .collect();
        for observer in observers {
            observer.on_cycle(cycle);
        }
    }
}

impl std::fmt::Debug for GovernanceEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GovernanceEngine")
            .field("registry", &self.registry)
            .field("controller", &self.controller)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
