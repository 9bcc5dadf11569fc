//! # Interlock Controller
//!
//! Enforces the safety latch between health mode and kill switches.
//!
//! ## Hard Laws
//! 1. After `reconcile` with mode `critical` or `safe`, every safety module
//!    (default `LIVE_TRADING`) is active.
//! 2. Reconcile never deactivates anything. Only an operator can release the
//!    latch.
//! 3. Manual deactivation of a safety module while the last reconciled mode
//!    requires the latch is allowed, and audited with
//!    `overrides_safety_invariant = true`.
//! 4. A registry failure during reconcile is audited as `ReconcileFailed` and
//!    returned. No inline retry. An unregistered safety module fails the
//!    reconcile before any switch is touched.

use crate::audit::{ActionAuditLog, AuditPayload};
use crate::health::{Mode, SystemHealthSnapshot};
use crate::kill_switch::{
    ActorId, KillSwitch, KillSwitchError, KillSwitchRegistry, LIVE_TRADING, ModuleId,
    ToggleOutcome, ToggleRequest,
};
use crate::ports::Clock;
use std::sync::{Arc, RwLock};
use tracing::{info, warn};

/// Interlock error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InterlockError {
    #[error(transparent)]
    Registry(#[from] KillSwitchError),

    #[error("Reconcile failed for {module} (mode={mode}): {source}")]
    ReconcileFailed {
        module: ModuleId,
        mode: Mode,
        source: KillSwitchError,
    },
}

impl InterlockError {
    pub fn is_unknown_module(&self) -> bool {
        matches!(
            self,
            InterlockError::Registry(KillSwitchError::UnknownModule(_))
                | InterlockError::ReconcileFailed {
                    source: KillSwitchError::UnknownModule(_),
                    ..
                }
        )
    }
}

/// Drives automatic and manual toggles through the registry.
pub struct InterlockController {
    registry: Arc<KillSwitchRegistry>,
    audit: Arc<ActionAuditLog>,
    clock: Arc<dyn Clock>,
    safety_modules: Vec<ModuleId>,
    last_mode: RwLock<Option<Mode>>,
}

impl InterlockController {
    /// Controller latching `LIVE_TRADING` only.
    pub fn new(
        registry: Arc<KillSwitchRegistry>,
        audit: Arc<ActionAuditLog>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::with_safety_modules(registry, audit, clock, vec![ModuleId::new(LIVE_TRADING)])
    }

    /// Modules not present in the registry surface as reconcile failures.
    pub fn with_safety_modules(
        registry: Arc<KillSwitchRegistry>,
        audit: Arc<ActionAuditLog>,
        clock: Arc<dyn Clock>,
        safety_modules: Vec<ModuleId>,
    ) -> Self {
        Self {
            registry,
            audit,
            clock,
            safety_modules,
            last_mode: RwLock::new(None),
        }
    }

    pub fn registry(&self) -> &Arc<KillSwitchRegistry> {
        &self.registry
    }

    pub fn safety_modules(&self) -> &[ModuleId] {
        &self.safety_modules
    }

    pub fn is_safety_module(&self, module: &ModuleId) -> bool {
        self.safety_modules.contains(module)
    }

    /// Mode of the most recent reconcile.
    pub fn last_mode(&self) -> Option<Mode> {
        *self.last_mode.read().unwrap_or_else(|e| e.into_inner())
    }

    /// Engage the latch if the snapshot requires it. Returns modules that changed.
    pub fn reconcile(
        &self,
        snapshot: &SystemHealthSnapshot,
    ) -> Result<Vec<KillSwitch>, InterlockError> {
        let mode = snapshot.mode;
        *self.last_mode.write().unwrap_or_else(|e| e.into_inner()) = Some(mode);

        if !mode.requires_latch() {
            return Ok(Vec::new());
        }

        if let Some(missing) = self
            .safety_modules
            .iter()
            .find(|m| !self.registry.contains(m))
        {
            let source = KillSwitchError::UnknownModule(missing.clone());
            return Err(self.reconcile_failed(missing, mode, source));
        }

        let reason = format!("auto: mode={mode}");
        let actor = ActorId::system();
        let mut changed = Vec::new();

        for module in &self.safety_modules {
            // Re-read at entry; a concurrent manual toggle may already have engaged it.
            let current = self
                .registry
                .get(module)
                .map_err(|e| self.reconcile_failed(module, mode, e))?;
            if current.is_active {
                continue;
            }

            let request = ToggleRequest {
                module: module.clone(),
                is_active: true,
                reason: reason.clone(),
                actor: actor.clone(),
                at: self.clock.now(),
            };
            let outcome = self
                .registry
                .apply(request)
                .map_err(|e| self.reconcile_failed(module, mode, e))?;

            self.audit.record(
                outcome.switch.updated_at,
                AuditPayload::toggle(&outcome, &reason, &actor, true, false),
            );

            if outcome.changed() {
                warn!(
                    module = %module,
                    mode = %mode,
                    score = snapshot.score,
                    "Safety latch engaged"
                );
                changed.push(outcome.switch);
            }
        }

        Ok(changed)
    }

    fn reconcile_failed(
        &self,
        module: &ModuleId,
        mode: Mode,
        source: KillSwitchError,
    ) -> InterlockError {
        warn!(module = %module, mode = %mode, error = %source, "Reconcile failed");
        self.audit.record(
            self.clock.now(),
            AuditPayload::ReconcileFailed {
                module: module.clone(),
                mode,
                error: source.to_string(),
            },
        );
        InterlockError::ReconcileFailed {
            module: module.clone(),
            mode,
            source,
        }
    }

    /// Operator toggle. Bypasses the latch but is always audited.
    pub fn toggle(
        &self,
        module: &ModuleId,
        is_active: bool,
        reason: &str,
        actor: &ActorId,
    ) -> Result<ToggleOutcome, InterlockError> {
        let request = ToggleRequest {
            module: module.clone(),
            is_active,
            reason: reason.to_string(),
            actor: actor.clone(),
            at: self.clock.now(),
        };
        let outcome = self.registry.apply(request)?;

        let overrides = !is_active
            && self.is_safety_module(module)
            && self.last_mode().is_some_and(|m| m.requires_latch());

        self.audit.record(
            outcome.switch.updated_at,
            AuditPayload::toggle(&outcome, reason, actor, false, overrides),
        );

        if overrides {
            warn!(
                module = %module,
                actor = %actor,
                reason,
                "Safety latch released by operator override"
            );
        } else {
            info!(
                module = %module,
                state = %outcome.switch.state(),
                actor = %actor,
                superseded = outcome.superseded,
                "Kill switch toggled"
            );
        }

        Ok(outcome)
    }
}

impl std::fmt::Debug for InterlockController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InterlockController")
            .field("safety_modules", &self.safety_modules)
            .field("last_mode", &self.last_mode())
            .finish_non_exhaustive()
    }
}
