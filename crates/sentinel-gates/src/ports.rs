//! Injected collaborators: time source and operator identity.

use crate::kill_switch::ActorId;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// Time source for snapshots and audit entries.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for replay and tests.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, ts: DateTime<Utc>) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard = ts;
    }

    pub fn advance(&self, by: Duration) {
        let mut guard = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Resolves who initiated a manual toggle.
pub trait ActorResolver: Send + Sync {
    fn resolve(&self) -> ActorId;
}

/// Always resolves to the same operator.
#[derive(Debug, Clone)]
pub struct StaticActorResolver {
    actor: ActorId,
}

impl StaticActorResolver {
    pub fn new(actor: impl Into<ActorId>) -> Self {
        Self {
            actor: actor.into(),
        }
    }
}

impl ActorResolver for StaticActorResolver {
    fn resolve(&self) -> ActorId {
        self.actor.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_advances() {
        let start = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::seconds(90));
        assert_eq!(clock.now(), start + Duration::seconds(90));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn test_static_actor() {
        let resolver = StaticActorResolver::new("ops-oncall");
        assert_eq!(resolver.resolve().as_str(), "ops-oncall");
    }
}
