//! Governance cycle integration tests
//!
//! Drives the engine end to end through a file-backed fact provider:
//! 1. A healthy document scores NORMAL and certifies partially
//! 2. A forced-safe document engages the latch and audits it
//! 3. A missing file leaves the last snapshot in place, marked stale
//! 4. A fully satisfied document after operator prep certifies L5

use chrono::{Duration, TimeZone, Utc};
use sentinel_gates::{
    AuditKind, CertLevel, EngineError, FactError, FixedClock, GovernanceEngine,
    GovernanceSettings, JsonFileFactProvider, Mode, ModuleId, StaticActorResolver,
};
use std::sync::Arc;
use tempfile::tempdir;

const HEALTHY: &str = r#"{
    "signals": [
        {"name": "regime", "value": 0.8, "weight": 0.3},
        {"name": "strategy", "value": 0.6, "weight": 0.3}
    ],
    "errors_last_hour": 1,
    "facts": {
        "shadow_monitoring.active": true,
        "pipelines.frozen": 1
    }
}"#;

const FORCED_SAFE: &str = r#"{
    "signals": [{"name": "regime", "value": 0.9, "weight": 0.5}],
    "force_safe": true
}"#;

const CERTIFIED: &str = r#"{
    "signals": [{"name": "regime", "value": 1.0, "weight": 0.5}],
    "facts": {
        "shadow_monitoring.active": true,
        "pipelines.frozen": 1,
        "api_keys.rotated_last_24h": 4,
        "k6.req_per_min": 12000,
        "k6.duration_minutes": 45,
        "k6.p99_latency_ms": 820,
        "security_audit.auth_status": 401,
        "security_audit.killswitch_status": 503,
        "security_audit.alerting": true,
        "control_room.grafana": true,
        "control_room.prometheus": true,
        "control_room.alerts": true,
        "docs.operations_manual": true,
        "docs.architecture_diagram": true,
        "docs.killswitch_procedures": true,
        "paper_trading.duration_hours": 72,
        "paper_trading.pnl_coherent": true,
        "paper_trading.mode": "NORMAL",
        "canary.portfolio_pct": 0.05,
        "canary.duration_hours": 30,
        "canary.pnl_diff_pct": 2.1,
        "canary.system_health": "NORMAL",
        "meta_governance.metrics": 6,
        "federated.communicating_agents": 24,
        "ai_regulation.voted_decisions": 12,
        "causal.active_graphs": 5
    }
}"#;

fn engine(clock: Arc<FixedClock>) -> GovernanceEngine {
    GovernanceEngine::new(
        GovernanceSettings::default(),
        clock,
        Arc::new(StaticActorResolver::new("ops-oncall")),
    )
    .unwrap()
}

#[test]
fn test_file_driven_governance_cycle() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("facts.json");
    let provider = JsonFileFactProvider::new(&path);
    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 8, 0, 0).unwrap()));
    let engine = engine(Arc::clone(&clock));

    // Healthy
    std::fs::write(&path, HEALTHY).unwrap();
    let cycle = engine.refresh(&provider).unwrap();
    assert_eq!(cycle.snapshot.mode, Mode::Normal);
    assert_eq!(cycle.snapshot.errors_last_hour, 1);
    // 2 of 4 phase1 items -> 50; overall 15
    assert_eq!(cycle.summary.phases.phase1.progress_pct, 50);
    assert_eq!(cycle.summary.overall_progress_pct, 15);
    assert_eq!(cycle.summary.level, CertLevel::L1);

    // Forced safe
    clock.advance(Duration::minutes(1));
    std::fs::write(&path, FORCED_SAFE).unwrap();
    let cycle = engine.refresh(&provider).unwrap();
    assert_eq!(cycle.snapshot.mode, Mode::Safe);
    assert_eq!(cycle.changed_switches.len(), 1);
    assert!(engine.registry().get(&ModuleId::live_trading()).unwrap().is_active);

    let kinds: Vec<_> = engine.audit().recent(3).iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            AuditKind::PhaseEvaluated,
            AuditKind::SwitchToggled,
            AuditKind::HealthRecomputed
        ]
    );

    // Source disappears
    let before = engine.status();
    std::fs::remove_file(&path).unwrap();
    let err = engine.refresh(&provider).unwrap_err();
    assert!(matches!(err, EngineError::Facts(FactError::Unavailable(_))));
    let after = engine.status();
    assert!(after.stale);
    assert_eq!(after.snapshot, before.snapshot);
    assert_eq!(after.cycles, before.cycles);
}

#[test]
fn test_operator_prep_reaches_full_certification() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("facts.json");
    std::fs::write(&path, CERTIFIED).unwrap();

    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 8, 0, 0).unwrap()));
    let engine = engine(clock);

    // Without critical switches phase1 stays at 75
    let cycle = engine.refresh(&JsonFileFactProvider::new(&path)).unwrap();
    assert_eq!(cycle.summary.phases.phase1.progress_pct, 75);
    assert_ne!(cycle.summary.level, CertLevel::L5);

    engine
        .manual_toggle(&ModuleId::live_trading(), true, "freeze")
        .unwrap();
    engine
        .manual_toggle(&ModuleId::new("EXECUTION"), true, "freeze")
        .unwrap();

    let cycle = engine.refresh(&JsonFileFactProvider::new(&path)).unwrap();
    assert_eq!(cycle.summary.overall_progress_pct, 100);
    assert_eq!(cycle.summary.level, CertLevel::L5);
    // Two interlocks: penalty applies, mode is driven by score alone
    assert_eq!(cycle.snapshot.active_interlock_count, 2);
    assert!((cycle.snapshot.score - 0.7).abs() < 1e-9);
    assert_eq!(cycle.snapshot.mode, Mode::Normal);
}

#[test]
fn test_malformed_document_is_rejected() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("facts.json");
    std::fs::write(&path, r#"{"signals": [], "unexpected": 1}"#).unwrap();

    let clock = Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 3, 3, 8, 0, 0).unwrap()));
    let engine = engine(clock);
    let err = engine.refresh(&JsonFileFactProvider::new(&path)).unwrap_err();
    assert!(matches!(err, EngineError::Facts(FactError::Schema(_))));
    assert!(engine.status().snapshot.is_none());
}
