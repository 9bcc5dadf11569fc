//! # Fact Boundary
//!
//! Typed facts supplied by external collaborators, declarative rules evaluated
//! over them, and the validated document schema accepted from fact providers.
//!
//! The core never fetches facts itself. A [`FactProvider`] hands over a
//! [`FactUpdate`]; anything malformed is rejected here with a typed error
//! instead of being defaulted to zero.

use crate::health::{HealthInputs, HealthSignal};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// =============================================================================
// Fact Values
// =============================================================================

/// Value of a single fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl FactValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FactValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FactValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<bool> for FactValue {
    fn from(b: bool) -> Self {
        FactValue::Bool(b)
    }
}

impl From<f64> for FactValue {
    fn from(n: f64) -> Self {
        FactValue::Number(n)
    }
}

impl From<&str> for FactValue {
    fn from(s: &str) -> Self {
        FactValue::Text(s.to_string())
    }
}

/// A named fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub name: String,
    pub value: FactValue,
}

impl Fact {
    pub fn new(name: impl Into<String>, value: impl Into<FactValue>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// Name-indexed view over a list of facts. Later duplicates win.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FactSet {
    values: BTreeMap<String, FactValue>,
}

impl FactSet {
    pub fn from_facts(facts: &[Fact]) -> Self {
        let mut values = BTreeMap::new();
        for fact in facts {
            values.insert(fact.name.clone(), fact.value.clone());
        }
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&FactValue> {
        self.values.get(name)
    }

    pub fn flag(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(FactValue::as_bool)
    }

    pub fn number(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(FactValue::as_number)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FactValue::as_text)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// =============================================================================
// Fact Rules
// =============================================================================

/// Declarative predicate over a [`FactSet`].
///
/// A missing fact, or one of the wrong type, never satisfies a rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FactRule {
    /// Boolean fact is `true`.
    Flag(String),
    /// Number `>= min`.
    AtLeast { fact: String, min: f64 },
    /// Number `<= max`.
    AtMost { fact: String, max: f64 },
    /// Number `< max`.
    Below { fact: String, max: f64 },
    /// Exact match (numbers compare by value).
    Equals { fact: String, value: FactValue },
    All(Vec<FactRule>),
    Any(Vec<FactRule>),
}

impl FactRule {
    pub fn flag(fact: &str) -> Self {
        FactRule::Flag(fact.to_string())
    }

    pub fn at_least(fact: &str, min: f64) -> Self {
        FactRule::AtLeast {
            fact: fact.to_string(),
            min,
        }
    }

    pub fn at_most(fact: &str, max: f64) -> Self {
        FactRule::AtMost {
            fact: fact.to_string(),
            max,
        }
    }

    pub fn below(fact: &str, max: f64) -> Self {
        FactRule::Below {
            fact: fact.to_string(),
            max,
        }
    }

    pub fn equals(fact: &str, value: impl Into<FactValue>) -> Self {
        FactRule::Equals {
            fact: fact.to_string(),
            value: value.into(),
        }
    }

    pub fn evaluate(&self, facts: &FactSet) -> bool {
        match self {
            FactRule::Flag(name) => facts.flag(name).unwrap_or(false),
            FactRule::AtLeast { fact, min } => facts.number(fact).is_some_and(|v| v >= *min),
            FactRule::AtMost { fact, max } => facts.number(fact).is_some_and(|v| v <= *max),
            FactRule::Below { fact, max } => facts.number(fact).is_some_and(|v| v < *max),
            FactRule::Equals { fact, value } => facts.get(fact) == Some(value),
            FactRule::All(rules) => rules.iter().all(|r| r.evaluate(facts)),
            FactRule::Any(rules) => rules.iter().any(|r| r.evaluate(facts)),
        }
    }
}

// =============================================================================
// Fact Update (core input)
// =============================================================================

/// One push of facts into the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactUpdate {
    pub signals: Vec<HealthSignal>,
    pub errors_last_hour: u32,
    pub force_safe: bool,
    /// Facts for certification predicates.
    pub facts: Vec<Fact>,
}

impl FactUpdate {
    /// Scoring inputs with the given interlock count.
    pub fn health_inputs(&self, active_interlock_count: u32) -> HealthInputs {
        HealthInputs {
            signals: self.signals.clone(),
            errors_last_hour: self.errors_last_hour,
            active_interlock_count,
            force_safe: self.force_safe,
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Fact boundary error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FactError {
    /// Upstream source failed; callers keep the last snapshot.
    #[error("Facts unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed fact document: {0}")]
    Schema(String),
}

// =============================================================================
// Fact Document (wire schema)
// =============================================================================

/// Fact document accepted from providers (JSON).
///
/// ```json
/// {
///   "signals": [{"name": "regime", "value": 0.8, "weight": 0.3}],
///   "errors_last_hour": 2,
///   "force_safe": false,
///   "facts": {"shadow_monitoring.active": true, "k6.req_per_min": 12000}
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FactDocument {
    #[serde(default)]
    pub signals: Vec<HealthSignal>,
    #[serde(default)]
    pub errors_last_hour: u32,
    #[serde(default)]
    pub force_safe: bool,
    #[serde(default)]
    pub facts: BTreeMap<String, FactValue>,
}

impl FactDocument {
    pub fn from_json(json: &str) -> Result<Self, FactError> {
        let doc: FactDocument =
            serde_json::from_str(json).map_err(|e| FactError::Schema(e.to_string()))?;
        doc.validate()?;
        Ok(doc)
    }

    /// Structural checks. Signal ranges are left to the scorer.
    pub fn validate(&self) -> Result<(), FactError> {
        for signal in &self.signals {
            if signal.name.trim().is_empty() {
                return Err(FactError::Schema("signal with empty name".to_string()));
            }
        }
        for (name, value) in &self.facts {
            if name.trim().is_empty() {
                return Err(FactError::Schema("fact with empty name".to_string()));
            }
            if let FactValue::Number(n) = value {
                if !n.is_finite() {
                    return Err(FactError::Schema(format!("fact '{name}' is not finite")));
                }
            }
        }
        Ok(())
    }

    pub fn into_update(self) -> FactUpdate {
        FactUpdate {
            signals: self.signals,
            errors_last_hour: self.errors_last_hour,
            force_safe: self.force_safe,
            facts: self
                .facts
                .into_iter()
                .map(|(name, value)| Fact { name, value })
                .collect(),
        }
    }
}

// =============================================================================
// Providers
// =============================================================================

/// Supplies fact updates to the engine.
pub trait FactProvider: Send + Sync {
    fn fetch(&self) -> Result<FactUpdate, FactError>;
}

impl<F> FactProvider for F
where
    F: Fn() -> Result<FactUpdate, FactError> + Send + Sync,
{
    fn fetch(&self) -> Result<FactUpdate, FactError> {
        self()
    }
}

/// Reads a [`FactDocument`] from a JSON file on every fetch.
#[derive(Debug, Clone)]
pub struct JsonFileFactProvider {
    path: PathBuf,
}

impl JsonFileFactProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FactProvider for JsonFileFactProvider {
    fn fetch(&self) -> Result<FactUpdate, FactError> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            FactError::Unavailable(format!("{}: {}", self.path.display(), e))
        })?;
        Ok(FactDocument::from_json(&content)?.into_update())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_set() -> FactSet {
        FactSet::from_facts(&[
            Fact::new("grafana.active", true),
            Fact::new("k6.req_per_min", 12_000.0),
            Fact::new("k6.p99_latency_ms", 1_500.0),
            Fact::new("paper.mode", "NORMAL"),
        ])
    }

    // -------------------------------------------------------------------------
    // Rules
    // -------------------------------------------------------------------------

    #[test]
    fn test_rule_comparisons() {
        let facts = sample_set();
        assert!(FactRule::flag("grafana.active").evaluate(&facts));
        assert!(FactRule::at_least("k6.req_per_min", 10_000.0).evaluate(&facts));
        assert!(FactRule::at_most("k6.p99_latency_ms", 1_500.0).evaluate(&facts));
        assert!(!FactRule::below("k6.p99_latency_ms", 1_500.0).evaluate(&facts));
        assert!(FactRule::equals("paper.mode", "NORMAL").evaluate(&facts));
        assert!(!FactRule::equals("paper.mode", "SAFE").evaluate(&facts));
    }

    #[test]
    fn test_missing_or_mistyped_fact_never_satisfies() {
        let facts = sample_set();
        assert!(!FactRule::flag("prometheus.active").evaluate(&facts));
        assert!(!FactRule::flag("k6.req_per_min").evaluate(&facts));
        assert!(!FactRule::at_least("paper.mode", 0.0).evaluate(&facts));
    }

    #[test]
    fn test_rule_combinators() {
        let facts = sample_set();
        let all = FactRule::All(vec![
            FactRule::flag("grafana.active"),
            FactRule::flag("prometheus.active"),
        ]);
        let any = FactRule::Any(vec![
            FactRule::flag("grafana.active"),
            FactRule::flag("prometheus.active"),
        ]);
        assert!(!all.evaluate(&facts));
        assert!(any.evaluate(&facts));
        assert!(FactRule::All(vec![]).evaluate(&facts));
        assert!(!FactRule::Any(vec![]).evaluate(&facts));
    }

    #[test]
    fn test_later_duplicate_wins() {
        let facts = FactSet::from_facts(&[Fact::new("x", false), Fact::new("x", true)]);
        assert_eq!(facts.flag("x"), Some(true));
        assert_eq!(facts.len(), 1);
    }

    // -------------------------------------------------------------------------
    // Document Schema
    // -------------------------------------------------------------------------

    #[test]
    fn test_document_parses_and_converts() {
        let json = r#"{
            "signals": [{"name": "regime", "value": 0.8, "weight": 0.3}],
            "errors_last_hour": 4,
            "facts": {"shadow_monitoring.active": true, "paper.mode": "NORMAL"}
        }"#;
        let update = FactDocument::from_json(json).unwrap().into_update();
        assert_eq!(update.signals.len(), 1);
        assert_eq!(update.errors_last_hour, 4);
        assert!(!update.force_safe);
        let set = FactSet::from_facts(&update.facts);
        assert_eq!(set.flag("shadow_monitoring.active"), Some(true));
        assert_eq!(set.text("paper.mode"), Some("NORMAL"));
    }

    #[test]
    fn test_document_rejects_unknown_fields() {
        let err = FactDocument::from_json(r#"{"signalz": []}"#).unwrap_err();
        assert!(matches!(err, FactError::Schema(_)));
    }

    #[test]
    fn test_document_rejects_empty_names() {
        let err = FactDocument::from_json(r#"{"facts": {" ": true}}"#).unwrap_err();
        assert!(matches!(err, FactError::Schema(_)));
    }

    // -------------------------------------------------------------------------
    // Providers
    // -------------------------------------------------------------------------

    #[test]
    fn test_file_provider_missing_file_is_unavailable() {
        let dir = tempdir().unwrap();
        let provider = JsonFileFactProvider::new(dir.path().join("absent.json"));
        assert!(matches!(provider.fetch(), Err(FactError::Unavailable(_))));
    }

    #[test]
    fn test_file_provider_reads_document() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("facts.json");
        std::fs::write(&path, r#"{"errors_last_hour": 7, "force_safe": true}"#).unwrap();
        let update = JsonFileFactProvider::new(&path).fetch().unwrap();
        assert_eq!(update.errors_last_hour, 7);
        assert!(update.force_safe);
    }

    #[test]
    fn test_closure_provider() {
        let provider = || Err::<FactUpdate, _>(FactError::Unavailable("db down".into()));
        assert!(matches!(provider.fetch(), Err(FactError::Unavailable(_))));
    }
}
