//! # Configuration Loading
//!
//! TOML configuration for the governance engine. Every section is optional;
//! an empty file yields the production defaults.

use anyhow::anyhow;
use sentinel_gates::{
    CertificationChecklistItem, ChecklistItemSpec, DEFAULT_AUDIT_CAPACITY, DEFAULT_MODULES,
    GovernanceSettings, HealthPolicy, ModuleId, default_checklist, validate_checklist,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default config location, relative to the workspace root.
pub const DEFAULT_CONFIG_PATH: &str = "configs/sentinel.toml";

/// Root configuration schema.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SentinelConfig {
    #[serde(default)]
    pub health: HealthPolicy,
    #[serde(default)]
    pub interlock: InterlockConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub certification: CertificationConfig,
}

/// Registered modules and the subset latched on critical/safe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterlockConfig {
    #[serde(default = "default_modules")]
    pub modules: Vec<String>,
    #[serde(default = "default_safety_modules")]
    pub safety_modules: Vec<String>,
}

fn default_modules() -> Vec<String> {
    DEFAULT_MODULES.iter().map(|m| m.to_string()).collect()
}

fn default_safety_modules() -> Vec<String> {
    vec![sentinel_gates::kill_switch::LIVE_TRADING.to_string()]
}

impl Default for InterlockConfig {
    fn default() -> Self {
        Self {
            modules: default_modules(),
            safety_modules: default_safety_modules(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    #[serde(default = "default_audit_capacity")]
    pub capacity: usize,
}

fn default_audit_capacity() -> usize {
    DEFAULT_AUDIT_CAPACITY
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            capacity: default_audit_capacity(),
        }
    }
}

/// Checklist override. Empty means the built-in rollout checklist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CertificationConfig {
    #[serde(default)]
    pub items: Vec<ChecklistItemSpec>,
}

impl CertificationConfig {
    pub fn checklist(&self) -> Vec<CertificationChecklistItem> {
        if self.items.is_empty() {
            default_checklist()
        } else {
            self.items.iter().cloned().map(Into::into).collect()
        }
    }
}

impl SentinelConfig {
    /// Load configuration from file path.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path)
            .or_else(|_| std::fs::read_to_string(Path::new("../..").join(path)))
            .map_err(|_| anyhow!("Could not find config file: {}", path.display()))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> anyhow::Result<Self> {
        let config: SentinelConfig =
            toml::from_str(config_str).map_err(|e| anyhow!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default path if present, else defaults.
    pub fn load_or_default(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(p) => Self::load(p),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::load(DEFAULT_CONFIG_PATH),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.health
            .validate()
            .map_err(|e| anyhow!("[health] {}", e))?;

        if self.interlock.modules.is_empty() {
            return Err(anyhow!("[interlock] modules must not be empty"));
        }
        if let Some(missing) = self
            .interlock
            .safety_modules
            .iter()
            .find(|m| !self.interlock.modules.contains(m))
        {
            return Err(anyhow!(
                "[interlock] safety module {} is not listed in modules",
                missing
            ));
        }
        if self.audit.capacity == 0 {
            return Err(anyhow!("[audit] capacity must be at least 1"));
        }

        validate_checklist(&self.certification.checklist())
            .map_err(|e| anyhow!("[certification] {}", e))?;
        Ok(())
    }

    pub fn settings(&self) -> GovernanceSettings {
        GovernanceSettings {
            policy: self.health.clone(),
            modules: self.interlock.modules.iter().map(ModuleId::new).collect(),
            safety_modules: self
                .interlock
                .safety_modules
                .iter()
                .map(ModuleId::new)
                .collect(),
            audit_capacity: self.audit.capacity,
            checklist: self.certification.checklist(),
        }
    }
}
