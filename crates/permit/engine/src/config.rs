//! Engine configuration

use permit_types::{PermitError, PermitResult, MAX_ESCALATE_AFTER_HOURS};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Top-level engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Prefix of generated permit numbers
    pub permit_number_prefix: String,

    /// Applied at creation to steps without their own escalation window
    pub default_escalate_after_hours: Option<u32>,

    pub escalation: EscalationConfig,

    pub telemetry: TelemetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            permit_number_prefix: "PER".to_string(),
            default_escalate_after_hours: None,
            escalation: EscalationConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    ///
    /// A missing path or missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> PermitResult<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            PermitError::Configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> PermitResult<Self> {
        let config: EngineConfig =
            toml::from_str(contents).map_err(|e| PermitError::Configuration(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> PermitResult<()> {
        if self.permit_number_prefix.trim().is_empty() {
            return Err(PermitError::Configuration(
                "permit_number_prefix must not be empty".into(),
            ));
        }
        match self.default_escalate_after_hours {
            Some(0) => {
                return Err(PermitError::Configuration(
                    "default_escalate_after_hours must be positive".into(),
                ));
            }
            Some(hours) if hours > MAX_ESCALATE_AFTER_HOURS => {
                return Err(PermitError::Configuration(format!(
                    "default_escalate_after_hours must not exceed {}",
                    MAX_ESCALATE_AFTER_HOURS
                )));
            }
            _ => {}
        }
        if self.escalation.sweep_interval_secs == 0 {
            return Err(PermitError::Configuration(
                "escalation.sweep_interval_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// How overdue steps get escalated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationMode {
    /// Swept at the top of permit reads
    #[default]
    Lazy,
    /// Swept by a background ticker
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub mode: EscalationMode,

    /// Ticker period in background mode
    pub sweep_interval_secs: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            mode: EscalationMode::Lazy,
            sweep_interval_secs: 300,
        }
    }
}

impl EscalationConfig {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Logging setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.permit_number_prefix, "PER");
        assert_eq!(config.escalation.mode, EscalationMode::Lazy);
        assert_eq!(config.escalation.sweep_interval(), Duration::from_secs(300));
        assert_eq!(config.telemetry.level, "info");
    }

    #[test]
    fn test_load_missing_config() {
        let config = EngineConfig::load(Some(Path::new("/nonexistent/permit.toml"))).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(EngineConfig::load(None).unwrap(), EngineConfig::default());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            r#"
            permit_number_prefix = "PTW"

            [escalation]
            mode = "background"
            "#,
        )
        .unwrap();
        assert_eq!(config.permit_number_prefix, "PTW");
        assert_eq!(config.escalation.mode, EscalationMode::Background);
        assert_eq!(config.escalation.sweep_interval_secs, 300);
        assert!(!config.telemetry.json);
    }

    #[test]
    fn test_malformed_toml_is_configuration_error() {
        let err = EngineConfig::from_toml_str("escalation = [").unwrap_err();
        assert!(matches!(err, PermitError::Configuration(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = EngineConfig::from_toml_str(
            r#"
            [escalation]
            sweep_interval_secs = 0
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, PermitError::Configuration(_)));
    }

    #[test]
    fn test_oversized_default_window_rejected() {
        let err = EngineConfig::from_toml_str(&format!(
            "default_escalate_after_hours = {}",
            u32::MAX
        ))
        .unwrap_err();
        assert!(matches!(err, PermitError::Configuration(_)));

        let config = EngineConfig::from_toml_str(&format!(
            "default_escalate_after_hours = {}",
            MAX_ESCALATE_AFTER_HOURS
        ))
        .unwrap();
        assert_eq!(
            config.default_escalate_after_hours,
            Some(MAX_ESCALATE_AFTER_HOURS)
        );
    }
}
