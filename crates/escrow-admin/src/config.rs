use anyhow::{Context, Result};
use escrow_core::EngineConfig;
use serde::Deserialize;
use std::path::Path;

/// Operator CLI configuration.
///
/// ```toml
/// operator_id = "ops-batch"
///
/// [engine]
/// max_cas_retries = 8
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Admin id recorded in the audit log for maintenance runs
    pub operator_id: String,
    pub engine: EngineConfig,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            operator_id: std::env::var("ESCROW_OPERATOR_ID")
                .unwrap_or_else(|_| "escrow-admin".into()),
            engine: EngineConfig::default(),
        }
    }
}

impl AdminConfig {
    /// Load from `path` if given, then apply `ESCROW_*` overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                toml::from_str::<Self>(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => Self::default(),
        };

        let engine = config
            .engine
            .with_env_overrides()
            .context("Invalid engine configuration")?;

        Ok(Self { engine, ..config })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_nested_engine_table() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "operator_id = \"ops-batch\"\n\n[engine]\nmax_cas_retries = 8").unwrap();

        let config = AdminConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.operator_id, "ops-batch");
        assert_eq!(config.engine.max_cas_retries, 8);
        assert_eq!(config.engine.event_channel_capacity, 256);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = AdminConfig::load(Some(Path::new("/nonexistent/escrow.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config"));
    }
}
