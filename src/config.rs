use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of files migrated concurrently in a batch
    pub max_workers: usize,
    /// Overwrite migrated files in place instead of writing alongside
    pub migrate_in_place: bool,
    /// Filename suffix for migrated copies when not migrating in place
    pub migrate_suffix: String,
    /// Branch consulted when a reference or target is not given explicitly
    pub default_branch: String,
    /// Directory within the schema repository that holds change descriptors
    pub migrations_dir: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            engine: EngineConfig::default(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_workers: 4,
            migrate_in_place: false,
            migrate_suffix: "_migrated".to_string(),
            default_branch: "main".to_string(),
            migrations_dir: "migrations".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and config file
    pub fn load() -> anyhow::Result<Self> {
        let mut config = config::Config::builder();

        // Add default configuration
        config = config.add_source(config::Config::try_from(&AppConfig::default())?);

        // Add config file if it exists
        config = config.add_source(config::File::with_name("tabmig").required(false));

        // Add environment variables with prefix "TABMIG_"
        config = config.add_source(
            config::Environment::with_prefix("TABMIG")
                .separator("_")
                .prefix_separator("_"),
        );

        let config = config.build()?;
        let app_config: AppConfig = config.try_deserialize()?;

        Ok(app_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.engine.max_workers, 4);
        assert!(!config.engine.migrate_in_place);
        assert_eq!(config.engine.migrate_suffix, "_migrated");
        assert_eq!(config.engine.default_branch, "main");
        assert_eq!(config.engine.migrations_dir, "migrations");
    }
}
