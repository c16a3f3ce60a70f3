use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config_backend::MemoryConfigBackend4;
use crate::database::{ParameterMap, redacted_access_string};
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Access parameters of the lease database, e.g.
    /// `{"type": "sqlite", "name": "/var/lib/dhcp/leases.db"}`.
    pub lease_database: ParameterMap,
    /// Access parameters of the configuration database.
    #[serde(default = "default_config_database")]
    pub config_database: ParameterMap,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_config_database() -> ParameterMap {
    ParameterMap::from([(
        "type".to_string(),
        MemoryConfigBackend4::BACKEND_TYPE.to_string(),
    )])
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lease_database: ParameterMap::from([
                ("type".to_string(), "sqlite".to_string()),
                ("name".to_string(), "leases.db".to_string()),
            ]),
            config_database: default_config_database(),
            log_level: default_log_level(),
        }
    }
}

fn validate_database(section: &str, parameters: &ParameterMap) -> Result<()> {
    match parameters.get("type") {
        Some(backend_type) if !backend_type.trim().is_empty() => {}
        _ => {
            return Err(Error::InvalidConfig(format!(
                "{section} must specify a database type"
            )));
        }
    }
    if parameters.get("type").map(String::as_str) == Some("sqlite")
        && parameters.get("name").is_none_or(|name| name.trim().is_empty())
    {
        return Err(Error::InvalidConfig(format!(
            "{section} of type sqlite must specify a database name"
        )));
    }
    Ok(())
}

impl Config {
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = serde_json::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save(path)?;
            Ok(config)
        }
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        validate_database("lease_database", &self.lease_database)?;
        validate_database("config_database", &self.config_database)?;

        if self.log_level.parse::<tracing::Level>().is_err() {
            return Err(Error::InvalidConfig(format!(
                "log_level '{}' must be one of trace, debug, info, warn or error",
                self.log_level
            )));
        }

        Ok(())
    }

    /// Parameters to open the lease store with.
    pub fn lease_parameters(&self) -> ParameterMap {
        self.lease_database.clone()
    }

    /// Parameters to open the configuration backend with.
    pub fn config_parameters(&self) -> ParameterMap {
        self.config_database.clone()
    }

    /// The lease database access string with the password hidden.
    pub fn redacted_lease_access(&self) -> String {
        redacted_access_string(&self.lease_database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.lease_parameters()["type"], "sqlite");
        assert_eq!(config.config_parameters()["type"], "memory");
    }

    #[test]
    fn test_missing_database_type() {
        let config = Config {
            lease_database: ParameterMap::from([("name".to_string(), "x.db".to_string())]),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_sqlite_requires_name() {
        let config = Config {
            lease_database: ParameterMap::from([("type".to_string(), "sqlite".to_string())]),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_log_level() {
        let config = Config {
            log_level: "loud".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_password_is_redacted() {
        let mut config = Config::default();
        config
            .lease_database
            .insert("password".to_string(), "secret".to_string());
        let redacted = config.redacted_lease_access();
        assert!(!redacted.contains("secret"));
        assert!(redacted.contains("type=sqlite"));
    }

    #[test]
    fn test_load_or_create_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dhcpstore.json");

        let created = Config::load_or_create(&path).unwrap();
        assert!(path.exists());
        let loaded = Config::load_or_create(&path).unwrap();
        assert_eq!(created, loaded);
    }

    #[test]
    fn test_optional_sections_default() {
        let config: Config =
            serde_json::from_str(r#"{"lease_database": {"type": "sqlite", "name": ":memory:"}}"#)
                .unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.config_database["type"], "memory");
    }
}
