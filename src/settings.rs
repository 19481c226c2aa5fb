//! Settings for the backend connection and the build driver.
//!
//! Values come from an optional config file (`tryton-xref.toml` unless another
//! path is given) overridden by `TRYTOND_*` environment variables, e.g.
//! `TRYTOND_CONNECTION_TYPE=memory`.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

pub const DEFAULT_CONFIG_FILE: &str = "tryton-xref";
pub const ENVIRONMENT_PREFIX: &str = "TRYTOND";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    #[default]
    Sqlite,
    Memory,
    /// A running Tryton server reached over XML-RPC.
    #[serde(rename = "xmlrpc")]
    XmlRpc,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub connection_type: ConnectionType,
    pub database: Option<String>,
    pub fixtures: Option<PathBuf>,
    pub registry_path: Option<PathBuf>,
    pub fail_on_broken_definition: bool,
    pub workers: usize,
    pub host: Option<String>,
    pub port: u16,
    pub user: String,
    pub password: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            connection_type: ConnectionType::Sqlite,
            database: None,
            fixtures: None,
            registry_path: None,
            fail_on_broken_definition: true,
            workers: 1,
            host: None,
            port: DEFAULT_PORT,
            user: "admin".to_string(),
            password: None,
        }
    }
}

impl Settings {
    /// Reads the config file (if present) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, Environment::with_prefix(ENVIRONMENT_PREFIX))
    }
    /// Like [`Settings::load`], with the environment layer given explicitly.
    pub fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let config = Config::builder()
            .add_source(file)
            .add_source(environment.try_parsing(true))
            .build()?;
        Self::from_config(config)
    }
    pub fn from_config(config: Config) -> Result<Self> {
        Ok(config.try_deserialize()?)
    }
    /// The database to open, defaulting per connection type.
    pub fn database(&self) -> String {
        match (&self.database, self.connection_type) {
            (Some(database), _) => database.clone(),
            (None, ConnectionType::Sqlite) => ":memory:".to_string(),
            (None, ConnectionType::Memory) => String::new(),
            (None, ConnectionType::XmlRpc) => "tryton".to_string(),
        }
    }
    pub fn workers(&self) -> usize {
        self.workers.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    #[test]
    fn defaults_apply_to_missing_keys() {
        let config = Config::builder()
            .add_source(File::from_str("connection_type = \"memory\"", FileFormat::Toml))
            .build()
            .unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.connection_type, ConnectionType::Memory);
        assert!(settings.fail_on_broken_definition);
        assert_eq!(settings.workers(), 1);
        assert_eq!(Settings::default().database(), ":memory:");
    }

    #[test]
    fn unknown_connection_type_is_rejected() {
        let config = Config::builder()
            .add_source(File::from_str("connection_type = \"postgresql\"", FileFormat::Toml))
            .build()
            .unwrap();
        assert!(Settings::from_config(config).is_err());
    }

    #[test]
    fn file_values_are_read() {
        let config = Config::builder()
            .add_source(File::from_str(
                "database = \"docs.sqlite\"\nworkers = 4\nfail_on_broken_definition = false\nfixtures = \"fixtures.json\"",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.database(), "docs.sqlite");
        assert_eq!(settings.workers(), 4);
        assert!(!settings.fail_on_broken_definition);
        assert_eq!(settings.fixtures, Some(PathBuf::from("fixtures.json")));
    }

    #[test]
    fn xmlrpc_keys_and_defaults() {
        let config = Config::builder()
            .add_source(File::from_str(
                "connection_type = \"xmlrpc\"\nhost = \"erp.example.com\"\npassword = \"secret\"",
                FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let settings = Settings::from_config(config).unwrap();
        assert_eq!(settings.connection_type, ConnectionType::XmlRpc);
        assert_eq!(settings.host.as_deref(), Some("erp.example.com"));
        assert_eq!(settings.port, 8000);
        assert_eq!(settings.user, "admin");
        assert_eq!(settings.database(), "tryton");
    }

    #[test]
    fn environment_overrides_the_file() {
        let path = std::env::temp_dir().join(format!("tryton_xref_{}_settings.toml", std::process::id()));
        std::fs::write(&path, "connection_type = \"sqlite\"\nworkers = 2\ndatabase = \"docs.sqlite\"\n").unwrap();
        let variables: config::Map<String, String> = [
            ("TRYTOND_CONNECTION_TYPE", "memory"),
            ("TRYTOND_WORKERS", "3"),
            ("TRYTOND_FAIL_ON_BROKEN_DEFINITION", "false"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let environment = Environment::with_prefix(ENVIRONMENT_PREFIX).source(Some(variables));
        let settings = Settings::load_with(Some(&path), environment).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(settings.connection_type, ConnectionType::Memory);
        assert_eq!(settings.workers(), 3);
        assert!(!settings.fail_on_broken_definition);
        // keys missing from the environment keep the file value
        assert_eq!(settings.database(), "docs.sqlite");
    }
}
