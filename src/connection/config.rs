use crate::core::{DbError, Result};
use serde::{Deserialize, Serialize};

/// Database configuration
///
/// Databases are identified by name: opening the same name twice yields the
/// same shared instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database name
    pub name: String,

    /// Refuse every write transaction
    pub read_only: bool,

    /// Reads outside a write transaction see the newest commit
    pub auto_refresh: bool,

    /// Maximum number of simultaneously open connections
    pub max_connections: usize,
}

impl DatabaseConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            read_only: false,
            auto_refresh: true,
            max_connections: 64,
        }
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn auto_refresh(mut self, auto_refresh: bool) -> Self {
        self.auto_refresh = auto_refresh;
        self
    }

    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Parse from connection string
    ///
    /// Format: "memolist://name?read_only=true&auto_refresh=false&max_connections=8"
    ///
    /// # Examples
    ///
    /// ```ignore
    /// let config = DatabaseConfig::from_url("memolist://inventory?read_only=true")?;
    /// ```
    pub fn from_url(url: &str) -> Result<Self> {
        let rest = url
            .strip_prefix("memolist://")
            .ok_or_else(|| DbError::ConfigError("URL must start with 'memolist://'".to_string()))?;

        let (name, query) = match rest.split_once('?') {
            Some((name, query)) => (name, Some(query)),
            None => (rest, None),
        };
        let mut config = Self::new(name);

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| DbError::ConfigError(format!("Invalid option '{}'", pair)))?;
            match key {
                "read_only" => config.read_only = parse_option(key, value)?,
                "auto_refresh" => config.auto_refresh = parse_option(key, value)?,
                "max_connections" => config.max_connections = parse_option(key, value)?,
                _ => return Err(DbError::ConfigError(format!("Unknown option '{}'", key))),
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Convert to connection string
    pub fn to_url(&self) -> String {
        format!(
            "memolist://{}?read_only={}&auto_refresh={}&max_connections={}",
            self.name, self.read_only, self.auto_refresh, self.max_connections
        )
    }

    /// Parse a JSON document; absent fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbError::ConfigError(format!("Invalid configuration JSON: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(DbError::ConfigError("Database name cannot be empty".to_string()));
        }

        if self.name.contains(['/', '?', '&']) {
            return Err(DbError::ConfigError(format!(
                "Database name '{}' contains reserved characters",
                self.name
            )));
        }

        if self.max_connections == 0 {
            return Err(DbError::ConfigError("max_connections must be > 0".to_string()));
        }

        Ok(())
    }
}

fn parse_option<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| DbError::ConfigError(format!("Invalid value '{}' for '{}'", value, key)))
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self::new("default")
    }
}
