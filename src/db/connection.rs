use std::path::Path;

use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::Root;
use surrealdb::Surreal;

use crate::PulseError;

/// Handle to the feedback database, embedded or remote.
pub type PulseDb = Surreal<Any>;

pub const NAMESPACE: &str = "pulse";
pub const DATABASE: &str = "feedback";

fn default_namespace() -> String {
    NAMESPACE.to_string()
}

fn default_database() -> String {
    DATABASE.to_string()
}

/// Where the feedback table lives, read from `{data_path}/database.toml`.
///
/// ```toml
/// mode = "remote"
/// endpoint = "ws://127.0.0.1:8000"
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DbConfig {
    /// RocksDB inside the data directory. One process at a time.
    Embedded {
        #[serde(default)]
        path: Option<String>,
    },
    /// SurrealDB server over WebSocket, shared by CLI runs and the MCP server.
    Remote {
        endpoint: String,
        #[serde(default)]
        username: Option<String>,
        #[serde(default)]
        password: Option<String>,
        #[serde(default = "default_namespace")]
        namespace: String,
        #[serde(default = "default_database")]
        database: String,
    },
}

impl Default for DbConfig {
    fn default() -> Self {
        Self::Embedded { path: None }
    }
}

impl DbConfig {
    /// Connection string understood by `surrealdb::engine::any`.
    pub fn endpoint(&self, data_path: &Path) -> String {
        match self {
            DbConfig::Embedded { path: Some(path) } => format!("rocksdb:{path}"),
            DbConfig::Embedded { path: None } => {
                format!("rocksdb:{}", data_path.join("db").display())
            }
            DbConfig::Remote { endpoint, .. } => endpoint.clone(),
        }
    }

    fn scope(&self) -> (&str, &str) {
        match self {
            DbConfig::Embedded { .. } => (NAMESPACE, DATABASE),
            DbConfig::Remote {
                namespace,
                database,
                ..
            } => (namespace, database),
        }
    }

    /// Fill missing remote credentials from `PULSE_DB_USER` / `PULSE_DB_PASS`.
    fn with_env_credentials(mut self, var: impl Fn(&str) -> Option<String>) -> Self {
        if let DbConfig::Remote {
            username, password, ..
        } = &mut self
        {
            if username.is_none() {
                *username = var("PULSE_DB_USER");
            }
            if password.is_none() {
                *password = var("PULSE_DB_PASS");
            }
        }
        self
    }
}

/// Resolve the database config: `database.toml`, then `PULSE_DB_URL`, then
/// embedded RocksDB under the data path.
pub fn load_db_config(data_path: &Path) -> DbConfig {
    resolve_db_config(data_path, |key| std::env::var(key).ok())
}

fn resolve_db_config(data_path: &Path, var: impl Fn(&str) -> Option<String>) -> DbConfig {
    let config_path = data_path.join("database.toml");

    let from_file = std::fs::read_to_string(&config_path)
        .ok()
        .and_then(|contents| match toml::from_str::<DbConfig>(&contents) {
            Ok(config) => {
                tracing::info!("Loaded database config from {}", config_path.display());
                Some(config)
            }
            Err(e) => {
                tracing::warn!("Ignoring invalid {}: {}", config_path.display(), e);
                None
            }
        });

    let config = from_file
        .or_else(|| {
            var("PULSE_DB_URL").map(|endpoint| DbConfig::Remote {
                endpoint,
                username: None,
                password: None,
                namespace: default_namespace(),
                database: default_database(),
            })
        })
        .unwrap_or_default();

    config.with_env_credentials(var)
}

/// Connect and select the feedback namespace and database.
///
/// Remote connections sign in as root only when both credentials are known.
pub async fn init_db(config: &DbConfig, data_path: &Path) -> Result<PulseDb, PulseError> {
    let db = surrealdb::engine::any::connect(config.endpoint(data_path)).await?;

    if let DbConfig::Remote {
        username: Some(username),
        password: Some(password),
        ..
    } = config
    {
        db.signin(Root {
            username: username.as_str(),
            password: password.as_str(),
        })
        .await?;
    }

    let (namespace, database) = config.scope();
    db.use_ns(namespace).use_db(database).await?;
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_remote_config_from_toml_applies_defaults() {
        let config: DbConfig = toml::from_str(
            r#"
            mode = "remote"
            endpoint = "ws://127.0.0.1:8000"
            "#,
        )
        .unwrap();

        assert_eq!(
            config,
            DbConfig::Remote {
                endpoint: "ws://127.0.0.1:8000".into(),
                username: None,
                password: None,
                namespace: "pulse".into(),
                database: "feedback".into(),
            }
        );
    }

    #[test]
    fn test_database_toml_wins_over_env() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("database.toml"),
            "mode = \"embedded\"\npath = \"/tmp/pulse-test-db\"\n",
        )
        .unwrap();

        let config = resolve_db_config(dir.path(), env(&[("PULSE_DB_URL", "ws://ignored")]));
        assert_eq!(config.endpoint(dir.path()), "rocksdb:/tmp/pulse-test-db");
    }

    #[test]
    fn test_db_url_env_with_credentials() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = resolve_db_config(
            dir.path(),
            env(&[
                ("PULSE_DB_URL", "ws://db:8000"),
                ("PULSE_DB_USER", "ops"),
                ("PULSE_DB_PASS", "secret"),
            ]),
        );

        assert_eq!(
            config,
            DbConfig::Remote {
                endpoint: "ws://db:8000".into(),
                username: Some("ops".into()),
                password: Some("secret".into()),
                namespace: "pulse".into(),
                database: "feedback".into(),
            }
        );
    }

    #[test]
    fn test_default_is_rocksdb_under_data_path() {
        let dir = tempfile::TempDir::new().unwrap();
        std::fs::write(dir.path().join("database.toml"), "mode = [").unwrap();

        let config = resolve_db_config(dir.path(), env(&[]));
        assert_eq!(config, DbConfig::default());
        assert_eq!(
            config.endpoint(Path::new("/srv/pulse")),
            "rocksdb:/srv/pulse/db"
        );
    }
}
