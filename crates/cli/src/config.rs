use gateway::normalize_listen_addr;
use proto::{ConfigError, GatewayIdentity};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const CONFIG_FILE_NAME: &str = "pushgate.toml";

/// Top-level CLI configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// RPC front door configuration.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// RPC listener and identity settings.
///
/// Configure via `[gateway]` in `pushgate.toml` or environment variables:
/// - `PUSHGATE_NODE_ID`: node identifier (random UUID when empty)
/// - `PUSHGATE_API_LISTEN`: listen address, `:PORT` binds all interfaces
/// - `PUSHGATE_API_ADDRESS`: address advertised to backend callers
/// - `PUSHGATE_API_TOKEN`: shared secret every call must present
/// - `PUSHGATE_CALL_TIMEOUT_SECS`: bound for delegated calls (0 disables)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Node identifier; generated at startup when empty.
    #[serde(default)]
    pub node_id: String,
    /// Address the RPC listener binds.
    #[serde(default = "default_api_listen")]
    pub api_listen: String,
    /// Address other components use to reach this node.
    #[serde(default = "default_api_address")]
    pub api_address: String,
    /// Shared-secret API token.
    #[serde(default)]
    pub api_token: String,
    /// Optional bound, in seconds, for each delegated push call.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
    /// Optional PID file written while the service runs.
    #[serde(default)]
    pub pid_file: Option<PathBuf>,
}

fn default_api_listen() -> String {
    ":8901".to_string()
}

fn default_api_address() -> String {
    "127.0.0.1:8901".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            node_id: String::new(),
            api_listen: default_api_listen(),
            api_address: default_api_address(),
            api_token: String::new(),
            call_timeout_secs: None,
            pid_file: None,
        }
    }
}

impl GatewayConfig {
    /// Listen address with `:PORT` expanded to all interfaces.
    pub fn listen_addr(&self) -> String {
        normalize_listen_addr(&self.api_listen)
    }

    /// Delegation bound; `None` (or a zero value) means unbounded.
    pub fn call_timeout(&self) -> Option<Duration> {
        self.call_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Builds the process identity, generating a node id if none is configured.
    pub fn identity(&self) -> GatewayIdentity {
        let node_id = if self.node_id.trim().is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            self.node_id.trim().to_string()
        };
        GatewayIdentity::new(node_id, self.api_token.clone())
    }
}

impl Config {
    /// Loads configuration from explicit path, fallback locations, and env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config_path = path.map(|p| p.to_path_buf()).or_else(|| {
            // Look in current dir, then home dir
            let cwd = std::env::current_dir().ok()?.join(CONFIG_FILE_NAME);
            if cwd.exists() {
                return Some(cwd);
            }
            let home = std::env::var("HOME").ok()?;
            let home_config = PathBuf::from(home)
                .join(".pushgate")
                .join(CONFIG_FILE_NAME);
            if home_config.exists() {
                return Some(home_config);
            }
            None
        });
        debug!(path = ?config_path, "Config file resolved");

        let mut config = if let Some(path) = config_path {
            let content = std::fs::read_to_string(&path).map_err(ConfigError::Io)?;
            Self::from_toml(&content)?
        } else {
            Config::default()
        };
        config.apply_env_overrides()?;

        debug!(
            listen = %config.gateway.listen_addr(),
            advertise = %config.gateway.api_address,
            call_timeout = ?config.gateway.call_timeout(),
            "Config loaded"
        );
        Ok(config)
    }

    /// Parses a TOML document.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Toml(e.to_string()))
    }

    /// Environment variable overrides (highest priority).
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(node_id) = std::env::var("PUSHGATE_NODE_ID") {
            self.gateway.node_id = node_id;
        }
        if let Ok(listen) = std::env::var("PUSHGATE_API_LISTEN") {
            self.gateway.api_listen = listen;
        }
        if let Ok(address) = std::env::var("PUSHGATE_API_ADDRESS") {
            self.gateway.api_address = address;
        }
        if let Ok(token) = std::env::var("PUSHGATE_API_TOKEN") {
            self.gateway.api_token = token;
        }
        if let Ok(secs) = std::env::var("PUSHGATE_CALL_TIMEOUT_SECS") {
            let secs = secs
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::InvalidValue {
                    field: "PUSHGATE_CALL_TIMEOUT_SECS".to_string(),
                    reason: e.to_string(),
                })?;
            self.gateway.call_timeout_secs = Some(secs);
        }
        Ok(())
    }

    /// Checks values the listener cannot start without.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let listen = self.gateway.listen_addr();
        if listen.is_empty() {
            return Err(ConfigError::MissingField("gateway.api_listen".to_string()));
        }
        let port_ok = listen
            .rsplit_once(':')
            .is_some_and(|(_, port)| port.parse::<u16>().is_ok());
        if !port_ok {
            return Err(ConfigError::InvalidValue {
                field: "gateway.api_listen".to_string(),
                reason: format!("expected host:port or :port, got {listen:?}"),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{remove_env_var, set_env_var, with_locked_env};

    const ENV_KEYS: &[&str] = &[
        "PUSHGATE_NODE_ID",
        "PUSHGATE_API_LISTEN",
        "PUSHGATE_API_ADDRESS",
        "PUSHGATE_API_TOKEN",
        "PUSHGATE_CALL_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            remove_env_var(key);
        }
    }

    fn write_config(path: &Path, content: &str) {
        std::fs::write(path, content).expect("write config");
    }

    #[test]
    fn default_config_has_expected_values() {
        let cfg = Config::default();
        assert_eq!(cfg.gateway.api_listen, ":8901");
        assert_eq!(cfg.gateway.listen_addr(), "0.0.0.0:8901");
        assert_eq!(cfg.gateway.api_address, "127.0.0.1:8901");
        assert!(cfg.gateway.api_token.is_empty());
        assert_eq!(cfg.gateway.call_timeout(), None);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn parses_gateway_table() {
        let cfg = Config::from_toml(
            r#"
            [gateway]
            node_id = "node-7"
            api_listen = "127.0.0.1:9000"
            api_token = "secret"
            call_timeout_secs = 3
            pid_file = "/tmp/pushgate.pid"
            "#,
        )
        .expect("parse");
        assert_eq!(cfg.gateway.node_id, "node-7");
        assert_eq!(cfg.gateway.listen_addr(), "127.0.0.1:9000");
        assert_eq!(cfg.gateway.api_address, "127.0.0.1:8901");
        assert_eq!(cfg.gateway.call_timeout(), Some(Duration::from_secs(3)));
        assert_eq!(
            cfg.gateway.pid_file.as_deref(),
            Some(Path::new("/tmp/pushgate.pid"))
        );

        let identity = cfg.gateway.identity();
        assert_eq!(identity.node_id(), "node-7");
        assert_eq!(identity.auth_token(), "secret");
    }

    #[test]
    fn empty_file_uses_defaults_and_bad_toml_fails() {
        let cfg = Config::from_toml("").expect("empty");
        assert_eq!(cfg.gateway.api_listen, ":8901");

        let err = Config::from_toml("[gateway\n").expect_err("invalid toml");
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn zero_timeout_means_unbounded() {
        let cfg = Config::from_toml("[gateway]\ncall_timeout_secs = 0\n").expect("parse");
        assert_eq!(cfg.gateway.call_timeout(), None);
    }

    #[test]
    fn identity_generates_node_id_when_missing() {
        let gateway = GatewayConfig::default();
        let first = gateway.identity();
        let second = gateway.identity();
        assert!(uuid::Uuid::parse_str(first.node_id()).is_ok());
        assert_ne!(first.node_id(), second.node_id());
    }

    #[test]
    fn validate_rejects_missing_port() {
        let mut cfg = Config::default();
        cfg.gateway.api_listen = "localhost".to_string();
        let err = cfg.validate().expect_err("no port");
        assert!(err.to_string().contains("gateway.api_listen"));

        cfg.gateway.api_listen = "".to_string();
        assert!(matches!(cfg.validate(), Err(ConfigError::MissingField(_))));
    }

    #[test]
    fn load_reads_explicit_path_and_applies_env_overrides() {
        with_locked_env(|| {
            clear_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("custom.toml");
            write_config(
                &path,
                "[gateway]\nnode_id = \"from-file\"\napi_token = \"file-token\"\n",
            );

            set_env_var("PUSHGATE_API_TOKEN", "env-token");
            set_env_var("PUSHGATE_API_LISTEN", ":9100");
            set_env_var("PUSHGATE_CALL_TIMEOUT_SECS", "5");
            let cfg = Config::load(Some(&path)).expect("load");
            clear_env();

            assert_eq!(cfg.gateway.node_id, "from-file");
            assert_eq!(cfg.gateway.api_token, "env-token");
            assert_eq!(cfg.gateway.listen_addr(), "0.0.0.0:9100");
            assert_eq!(cfg.gateway.call_timeout(), Some(Duration::from_secs(5)));
        });
    }

    #[test]
    fn load_rejects_unparseable_timeout_env() {
        with_locked_env(|| {
            clear_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let path = tmp.path().join("pushgate.toml");
            write_config(&path, "");

            set_env_var("PUSHGATE_CALL_TIMEOUT_SECS", "soon");
            let result = Config::load(Some(&path));
            clear_env();

            let err = result.expect_err("invalid timeout");
            assert!(err.to_string().contains("PUSHGATE_CALL_TIMEOUT_SECS"));
        });
    }

    #[test]
    fn load_reports_missing_explicit_file() {
        with_locked_env(|| {
            clear_env();
            let tmp = tempfile::tempdir().expect("tempdir");
            let err = Config::load(Some(&tmp.path().join("absent.toml"))).expect_err("missing");
            assert!(matches!(err, ConfigError::Io(_)));
        });
    }
}
