use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Chat relay server command line.
///
/// Setting fields are `Option` so only flags (or their env vars) that were
/// actually given override the TOML layer.
#[derive(Parser, Serialize, Clone, Debug, Default)]
#[command(name = "relay-server", version, about = "Multi-room chat relay server")]
pub struct CliArgs {
    /// Port to listen on
    #[arg(long, env = "RELAY_PORT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Bind address
    #[arg(long, env = "RELAY_BIND_ADDRESS")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bind_address: Option<String>,

    /// Path to TOML config file
    #[arg(long, default_value = "./relay.toml")]
    #[serde(skip)]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "RELAY_JSON_LOGS")]
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    #[serde(skip)]
    pub generate_config: bool,

    /// Data directory for persistent state (DB, signing key)
    #[arg(long, env = "RELAY_DATA_DIR")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,

    /// Shared HS256 secret for verifying access tokens.
    /// When unset, a random key is loaded from (or written to) data_dir/jwt_secret.
    #[arg(long, env = "RELAY_JWT_SECRET")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,

    /// Maximum number of history messages replayed on join (unset = all)
    #[arg(long, env = "RELAY_HISTORY_LIMIT")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<u32>,

    /// Maximum chat message length in characters
    #[arg(long, env = "RELAY_MAX_MESSAGE_LENGTH")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_length: Option<usize>,

    /// Per-connection outbound queue capacity (frames)
    #[arg(long, env = "RELAY_OUTBOUND_BUFFER")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outbound_buffer: Option<usize>,

    /// Create (or refresh) a user with this email, print an access token and exit
    #[arg(long, value_name = "EMAIL")]
    #[serde(skip)]
    pub create_user: Option<String>,

    /// Display name for --create-user
    #[arg(long, requires = "create_user")]
    #[serde(skip)]
    pub name: Option<String>,
}

/// Effective server settings after layering.
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(default)]
pub struct Config {
    pub port: u16,
    pub bind_address: String,
    pub json_logs: bool,
    pub data_dir: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub history_limit: Option<u32>,
    pub max_message_length: usize,
    pub outbound_buffer: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 3001,
            bind_address: "0.0.0.0".to_string(),
            json_logs: false,
            data_dir: "./data".to_string(),
            jwt_secret: None,
            history_limit: None,
            max_message_length: 4000,
            outbound_buffer: 256,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (RELAY_*) < CLI args
    pub fn load(cli: &CliArgs) -> Result<Self, figment::Error> {
        Self::figment(cli).extract()
    }

    fn figment(cli: &CliArgs) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&cli.config))
            .merge(Env::prefixed("RELAY_"))
            .merge(Serialized::defaults(cli))
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Chat Relay Server Configuration
# Place this file at ./relay.toml or specify with --config <path>
# All settings can be overridden via environment variables (RELAY_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 3001)
# port = 3001

# Bind address (default: 0.0.0.0, all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the SQLite database and generated signing key
# data_dir = "./data"

# HS256 secret shared with the token issuer.
# Leave unset to use a random key persisted at <data_dir>/jwt_secret.
# jwt_secret = ""

# Number of history messages replayed when a client joins a room.
# Unset replays the full history.
# history_limit = 200

# Maximum chat message length in characters (default: 4000)
# max_message_length = 4000

# Frames buffered per connection before deliveries to it are dropped (default: 256)
# outbound_buffer = 256
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli_with_config(path: &str) -> CliArgs {
        CliArgs {
            config: path.to_string(),
            ..CliArgs::default()
        }
    }

    #[test]
    fn test_defaults_survive_missing_toml_file() {
        let config = Config::load(&cli_with_config("./does-not-exist.toml")).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.max_message_length, 4000);
        assert!(config.history_limit.is_none());
        assert!(config.jwt_secret.is_none());
    }

    #[test]
    fn test_toml_values_apply_when_flags_are_absent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "port = 4567\nmax_message_length = 10\nhistory_limit = 50\n").unwrap();

        let config = Config::load(&cli_with_config(path.to_str().unwrap())).unwrap();
        assert_eq!(config.port, 4567);
        assert_eq!(config.max_message_length, 10);
        assert_eq!(config.history_limit, Some(50));
        assert_eq!(config.outbound_buffer, 256);
    }

    #[test]
    fn test_explicit_flag_overrides_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relay.toml");
        std::fs::write(&path, "port = 4567\nmax_message_length = 10\n").unwrap();

        let cli = CliArgs {
            port: Some(5000),
            ..cli_with_config(path.to_str().unwrap())
        };
        let config = Config::load(&cli).unwrap();
        assert_eq!(config.port, 5000);
        assert_eq!(config.max_message_length, 10);
    }

    #[test]
    fn test_parsed_command_line_without_flags_sets_nothing() {
        let cli = CliArgs::try_parse_from(["relay-server", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.config, "x.toml");
        if std::env::var_os("RELAY_PORT").is_none() {
            assert!(cli.port.is_none());
        }
        assert!(cli.create_user.is_none());
    }

    #[test]
    fn test_name_requires_create_user() {
        assert!(CliArgs::try_parse_from(["relay-server", "--name", "Alice"]).is_err());
        let cli = CliArgs::try_parse_from([
            "relay-server",
            "--create-user",
            "alice@example.com",
            "--name",
            "Alice",
        ])
        .unwrap();
        assert_eq!(cli.create_user.as_deref(), Some("alice@example.com"));
        assert_eq!(cli.name.as_deref(), Some("Alice"));
    }

    #[test]
    fn test_template_mentions_every_setting() {
        let template = generate_config_template();
        for key in [
            "port",
            "bind_address",
            "json_logs",
            "data_dir",
            "jwt_secret",
            "history_limit",
            "max_message_length",
            "outbound_buffer",
        ] {
            assert!(template.contains(key), "template is missing {}", key);
        }
    }
}
