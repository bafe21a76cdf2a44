use clap::Parser;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

/// Beacon presence server
#[derive(Parser, Serialize, Deserialize, Clone, Debug)]
#[command(name = "beacon-server", version, about = "Beacon real-time presence server")]
pub struct Config {
    /// Port to listen on
    #[arg(long, env = "BEACON_PORT", default_value = "4000")]
    pub port: u16,

    /// Bind address
    #[arg(long, env = "BEACON_BIND_ADDRESS", default_value = "0.0.0.0")]
    pub bind_address: String,

    /// Path to TOML config file
    #[arg(long, default_value = "./beacon.toml")]
    pub config: String,

    /// Enable structured JSON logging (for Docker/production)
    #[arg(long, env = "BEACON_JSON_LOGS")]
    pub json_logs: bool,

    /// Output a commented TOML config template and exit
    #[arg(long)]
    pub generate_config: bool,

    /// Data directory for persistent state (JWT signing key)
    #[arg(long, env = "BEACON_DATA_DIR", default_value = "./data")]
    pub data_dir: String,

    /// Seconds of inactivity before a user is forcibly disconnected
    #[arg(long, env = "BEACON_IDLE_TIMEOUT_SECS", default_value = "3600")]
    pub idle_timeout_secs: u64,

    /// Seconds before the forced disconnect at which the warning fires
    #[arg(long, env = "BEACON_IDLE_WARNING_SECS", default_value = "1800")]
    pub idle_warning_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 4000,
            bind_address: "0.0.0.0".to_string(),
            config: "./beacon.toml".to_string(),
            json_logs: false,
            generate_config: false,
            data_dir: "./data".to_string(),
            idle_timeout_secs: 3600,
            idle_warning_secs: 1800,
        }
    }
}

impl Config {
    /// Load config with layered precedence:
    /// built-in defaults < TOML file < env vars (BEACON_*) < CLI args
    pub fn load() -> Result<Self, figment::Error> {
        let cli = Config::parse();
        let config_path = cli.config.clone();

        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_path))
            .merge(Env::prefixed("BEACON_"))
            .merge(Serialized::defaults(cli))
            .extract()
    }
}

/// Generate a commented TOML config template
pub fn generate_config_template() -> String {
    r#"# Beacon Presence Server Configuration
# Place this file at ./beacon.toml or specify with --config <path>
# All settings can be overridden via environment variables (BEACON_PORT, etc.)
# or CLI flags (--port, etc.)

# Server port (default: 4000)
# port = 4000

# Bind address (default: 0.0.0.0 — all interfaces)
# bind_address = "0.0.0.0"

# Enable structured JSON logging for Docker/production
# json_logs = false

# Data directory for the JWT signing key
# data_dir = "./data"

# Seconds of inactivity before a user is forcibly disconnected (default: 3600)
# idle_timeout_secs = 3600

# Seconds before the forced disconnect at which the warning fires (default: 1800)
# idle_warning_secs = 1800
"#
    .to_string()
}
