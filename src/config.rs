use std::env;

use tracing_subscriber::EnvFilter;

/// Runtime configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the contract gateway proxying the `lottery()` call.
    pub gateway_url: String,
    /// Deployed lottery contract address, forwarded to the gateway.
    pub contract_address: String,
    /// Credential the gateway signs transactions with. Execution fails
    /// without it; startup does not.
    pub gateway_auth_token: Option<String>,
    /// Location of the embedded event store.
    pub db_path: String,
    /// Lottery window applied to events that do not carry their own.
    pub default_lottery_duration_hours: i64,
    pub bind_addr: String,
    pub port: u16,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            gateway_url: env::var("GATEWAY_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:3000".to_string()),
            contract_address: env::var("CONTRACT_ADDRESS")
                .unwrap_or_else(|_| "0x700D3D55ec6FC21394A43b02496F320E02873114".to_string()),
            gateway_auth_token: env::var("GATEWAY_AUTH_TOKEN").ok(),
            db_path: env::var("DB_PATH").unwrap_or_else(|_| "gods-hand-events.db".to_string()),
            default_lottery_duration_hours: env::var("DEFAULT_LOTTERY_DURATION_HOURS")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(72),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: env::var("PORT")
                .ok()
                .and_then(|raw| raw.parse().ok())
                .unwrap_or(8089),
        }
    }
}

pub fn init_tracing() {
    let mut env_filter = EnvFilter::new("gods_hand_lottery=info");

    if let Ok(rust_log) = std::env::var("RUST_LOG") {
        if !rust_log.is_empty() {
            for directive in rust_log.split(',').filter_map(|s| s.parse().ok()) {
                env_filter = env_filter.add_directive(directive);
            }
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .init();
}
