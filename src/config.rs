//! Environment-driven configuration.
//!
//! Every knob comes from the environment (a `.env` file is honored when
//! present). `envy` maps `DATABASE_URL` to `database_url` and so on.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// PostgreSQL connection string.
    pub database_url: String,
    /// Shared secret the payment gateway sends in `X-Webhook-Token`.
    pub webhook_token: String,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,
    /// Timeout applied to outbound calls (notifications, tracking, accounts).
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    /// Base URL of the notifications service. Unset disables the effect.
    #[serde(default)]
    pub notifier_url: Option<String>,
    /// Base URL of the conversion tracking service. Unset disables the effect.
    #[serde(default)]
    pub tracker_url: Option<String>,
    /// Base URL of the accounts service. Unset disables activation calls.
    #[serde(default)]
    pub accounts_url: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_owned()
}

fn default_max_connections() -> u32 {
    20
}

fn default_http_timeout_secs() -> u64 {
    5
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env::<Config>()
    }
}
