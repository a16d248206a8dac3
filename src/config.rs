use crate::{
    agent::{AccountImplementation, AgentSettings},
    relay::{RelaySettings, DEFAULT_RELAY_URL},
};
use anyhow::{anyhow, Context, Result};
use ethers::types::U256;
use std::{env, str::FromStr, time::Duration};
use url::Url;

pub const DEFAULT_RPC_URL: &str = "https://rpc.gnosischain.com";
pub const DEFAULT_LISTEN_ADDRESS: &str = "127.0.0.1:3000";

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub listen_address: String,
    pub cors_domains: Vec<String>,
    /// Forward unknown JSON-RPC methods to `rpc_url`
    pub proxy_unknown_methods: bool,
    pub relay_api_key: Option<String>,
    pub private_key: Option<String>,
    pub agent: AgentSettings,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key/value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let defaults = AccountImplementation::default();
        let implementation = AccountImplementation {
            version: get("SAFE_VERSION").unwrap_or(defaults.version),
            entry_point: parse_or(&get, "ENTRY_POINT", defaults.entry_point)?,
            proxy_factory: parse_or(&get, "SAFE_PROXY_FACTORY", defaults.proxy_factory)?,
            singleton: parse_or(&get, "SAFE_SINGLETON", defaults.singleton)?,
            module: parse_or(&get, "SAFE_4337_MODULE", defaults.module)?,
            module_setup: parse_or(&get, "SAFE_MODULE_SETUP", defaults.module_setup)?,
            multi_send: parse_or(&get, "SAFE_MULTI_SEND", defaults.multi_send)?,
            salt_nonce: match get("SAFE_SALT_NONCE") {
                Some(value) => U256::from_dec_str(&value)
                    .map_err(|err| anyhow!("invalid SAFE_SALT_NONCE {value}: {err}"))?,
                None => defaults.salt_nonce,
            },
        };

        let relay_url = get("RELAY_URL").unwrap_or_else(|| DEFAULT_RELAY_URL.to_string());
        let relay = RelaySettings {
            url: Url::parse(&relay_url).with_context(|| format!("invalid RELAY_URL {relay_url}"))?,
            poll_interval: Duration::from_millis(parse_or(&get, "RELAY_POLL_INTERVAL_MS", 1_000)?),
            request_timeout: Duration::from_millis(parse_or(
                &get,
                "RELAY_REQUEST_TIMEOUT_MS",
                30_000,
            )?),
            sponsorship: parse_or(&get, "RELAY_SPONSORSHIP", true)?,
        };

        Ok(Self {
            rpc_url: get("RPC_URL").unwrap_or_else(|| DEFAULT_RPC_URL.to_string()),
            listen_address: get("AGENT_LISTEN_ADDRESS")
                .unwrap_or_else(|| DEFAULT_LISTEN_ADDRESS.to_string()),
            cors_domains: parse_cors(get("AGENT_CORS_DOMAINS").as_deref()),
            proxy_unknown_methods: parse_or(&get, "AGENT_PROXY_UNKNOWN", true)?,
            relay_api_key: get("RELAY_API_KEY"),
            private_key: get("AGENT_PRIVATE_KEY"),
            agent: AgentSettings {
                implementation,
                relay,
            },
        })
    }

    /// Websocket endpoints get a persistent connection, anything else HTTP.
    pub fn uses_websocket(&self) -> bool {
        self.rpc_url.starts_with("ws://") || self.rpc_url.starts_with("wss://")
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|err| anyhow!("invalid {key} {value}: {err}")),
        None => Ok(default),
    }
}

/// Comma separated list, `*` when unset.
fn parse_cors(domains: Option<&str>) -> Vec<String> {
    let domains: Vec<String> = domains
        .unwrap_or("*")
        .split(',')
        .map(|domain| domain.trim().to_string())
        .filter(|domain| !domain.is_empty())
        .collect();
    if domains.is_empty() {
        vec!["*".to_string()]
    } else {
        domains
    }
}
