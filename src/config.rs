// src/config.rs
//! Process configuration for the KYC service.
//!
//! All settings are read once at start-up from `KYC_*` environment variables
//! (a `.env` file is honoured through `dotenv` in `main`) and injected into the
//! services that need them. Nothing here is global or mutable.
//!
//! # Environment Variables
//! - `KYC_JWT_SECRET`: HMAC secret for bearer tokens (required)
//! - `KYC_RPC_URL`, `KYC_CONTRACT_ADDRESS`, `KYC_PRIVATE_KEY`: enable the chain adapter
//! - `KYC_PINATA_JWT` or `KYC_PINATA_API_KEY` + `KYC_PINATA_API_SECRET`: enable uploads
//! - `KYC_IPFS_GATEWAYS`: comma separated gateway base URLs, tried in order
//! - `KYC_ADMIN_EMAILS`: comma separated emails that register as admins

use config::{Config, ConfigError, Environment};
use serde::Deserialize;
use std::time::Duration;

/// Gateways tried, in this order, when reading content by CID.
pub const DEFAULT_GATEWAYS: [&str; 4] = [
    "https://gateway.pinata.cloud",
    "https://ipfs.io",
    "https://cloudflare-ipfs.com",
    "https://dweb.link",
];

/// Typed application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default = "default_jwt_expiry_hours")]
    pub jwt_expiry_hours: i64,

    pub rpc_url: Option<String>,
    pub contract_address: Option<String>,
    pub private_key: Option<String>,
    #[serde(default = "default_chain_timeout_secs")]
    pub chain_timeout_secs: u64,

    /// Treasury address the multisig fee is paid to.
    pub payment_receiver: Option<String>,
    #[serde(default = "default_multisig_fee_eth")]
    pub multisig_fee_eth: String,
    #[serde(default = "default_gas_estimate_eth")]
    pub gas_estimate_eth: String,
    /// When false the client-supplied payment hash is trusted as-is.
    #[serde(default)]
    pub verify_payment_on_chain: bool,

    #[serde(default = "default_pinata_api_url")]
    pub pinata_api_url: String,
    pub pinata_jwt: Option<String>,
    pub pinata_api_key: Option<String>,
    pub pinata_api_secret: Option<String>,
    #[serde(default = "default_gateways")]
    pub ipfs_gateways: Vec<String>,
    #[serde(default = "default_gateway_timeout_secs")]
    pub gateway_timeout_secs: u64,

    #[serde(default = "default_frontend_url")]
    pub frontend_url: String,
    #[serde(default = "default_public_api_url")]
    pub public_api_url: String,
    #[serde(default = "default_share_expiry_days")]
    pub share_default_expiry_days: i64,

    /// Accounts registered with one of these emails are created as admins.
    #[serde(default)]
    pub admin_emails: Vec<String>,
}

/// Connection settings for the chain adapter, present only when fully configured.
#[derive(Debug, Clone)]
pub struct ChainSettings {
    pub rpc_url: String,
    pub contract_address: String,
    pub private_key: String,
    pub timeout: Duration,
}

impl AppConfig {
    /// Loads the configuration from `KYC_*` environment variables.
    ///
    /// # Errors
    /// Returns `ConfigError` if a value cannot be parsed or `KYC_JWT_SECRET` is
    /// missing or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: AppConfig = Config::builder()
            .add_source(
                Environment::with_prefix("KYC")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("ipfs_gateways")
                    .with_list_parse_key("admin_emails"),
            )
            .build()?
            .try_deserialize()?;

        if config.jwt_secret.trim().is_empty() {
            return Err(ConfigError::Message(
                "KYC_JWT_SECRET must be set".to_string(),
            ));
        }
        Ok(config)
    }

    /// Returns chain settings when RPC URL, contract address and signer key are all set.
    pub fn chain_settings(&self) -> Option<ChainSettings> {
        match (&self.rpc_url, &self.contract_address, &self.private_key) {
            (Some(rpc_url), Some(contract_address), Some(private_key)) => Some(ChainSettings {
                rpc_url: rpc_url.clone(),
                contract_address: contract_address.clone(),
                private_key: private_key.clone(),
                timeout: Duration::from_secs(self.chain_timeout_secs),
            }),
            _ => None,
        }
    }

    /// Whether a newly registered account with this email is an admin.
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails
            .iter()
            .any(|admin| admin.trim().eq_ignore_ascii_case(email.trim()))
    }

    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            bind_addr: default_bind_addr(),
            jwt_secret: String::new(),
            jwt_expiry_hours: default_jwt_expiry_hours(),
            rpc_url: None,
            contract_address: None,
            private_key: None,
            chain_timeout_secs: default_chain_timeout_secs(),
            payment_receiver: None,
            multisig_fee_eth: default_multisig_fee_eth(),
            gas_estimate_eth: default_gas_estimate_eth(),
            verify_payment_on_chain: false,
            pinata_api_url: default_pinata_api_url(),
            pinata_jwt: None,
            pinata_api_key: None,
            pinata_api_secret: None,
            ipfs_gateways: default_gateways(),
            gateway_timeout_secs: default_gateway_timeout_secs(),
            frontend_url: default_frontend_url(),
            public_api_url: default_public_api_url(),
            share_default_expiry_days: default_share_expiry_days(),
            admin_emails: Vec::new(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".to_string()
}

fn default_jwt_expiry_hours() -> i64 {
    24
}

fn default_chain_timeout_secs() -> u64 {
    30
}

fn default_multisig_fee_eth() -> String {
    "0.02".to_string()
}

fn default_gas_estimate_eth() -> String {
    "0.001".to_string()
}

fn default_pinata_api_url() -> String {
    "https://api.pinata.cloud".to_string()
}

fn default_gateways() -> Vec<String> {
    DEFAULT_GATEWAYS.iter().map(|g| g.to_string()).collect()
}

fn default_gateway_timeout_secs() -> u64 {
    10
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_public_api_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_share_expiry_days() -> i64 {
    7
}
