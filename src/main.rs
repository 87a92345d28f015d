// src/main.rs

//! # KYC Document Verification Service - Main Entry Point
//!
//! This module serves as the main entry point for the KYC service. It loads the
//! configuration, wires the adapters into the services and starts the API server.
//!
//! ## Architecture Overview
//! 1. **Storage Layer**: record stores plus Pinata/IPFS content storage
//! 2. **Blockchain Layer**: optional `EthClient` anchoring documents and
//!    admin signatures in the registry contract
//! 3. **Services Layer**: accounts, documents, multi-signature review, share
//!    links, access logs and the HTTP API
//!
//! ## Environment Variables
//! - `KYC_JWT_SECRET`: token signing secret (required)
//! - `KYC_BIND_ADDR`: listen address (default: 0.0.0.0:8000)
//! - `KYC_RPC_URL`, `KYC_CONTRACT_ADDRESS`, `KYC_PRIVATE_KEY`: enable the
//!   blockchain adapter when all three are set
//! - `KYC_PINATA_JWT` or `KYC_PINATA_API_KEY` + `KYC_PINATA_API_SECRET`:
//!   Pinata credentials for uploads
//! - `KYC_ADMIN_EMAILS`: comma-separated emails registered as admins

use crate::blockchain::{DocumentLedger, EthClient};
use crate::config::AppConfig;
use crate::services::api_server::ApiServer;
use crate::storage::ipfs_client::IpfsStorage;
use crate::storage::Stores;
use anyhow::Context;
use dotenv::dotenv;
use log::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;

// Module declarations (organized by functional domain)
mod blockchain; // Registry contract client
mod config; // Environment configuration
mod contracts; // Contract ABI bindings
mod error; // API error mapping
mod models; // Data structures
mod services; // Business logic and API
mod storage; // Record stores and IPFS
mod utils; // Helper functions
mod wallet; // Identity key generation

/// Main application entry point
///
/// # Initialization Sequence
/// 1. Load environment configuration
/// 2. Connect to the chain when configured
/// 3. Initialize stores and the content adapter
/// 4. Start API server
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::from_env().context("Failed to load configuration")?;
    let addr: SocketAddr = config
        .bind_addr
        .parse()
        .with_context(|| format!("Invalid bind address {}", config.bind_addr))?;

    let ledger: Option<Arc<dyn DocumentLedger>> = match config.chain_settings() {
        Some(settings) => {
            let client = EthClient::connect(&settings)
                .await
                .context("Failed to connect to the blockchain")?;
            info!("Blockchain adapter connected to {}", settings.rpc_url);
            Some(Arc::new(client))
        }
        None => {
            warn!("Blockchain settings incomplete; documents will not be anchored on chain");
            None
        }
    };

    let content = Arc::new(IpfsStorage::new(&config));
    let api_server = ApiServer::new(config, Stores::in_memory(), content, ledger)
        .context("Invalid multi-signature fee configuration")?;

    api_server.run(addr).await.context("API server stopped")?;
    Ok(())
}
