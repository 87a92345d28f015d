// src/services/mod.rs
pub mod access_logs;
pub mod accounts;
pub mod api_server;
pub mod auth;
pub mod document_service;
pub mod identity_service;
pub mod multisig;
pub mod share_service;
