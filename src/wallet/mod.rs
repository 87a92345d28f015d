// src/wallet/mod.rs
//! Wallet key material.

pub mod key_management;
