// src/contracts/mod.rs
//! Smart contract bindings.

pub mod kyc_registry;
