// src/models/mod.rs
pub mod access_log;
pub mod document;
pub mod identity;
pub mod share;
pub mod user;
