//! Core utilities and shared types
//!
//! - `compression`: zlib inflate/deflate helpers
//! - `config`: store limits loaded from the environment
//! - `error`: the typed error taxonomy carried inside `anyhow::Error`

pub mod compression;
pub mod config;
pub mod error;
