//! Core of the Claude relay bot.
//!
//! This crate is framework-agnostic: it owns admission (per-user cooldown and
//! hourly quota), the completion client with its retry policy, and the relay
//! that decides what to answer. Telegram and the Anthropic HTTP API live behind
//! ports implemented in adapter crates.

pub mod admission;
pub mod config;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod model;
pub mod relay;
pub mod security;

pub use errors::{Error, Result};
