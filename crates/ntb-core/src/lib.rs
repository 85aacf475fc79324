//! Core domain + application logic for the notification bot.
//!
//! This crate is framework-agnostic. Telegram, SQLite and HTTP live behind
//! ports (traits) implemented in adapter crates.

pub mod admin;
pub mod audit;
pub mod broadcast;
pub mod config;
pub mod conversation;
pub mod directory;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod formatting;
pub mod i18n;
pub mod logging;
pub mod messaging;
pub mod publish;
pub mod scheduler;
pub mod services;
pub mod session;
pub mod store;
pub mod validation;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use errors::{Error, Result};
