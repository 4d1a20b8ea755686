//! AdHub backend: wallet ledger, asset bindings, applications and payment webhooks.

pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
