//! OIDC portal library
//!
//! Provides browser-facing OpenID Connect login for a server-rendered site.

#![deny(dead_code)]

pub mod auth;
pub mod config;
pub mod web;

use auth::ProviderHandle;
use config::Config;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// OIDC client, discovered once per process
    pub provider: Arc<ProviderHandle>,
}
