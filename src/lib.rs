//! Bibliotheca lending server
//!
//! A REST JSON API for a library's catalog, members and book loans: members
//! request books, administrators approve, reject and close loans, and copy
//! availability stays consistent with the loan ledger.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

use repository::Repository;
use services::{clock::Clock, payments::PaymentGateway, Services};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub services: Arc<Services>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        repository: Repository,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services = Services::new(repository.clone(), &config, clock, gateway);
        Self {
            config: Arc::new(config),
            repository,
            services: Arc::new(services),
        }
    }
}
