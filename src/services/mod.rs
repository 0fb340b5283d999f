//! Business logic services

pub mod auth;
pub mod catalog;
pub mod clock;
pub mod ledger;
pub mod lending;
pub mod members;
pub mod payments;
pub mod stats;

use std::sync::Arc;

use crate::{config::AppConfig, repository::Repository};

use self::{clock::Clock, payments::PaymentGateway};

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub catalog: catalog::CatalogService,
    pub members: members::MembersService,
    pub ledger: ledger::LedgerService,
    pub lending: lending::LendingService,
    pub stats: stats::StatsService,
    pub wallet: payments::WalletService,
    pub clock: Arc<dyn Clock>,
}

impl Services {
    /// Wire every service onto the given stores, clock and payment provider
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        clock: Arc<dyn Clock>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let members = members::MembersService::new(repository.clone());
        let ledger =
            ledger::LedgerService::new(repository.clone(), config.lending.clone(), clock.clone());

        Self {
            auth: auth::AuthService::new(members.clone(), config.auth.clone()),
            catalog: catalog::CatalogService::new(repository.clone()),
            members,
            lending: lending::LendingService::new(repository.clone(), ledger.clone(), clock.clone()),
            ledger,
            stats: stats::StatsService::new(repository.clone()),
            wallet: payments::WalletService::new(repository, gateway, &config.payments),
            clock,
        }
    }
}
