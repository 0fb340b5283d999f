//! Wallet top-ups confirmed through a payment provider

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;

use crate::{
    config::PaymentsConfig,
    error::{AppError, AppResult},
    models::member::{TopUp, WalletBalance},
    repository::Repository,
};

/// A payment as reported by the provider, amount in major units
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentConfirmation {
    pub id: String,
    pub amount: Decimal,
    pub currency: String,
    pub captured: bool,
    /// Payer email as recorded by the provider
    pub email: Option<String>,
}

/// Payment provider port
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn fetch_payment(&self, payment_id: &str) -> AppResult<PaymentConfirmation>;
}

/// Provider payload; amounts are integers in the currency's minor unit
#[derive(Debug, Deserialize)]
struct ProviderPayment {
    id: String,
    amount: i64,
    currency: String,
    #[serde(default)]
    captured: bool,
    #[serde(default)]
    email: Option<String>,
}

impl From<ProviderPayment> for PaymentConfirmation {
    fn from(payment: ProviderPayment) -> Self {
        Self {
            id: payment.id,
            amount: Decimal::new(payment.amount, 2),
            currency: payment.currency.to_uppercase(),
            captured: payment.captured,
            email: payment.email.filter(|e| !e.trim().is_empty()),
        }
    }
}

/// Provider REST client
pub struct HttpPaymentGateway {
    client: Client,
    config: PaymentsConfig,
}

impl HttpPaymentGateway {
    pub fn new(config: PaymentsConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(5)))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build payment client: {}", e)))?;

        Ok(Self { client, config })
    }

    async fn get(&self, url: &str) -> reqwest::Result<reqwest::Response> {
        self.client
            .get(url)
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .send()
            .await
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn fetch_payment(&self, payment_id: &str) -> AppResult<PaymentConfirmation> {
        let url = format!(
            "{}/payments/{}",
            self.config.base_url.trim_end_matches('/'),
            payment_id
        );

        // GET is idempotent, so a transport failure is retried once
        let response = match self.get(&url).await {
            Ok(response) => response,
            Err(e) if e.is_connect() || e.is_timeout() => {
                tracing::warn!(payment_id, error = %e, "Payment lookup failed, retrying");
                self.get(&url).await.map_err(|e| {
                    AppError::ExternalService(format!("Payment provider unreachable: {}", e))
                })?
            }
            Err(e) => {
                return Err(AppError::ExternalService(format!(
                    "Payment provider request failed: {}",
                    e
                )))
            }
        };

        match response.status() {
            status if status.is_success() => {}
            StatusCode::NOT_FOUND | StatusCode::BAD_REQUEST => {
                return Err(AppError::Validation(format!("Unknown payment {}", payment_id)))
            }
            status => {
                return Err(AppError::ExternalService(format!(
                    "Payment provider answered {}",
                    status
                )))
            }
        }

        let payment: ProviderPayment = response.json().await.map_err(|e| {
            AppError::ExternalService(format!("Unreadable payment provider response: {}", e))
        })?;
        Ok(payment.into())
    }
}

#[derive(Clone)]
pub struct WalletService {
    repository: Repository,
    gateway: Arc<dyn PaymentGateway>,
    currency: String,
    max_top_up: Decimal,
}

impl WalletService {
    pub fn new(
        repository: Repository,
        gateway: Arc<dyn PaymentGateway>,
        config: &PaymentsConfig,
    ) -> Self {
        Self {
            repository,
            gateway,
            currency: config.currency.to_uppercase(),
            max_top_up: config.max_top_up,
        }
    }

    pub async fn balance(&self, member_id: i32) -> AppResult<WalletBalance> {
        let member = self.repository.members.get_by_id(member_id).await?;
        Ok(WalletBalance {
            member_id: member.id,
            email: member.email,
            balance: member.wallet_balance,
        })
    }

    /// Credit a captured payment to the member's wallet. Each payment id is
    /// credited at most once.
    pub async fn top_up(&self, member_id: i32, payment_id: &str) -> AppResult<WalletBalance> {
        let payment_id = payment_id.trim();
        if payment_id.is_empty() {
            return Err(AppError::Validation("Payment id is required".to_string()));
        }

        let member = self.repository.members.get_by_id(member_id).await?;
        let payment = self.gateway.fetch_payment(payment_id).await?;

        if payment.id != payment_id {
            return Err(AppError::ExternalService(format!(
                "Payment provider answered for {} instead of {}",
                payment.id, payment_id
            )));
        }
        if !payment.captured {
            return Err(AppError::Validation(format!(
                "Payment {} has not been captured",
                payment.id
            )));
        }
        if payment.currency != self.currency {
            return Err(AppError::Validation(format!(
                "Payment {} is in {}, expected {}",
                payment.id, payment.currency, self.currency
            )));
        }
        if payment.amount <= Decimal::ZERO || payment.amount > self.max_top_up {
            return Err(AppError::Validation(format!(
                "Payment {} of {} is outside the accepted top-up range",
                payment.id, payment.amount
            )));
        }
        if let Some(payer) = &payment.email {
            if !payer.eq_ignore_ascii_case(&member.email) {
                return Err(AppError::Authorization(format!(
                    "Payment {} was made by another payer",
                    payment.id
                )));
            }
        }

        let balance = self
            .repository
            .members
            .credit_wallet(&TopUp {
                payment_id: payment.id.clone(),
                member_id: member.id,
                amount: payment.amount,
                created_at: Utc::now(),
            })
            .await?;
        tracing::info!(
            member_id = member.id,
            payment_id = %payment.id,
            amount = %payment.amount,
            balance = %balance,
            "Wallet topped up"
        );

        Ok(WalletBalance {
            member_id: member.id,
            email: member.email,
            balance,
        })
    }
}
