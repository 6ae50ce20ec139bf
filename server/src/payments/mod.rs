//! Payment gateway seam.
//!
//! The service only creates orders and checks checkout signatures locally;
//! capturing, refunds and webhooks stay with the gateway.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::config::PaymentConfig;
use crate::utils::{AppError, AppResult};

pub mod dummy;
pub mod razorpay;
pub mod signature;

pub use signature::SignatureVerifier;

#[derive(Debug, Clone, Serialize)]
pub struct OrderRequest {
    /// Amount in the currency's minor unit (paise for INR).
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: OrderRequest) -> AppResult<GatewayOrder>;

    /// Publishable key handed to the checkout widget.
    fn public_key(&self) -> Option<String>;
}

pub fn create_gateway(config: &PaymentConfig) -> Arc<dyn PaymentGateway> {
    match config {
        PaymentConfig::Razorpay(razorpay_config) => {
            Arc::new(razorpay::RazorpayGateway::new(razorpay_config.clone()))
        }
        PaymentConfig::Dummy { .. } => Arc::new(dummy::DummyGateway),
    }
}

pub fn to_minor_units(amount: Decimal) -> AppResult<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| AppError::ValidationError(format!("amount {amount} is out of range")))
}
