use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::RazorpayConfig;
use crate::payments::{GatewayOrder, OrderRequest, PaymentGateway};
use crate::utils::{AppError, AppResult};

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct RazorpayGateway {
    client: reqwest::Client,
    config: RazorpayConfig,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    description: Option<String>,
}

impl RazorpayGateway {
    pub fn new(config: RazorpayConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client, config }
    }

    fn orders_url(&self) -> String {
        format!("{}/v1/orders", self.config.base_url.trim_end_matches('/'))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(&self, request: OrderRequest) -> AppResult<GatewayOrder> {
        let response = self
            .client
            .post(self.orders_url())
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("order request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let description = response
                .json::<ErrorResponse>()
                .await
                .ok()
                .and_then(|body| body.error.description)
                .unwrap_or_else(|| "no description".to_string());
            return Err(AppError::ExternalServiceError(format!(
                "gateway rejected order ({status}): {description}"
            )));
        }

        let order: OrderResponse = response
            .json()
            .await
            .map_err(|e| AppError::ExternalServiceError(format!("malformed order response: {e}")))?;

        tracing::info!(order_id = %order.id, amount = order.amount, "Created gateway order");

        Ok(GatewayOrder {
            id: order.id,
            amount: order.amount,
            currency: order.currency,
        })
    }

    fn public_key(&self) -> Option<String> {
        Some(self.config.key_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_orders_url_ignores_trailing_slash() {
        let gateway = RazorpayGateway::new(RazorpayConfig {
            key_id: "rzp_test".to_string(),
            key_secret: "secret".to_string(),
            base_url: "https://api.razorpay.com/".to_string(),
        });
        assert_eq!(gateway.orders_url(), "https://api.razorpay.com/v1/orders");
        assert_eq!(gateway.public_key().as_deref(), Some("rzp_test"));
    }
}
