//! Gateway used in development and tests: orders are minted locally and
//! checkout signatures are produced with the configured dummy secret.

use async_trait::async_trait;
use uuid::Uuid;

use crate::payments::{GatewayOrder, OrderRequest, PaymentGateway};
use crate::utils::AppResult;

pub struct DummyGateway;

#[async_trait]
impl PaymentGateway for DummyGateway {
    async fn create_order(&self, request: OrderRequest) -> AppResult<GatewayOrder> {
        let order = GatewayOrder {
            id: format!("order_dummy_{}", Uuid::new_v4().simple()),
            amount: request.amount,
            currency: request.currency,
        };
        tracing::info!(order_id = %order.id, receipt = %request.receipt, "Dummy gateway created order");
        Ok(order)
    }

    fn public_key(&self) -> Option<String> {
        None
    }
}
