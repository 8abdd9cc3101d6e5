//! # Payment Capability
//!
//! Non-cash tenders are authorised by an external processor before the
//! checkout commits. Cash never reaches this module.
//!
//! ```text
//! ┌──────────────┐  authorize()   ┌────────────────────┐
//! │ Orchestrator │ ─────────────► │ PaymentProcessor   │  (card terminal,
//! │              │ ◄───────────── │                    │   gift card host)
//! │              │  authorisation └────────────────────┘
//! │   commit fails?  ── void() ──►  best effort, logged on failure
//! └──────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use cinder_core::{Money, PaymentMethod};

use crate::error::CheckoutResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub method: PaymentMethod,
    pub amount: Money,
    /// Id of the transaction being paid for.
    pub reference_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    /// Processor's reference, stored on the transaction.
    pub reference: String,
    pub method: PaymentMethod,
    pub amount: Money,
}

/// Declines are reported as [`crate::CheckoutError::PaymentDeclined`].
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    async fn authorize(&self, request: &PaymentRequest) -> CheckoutResult<PaymentAuthorization>;

    /// Releases an authorisation whose checkout did not commit.
    async fn void(&self, authorization: &PaymentAuthorization) -> CheckoutResult<()>;
}

/// Approves everything. Used where the terminal settles on its own.
#[derive(Debug, Clone, Default)]
pub struct ApprovingProcessor;

#[async_trait]
impl PaymentProcessor for ApprovingProcessor {
    async fn authorize(&self, request: &PaymentRequest) -> CheckoutResult<PaymentAuthorization> {
        let reference = format!("AUTH-{}", Uuid::new_v4().simple());
        debug!(%reference, method = %request.method, amount = %request.amount, "Payment approved");

        Ok(PaymentAuthorization {
            reference,
            method: request.method,
            amount: request.amount,
        })
    }

    async fn void(&self, authorization: &PaymentAuthorization) -> CheckoutResult<()> {
        debug!(reference = %authorization.reference, "Payment voided");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_approving_processor_echoes_amount() {
        let request = PaymentRequest {
            method: PaymentMethod::Card,
            amount: Money::from_cents(2175),
            reference_id: "tx-1".into(),
        };

        let auth = ApprovingProcessor.authorize(&request).await.unwrap();
        assert_eq!(auth.amount, request.amount);
        assert!(auth.reference.starts_with("AUTH-"));
        assert!(ApprovingProcessor.void(&auth).await.is_ok());
    }
}
