//! # Loyalty Service
//!
//! Customer registration and ledger changes made outside a checkout.
//!
//! Every change runs in its own [`UnitOfWork`], which holds the database
//! write lock, so two adjustments for the same customer (or an adjustment
//! racing a checkout) are applied one after the other against fresh
//! balances.

use serde_json::json;
use tracing::{info, warn};

use cinder_audit::AuditSink;
use cinder_core::audit::AuditAction;
use cinder_core::loyalty::{redeem, LoyaltyMutation, LoyaltyRedemption};
use cinder_core::validation::{validate_actor_id, validate_name, validate_points, validate_reason};
use cinder_core::Customer;
use cinder_db::{CustomerRepository, Database, DbError, NewCustomer, UnitOfWork};

use crate::audit_entry;
use crate::error::{CheckoutError, CheckoutResult};

const ENTITY: &str = "customer";

#[derive(Debug, Clone)]
pub struct LoyaltyService {
    db: Database,
    customers: CustomerRepository,
    audit: AuditSink,
}

impl LoyaltyService {
    pub fn new(db: &Database, audit: AuditSink) -> Self {
        Self {
            db: db.clone(),
            customers: db.customers(),
            audit,
        }
    }

    /// Registers a customer at BRONZE with an empty ledger.
    pub async fn register(&self, new: NewCustomer, actor_id: &str) -> CheckoutResult<Customer> {
        validate_actor_id("actor_id", actor_id)?;
        validate_name("first_name", &new.first_name)?;
        validate_name("last_name", &new.last_name)?;

        let customer = self.customers.create(new).await.map_err(|e| match e {
            DbError::UniqueViolation { value, .. } => {
                CheckoutError::validation(format!("email {value} is already registered"))
            }
            other => other.into(),
        })?;

        info!(customer_id = %customer.id, "Customer registered");
        self.audit
            .record(
                audit_entry(actor_id, AuditAction::CustomerRegistered, ENTITY)
                    .entity(&customer.id)
                    .details(json!({ "tax_exempt": customer.is_tax_exempt })),
            )
            .await;

        Ok(customer)
    }

    pub async fn balance(&self, customer_id: &str) -> CheckoutResult<Customer> {
        self.customers
            .get_by_id(customer_id)
            .await?
            .ok_or_else(|| CheckoutError::CustomerNotFound(customer_id.to_string()))
    }

    /// Redeems points. The balance is unchanged on `InsufficientPoints`.
    pub async fn redeem(
        &self,
        customer_id: &str,
        points: i64,
        reason: &str,
        actor_id: &str,
    ) -> CheckoutResult<LoyaltyRedemption> {
        let updated = self
            .adjust(customer_id, LoyaltyMutation::RedeemPoints { amount: points }, reason, actor_id)
            .await?;

        Ok(LoyaltyRedemption {
            points_redeemed: points,
            new_balance: updated.loyalty_points,
        })
    }

    /// Applies a manual earn or redeem and returns the updated customer.
    pub async fn adjust(
        &self,
        customer_id: &str,
        mutation: LoyaltyMutation,
        reason: &str,
        actor_id: &str,
    ) -> CheckoutResult<Customer> {
        validate_actor_id("actor_id", actor_id)?;
        validate_reason(reason)?;
        validate_points(mutation.amount())?;

        let mut uow = UnitOfWork::begin(self.db.pool()).await?;

        let customer = uow
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| CheckoutError::CustomerNotFound(customer_id.to_string()))?;

        if let LoyaltyMutation::RedeemPoints { amount } = mutation {
            if let Err(e) = redeem(&customer, amount) {
                warn!(customer_id, requested = amount, available = customer.loyalty_points, "Redemption refused");
                return Err(e.into());
            }
        }

        if !uow.apply_loyalty(customer_id, &mutation).await? {
            // Balance was checked under the same write lock.
            return Err(CheckoutError::InsufficientPoints {
                requested: mutation.amount(),
                available: customer.loyalty_points,
            });
        }

        let updated = uow
            .get_customer(customer_id)
            .await?
            .ok_or_else(|| CheckoutError::CustomerNotFound(customer_id.to_string()))?;
        uow.commit().await?;

        info!(
            customer_id,
            ?mutation,
            balance = updated.loyalty_points,
            "Loyalty ledger adjusted"
        );
        self.audit
            .record(
                audit_entry(actor_id, AuditAction::LoyaltyAdjusted, ENTITY)
                    .entity(customer_id)
                    .details(json!({
                        "mutation": mutation,
                        "balance_delta": mutation.balance_delta(),
                        "reason": reason.trim(),
                        "previous_balance": customer.loyalty_points,
                        "new_balance": updated.loyalty_points,
                    })),
            )
            .await;

        Ok(updated)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use cinder_db::{AuditQuery, DbConfig};

    async fn setup() -> (Database, LoyaltyService) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let service = LoyaltyService::new(&db, AuditSink::new(&db));
        (db, service)
    }

    fn new_customer(email: &str) -> NewCustomer {
        NewCustomer {
            first_name: "Dana".into(),
            last_name: "Reyes".into(),
            email: Some(email.into()),
            ..NewCustomer::default()
        }
    }

    #[tokio::test]
    async fn test_register_is_audited_and_duplicate_email_rejected() {
        let (db, service) = setup().await;

        let customer = service.register(new_customer("dana@example.com"), "cashier-1").await.unwrap();
        assert_eq!(customer.loyalty_points, 0);

        let err = service
            .register(new_customer("DANA@example.com"), "cashier-1")
            .await
            .unwrap_err();
        assert!(matches!(err, CheckoutError::Validation(_)));

        let entries = db
            .audit_log()
            .query(&AuditQuery::new().action(AuditAction::CustomerRegistered))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_redeem_more_than_balance_leaves_balance_unchanged() {
        let (_db, service) = setup().await;
        let customer = service.register(new_customer("a@example.com"), "cashier-1").await.unwrap();
        service
            .adjust(&customer.id, LoyaltyMutation::EarnPoints { amount: 300 }, "Migration", "mgr-1")
            .await
            .unwrap();

        let err = service.redeem(&customer.id, 500, "Reward", "cashier-1").await.unwrap_err();
        assert!(matches!(
            err,
            CheckoutError::InsufficientPoints {
                requested: 500,
                available: 300
            }
        ));

        let after = service.balance(&customer.id).await.unwrap();
        assert_eq!(after.loyalty_points, 300);
        assert!(after.ledger_balanced());
    }

    #[tokio::test]
    async fn test_redeem_within_balance() {
        let (db, service) = setup().await;
        let customer = service.register(new_customer("b@example.com"), "cashier-1").await.unwrap();
        service
            .adjust(&customer.id, LoyaltyMutation::EarnPoints { amount: 800 }, "Promo", "mgr-1")
            .await
            .unwrap();

        let redemption = service.redeem(&customer.id, 500, "Reward", "cashier-1").await.unwrap();
        assert_eq!(redemption.new_balance, 300);

        let after = service.balance(&customer.id).await.unwrap();
        assert_eq!(after.points_lifetime_earned, 800);
        assert_eq!(after.points_lifetime_redeemed, 500);
        assert!(after.ledger_balanced());

        let adjustments = db
            .audit_log()
            .query(&AuditQuery::new().action(AuditAction::LoyaltyAdjusted))
            .await
            .unwrap();
        assert_eq!(adjustments.len(), 2);

        let mut deltas: Vec<i64> = adjustments
            .iter()
            .filter_map(|entry| entry.details["balance_delta"].as_i64())
            .collect();
        deltas.sort_unstable();
        assert_eq!(deltas, vec![-500, 800]);
    }

    #[tokio::test]
    async fn test_unknown_customer_and_bad_points() {
        let (_db, service) = setup().await;

        assert!(matches!(
            service.redeem("missing", 10, "Reward", "cashier-1").await,
            Err(CheckoutError::CustomerNotFound(_))
        ));
        assert!(matches!(
            service
                .adjust("missing", LoyaltyMutation::EarnPoints { amount: 0 }, "Promo", "cashier-1")
                .await,
            Err(CheckoutError::Validation(_))
        ));
    }
}
