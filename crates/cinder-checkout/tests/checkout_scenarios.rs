//! End-to-end checkout behaviour against an in-memory database.

mod common;

use chrono::{Duration, Utc};

use cinder_checkout::{CheckoutError, CheckoutLine, OverrideRequest, VerificationRequest};
use cinder_core::age::{IdDocument, IdType, VerificationMethod, VerificationOutcome};
use cinder_core::audit::{AuditAction, Severity};
use cinder_core::loyalty::{LoyaltyMutation, LoyaltyTier};
use cinder_core::tax::TaxType;
use cinder_core::{Money, MAX_ITEM_QUANTITY, MAX_PRICE_CENTS};
use cinder_db::AuditQuery;

use common::{card, cash, harness, CASHIER, STORE};

// =============================================================================
// Age gate, tax and tender
// =============================================================================

#[tokio::test]
async fn restricted_cart_without_verification_is_rejected_and_stock_untouched() {
    let h = harness(Some("NY")).await;
    let cigs = h.cigarettes(10).await;

    let err = h
        .checkout
        .checkout(cash(vec![CheckoutLine::new(&cigs.id, 1)], 2500))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::AgeVerificationRequired));
    assert_eq!(h.on_hand(&cigs.id).await, 10);
    assert_eq!(h.count("transactions").await, 0);

    let violations = h
        .db
        .audit_log()
        .query(&AuditQuery::new().action(AuditAction::ComplianceViolation))
        .await
        .unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
    assert_eq!(violations[0].actor_id, CASHIER);
}

#[tokio::test]
async fn cash_short_of_total_is_rejected() {
    let h = harness(Some("NY")).await;
    let cigs = h.cigarettes(10).await;

    let mut request = cash(vec![CheckoutLine::new(&cigs.id, 1)], 2000);
    request.age_verification_completed = true;

    let err = h.checkout.checkout(request).await.unwrap_err();
    match err {
        CheckoutError::InsufficientCash { total, tendered } => {
            assert_eq!(total, Money::from_cents(2175));
            assert_eq!(tendered, Money::from_cents(2000));
        }
        other => panic!("expected InsufficientCash, got {other:?}"),
    }
    assert_eq!(h.on_hand(&cigs.id).await, 10);
}

#[tokio::test]
async fn verified_cash_sale_commits_with_change_and_itemised_tax() {
    let h = harness(Some("NY")).await;
    let cigs = h.cigarettes(10).await;

    let mut request = cash(vec![CheckoutLine::new(&cigs.id, 1)], 2500);
    request.age_verification_completed = true;

    let committed = h.checkout.checkout(request).await.unwrap();
    let tx = &committed.transaction;

    assert_eq!(tx.subtotal, Money::from_cents(1599));
    assert_eq!(tx.tax_amount, Money::from_cents(576));
    assert_eq!(tx.total_amount, Money::from_cents(2175));
    assert_eq!(tx.change_given, Some(Money::from_cents(325)));
    assert_eq!(tx.jurisdiction, "NY");
    assert!(tx.age_verification_required && tx.age_verification_completed);
    assert!(tx.receipt_number.starts_with('R'));
    assert_eq!(h.on_hand(&cigs.id).await, 9);

    let types: Vec<TaxType> = committed.tax_breakdown.iter().map(|l| l.tax_type).collect();
    assert_eq!(types, [TaxType::SalesTax, TaxType::Tobacco]);

    // Everything the receipt needs is persisted.
    let stored = h.db.transactions().get_by_id(&tx.id).await.unwrap().unwrap();
    assert_eq!(&stored, tx);
    assert_eq!(h.db.transactions().line_items(&tx.id).await.unwrap(), committed.line_items);
    assert_eq!(h.db.transactions().tax_lines(&tx.id).await.unwrap(), committed.tax_breakdown);

    let receipt = h.checkout.receipt(&committed);
    assert_eq!(receipt.total, Money::from_cents(2175));
    assert_eq!(receipt.payment.change, Some(Money::from_cents(325)));
    assert_eq!(receipt.tax_lines.len(), 2);
    assert!(receipt.age_verified);

    let created = h
        .db
        .audit_log()
        .query(&AuditQuery::new().action(AuditAction::TransactionCreated))
        .await
        .unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].entity_id.as_deref(), Some(tx.id.as_str()));
    assert_eq!(created[0].severity, Severity::Medium);
}

// =============================================================================
// Loyalty
// =============================================================================

#[tokio::test]
async fn purchase_crossing_threshold_promotes_customer() {
    let h = harness(None).await;
    let item = h.product("GRINDER-1", 3000, 5).await;
    let customer = h.customer("sam@example.com").await;

    sqlx::query("UPDATE customers SET total_spent = 48000 WHERE id = ?1")
        .bind(&customer.id)
        .execute(h.db.pool())
        .await
        .unwrap();

    let mut request = card(vec![CheckoutLine::new(&item.id, 1)]);
    request.customer_id = Some(customer.id.clone());

    let committed = h.checkout.checkout(request).await.unwrap();
    let tx = &committed.transaction;

    assert_eq!(tx.jurisdiction, "DEFAULT");
    assert_eq!(tx.total_amount, Money::from_cents(3240));
    assert_eq!(tx.loyalty_points_earned, 32);
    assert!(tx.payment_reference.is_some());
    assert!(tx.cash_tendered.is_none());

    let after = h.reload_customer(&customer.id).await;
    assert_eq!(after.total_spent, Money::from_cents(51_000));
    assert_eq!(after.loyalty_tier, LoyaltyTier::Silver);
    assert_eq!(after.loyalty_points, 32);
    assert_eq!(after.transaction_count, 1);
    assert!(after.ledger_balanced());
    assert_eq!(committed.customer.as_ref(), Some(&after));

    let receipt = h.checkout.receipt(&committed);
    let loyalty = receipt.loyalty.unwrap();
    assert_eq!(loyalty.points_earned, 32);
    assert_eq!(loyalty.tier, LoyaltyTier::Silver);
}

#[tokio::test]
async fn redeeming_more_than_balance_changes_nothing() {
    let h = harness(None).await;
    let item = h.product("PAPERS-1", 299, 5).await;
    let customer = h.customer("lee@example.com").await;
    h.loyalty
        .adjust(&customer.id, LoyaltyMutation::EarnPoints { amount: 300 }, "Signup bonus", "mgr-1")
        .await
        .unwrap();

    let err = h.loyalty.redeem(&customer.id, 500, "Reward", CASHIER).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientPoints { requested: 500, available: 300 }));

    let mut request = card(vec![CheckoutLine::new(&item.id, 1)]);
    request.customer_id = Some(customer.id.clone());
    request.redeem_points = Some(500);
    let err = h.checkout.checkout(request).await.unwrap_err();
    assert!(matches!(err, CheckoutError::InsufficientPoints { .. }));

    let after = h.reload_customer(&customer.id).await;
    assert_eq!(after.loyalty_points, 300);
    assert_eq!(after.points_lifetime_redeemed, 0);
    assert_eq!(h.on_hand(&item.id).await, 5);
}

#[tokio::test]
async fn redemption_at_checkout_is_recorded_with_accrual() {
    let h = harness(None).await;
    let item = h.product("TRAY-1", 1000, 5).await;
    let customer = h.customer("kai@example.com").await;
    h.loyalty
        .adjust(&customer.id, LoyaltyMutation::EarnPoints { amount: 50 }, "Promo", "mgr-1")
        .await
        .unwrap();

    let mut request = card(vec![CheckoutLine::new(&item.id, 1)]);
    request.customer_id = Some(customer.id.clone());
    request.redeem_points = Some(20);
    let committed = h.checkout.checkout(request).await.unwrap();

    assert_eq!(committed.transaction.loyalty_points_redeemed, 20);
    assert_eq!(committed.transaction.loyalty_points_earned, 10);

    let after = h.reload_customer(&customer.id).await;
    assert_eq!(after.loyalty_points, 50 - 20 + 10);
    assert_eq!(after.points_lifetime_earned, 60);
    assert_eq!(after.points_lifetime_redeemed, 20);
    assert!(after.ledger_balanced());
}

// =============================================================================
// Verification and overrides
// =============================================================================

fn id_of_age(years: i64) -> VerificationRequest {
    let today = Utc::now().date_naive();
    VerificationRequest {
        store_id: STORE.into(),
        cashier_id: CASHIER.into(),
        customer_id: None,
        method: VerificationMethod::ManualEntry,
        document: IdDocument {
            id_type: IdType::StateId,
            id_number: "S99887766".into(),
            date_of_birth: today - Duration::days(years * 366),
            expiration_date: today + Duration::days(700),
        },
    }
}

#[tokio::test]
async fn override_of_twenty_year_old_allows_sale_and_keeps_both_records() {
    let h = harness(Some("NY")).await;
    let cigs = h.cigarettes(3).await;

    let failed = h.verification.verify(id_of_age(20)).await.unwrap();
    assert_eq!(failed.outcome, VerificationOutcome::Failed);
    assert_eq!(failed.calculated_age, 20);
    assert!(failed.requires_manager_override);

    let mut request = cash(vec![CheckoutLine::new(&cigs.id, 1)], 2500);
    request.age_verification_id = Some(failed.id.clone());

    let err = h.checkout.checkout(request.clone()).await.unwrap_err();
    assert!(matches!(err, CheckoutError::AgeVerificationFailed { .. }));
    assert_eq!(h.on_hand(&cigs.id).await, 3);

    let overridden = h
        .verification
        .apply_override(OverrideRequest {
            verification_id: failed.id.clone(),
            manager_id: "mgr-9".into(),
            cashier_id: CASHIER.into(),
            reason: "Second photo ID confirmed, customer is a regular".into(),
        })
        .await
        .unwrap();

    let committed = h.checkout.checkout(request).await.unwrap();
    assert_eq!(committed.transaction.age_verification_id.as_deref(), Some(overridden.id.as_str()));
    assert_eq!(h.on_hand(&cigs.id).await, 2);

    let original = h.db.verifications().get_by_id(&failed.id).await.unwrap().unwrap();
    assert_eq!(original.outcome, VerificationOutcome::Failed);
    let stored_override = h.db.verifications().find_override_for(&failed.id).await.unwrap().unwrap();
    assert_eq!(stored_override.manager_id.as_deref(), Some("mgr-9"));

    let compliance = h
        .db
        .audit_log()
        .query(&AuditQuery::new().min_severity(Severity::High))
        .await
        .unwrap();
    let actions: Vec<AuditAction> = compliance.iter().map(|e| e.action).collect();
    assert!(actions.contains(&AuditAction::ManagerOverride));
    // One for the evaluation, one for the rejected checkout.
    assert_eq!(actions.iter().filter(|a| **a == AuditAction::AgeVerificationFailed).count(), 2);
}

#[tokio::test]
async fn passed_verification_id_authorises_sale() {
    let h = harness(Some("NY")).await;
    let cigs = h.cigarettes(3).await;
    let passed = h.verification.verify(id_of_age(30)).await.unwrap();

    let mut request = card(vec![CheckoutLine::new(&cigs.id, 2)]);
    request.age_verification_id = Some(passed.id.clone());

    let committed = h.checkout.checkout(request).await.unwrap();
    assert_eq!(committed.transaction.age_verification_id.as_deref(), Some(passed.id.as_str()));
    assert!(committed.line_items.iter().all(|i| i.age_verification_applied));
}

// =============================================================================
// Validation
// =============================================================================

#[tokio::test]
async fn empty_cart_and_bad_quantities_are_rejected_before_any_read() {
    let h = harness(None).await;
    let item = h.product("LIGHTER-1", 199, 5).await;

    assert!(matches!(
        h.checkout.checkout(card(vec![])).await,
        Err(CheckoutError::EmptyCart)
    ));
    assert!(matches!(
        h.checkout.checkout(card(vec![CheckoutLine::new(&item.id, 0)])).await,
        Err(CheckoutError::Validation(_))
    ));

    let mut no_tender = cash(vec![CheckoutLine::new(&item.id, 1)], 0);
    no_tender.cash_tendered = None;
    assert!(matches!(h.checkout.checkout(no_tender).await, Err(CheckoutError::Validation(_))));

    let rejected = h
        .db
        .audit_log()
        .query(&AuditQuery::new().action(AuditAction::CheckoutRejected))
        .await
        .unwrap();
    assert_eq!(rejected.len(), 3);
}

#[tokio::test]
async fn repeated_product_lines_are_merged() {
    let h = harness(None).await;
    let item = h.product("LIGHTER-2", 199, 5).await;

    let committed = h
        .checkout
        .checkout(card(vec![CheckoutLine::new(&item.id, 2), CheckoutLine::new(&item.id, 1)]))
        .await
        .unwrap();

    assert_eq!(committed.line_items.len(), 1);
    assert_eq!(committed.line_items[0].quantity, 3);
    assert_eq!(committed.transaction.subtotal, Money::from_cents(597));
    assert_eq!(h.on_hand(&item.id).await, 2);
}

#[tokio::test]
async fn unknown_inactive_and_short_products() {
    let h = harness(None).await;
    let item = h.product("FILTERS-1", 350, 2).await;

    assert!(matches!(
        h.checkout.checkout(card(vec![CheckoutLine::new("missing", 1)])).await,
        Err(CheckoutError::ProductNotFound(_))
    ));
    assert!(matches!(
        h.checkout.checkout(card(vec![CheckoutLine::new(&item.id, 3)])).await,
        Err(CheckoutError::InsufficientStock { available: 2, requested: 3, .. })
    ));

    h.inventory.deactivate(&item.id, "Recalled lot", "mgr-1").await.unwrap();
    assert!(matches!(
        h.checkout.checkout(card(vec![CheckoutLine::new(&item.id, 1)])).await,
        Err(CheckoutError::ProductNotFound(_))
    ));
    assert_eq!(h.on_hand(&item.id).await, 2);
}

#[tokio::test]
async fn unknown_customer_is_rejected() {
    let h = harness(None).await;
    let item = h.product("ASHTRAY-1", 899, 2).await;

    let mut request = card(vec![CheckoutLine::new(&item.id, 1)]);
    request.customer_id = Some("nobody".into());

    assert!(matches!(
        h.checkout.checkout(request).await,
        Err(CheckoutError::CustomerNotFound(_))
    ));
}

#[tokio::test]
async fn price_that_would_wrap_the_line_total_is_refused_without_a_panic() {
    let h = harness(None).await;
    let item = h.product("HUMIDOR-X", 100, 5).await;
    // Legacy rows can predate the price ceiling enforced on insert.
    sqlx::query("UPDATE products SET unit_price = ?2 WHERE id = ?1")
        .bind(&item.id)
        .bind(i64::MAX / 2 + 1)
        .execute(h.db.pool())
        .await
        .unwrap();

    let err = h
        .checkout
        .checkout(card(vec![CheckoutLine::new(&item.id, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, CheckoutError::Validation(_)), "{err:?}");
    assert!(!err.is_retryable());
    assert_eq!(h.on_hand(&item.id).await, 5);
    assert_eq!(h.count("transactions").await, 0);
}

#[tokio::test]
async fn ceiling_price_at_full_quantity_totals_exactly() {
    let h = harness(None).await;
    let item = h.product("HUMIDOR-MAX", MAX_PRICE_CENTS, MAX_ITEM_QUANTITY).await;

    let committed = h
        .checkout
        .checkout(card(vec![CheckoutLine::new(&item.id, MAX_ITEM_QUANTITY)]))
        .await
        .unwrap();

    let subtotal = MAX_PRICE_CENTS * MAX_ITEM_QUANTITY;
    assert_eq!(committed.transaction.subtotal.cents(), subtotal);
    assert_eq!(committed.transaction.tax_amount.cents(), subtotal / 100 * 8);
    assert_eq!(committed.transaction.total_amount.cents(), subtotal / 100 * 108);
    assert_eq!(h.on_hand(&item.id).await, 0);
}

#[tokio::test]
async fn tax_exempt_customer_pays_no_tax() {
    let h = harness(Some("NY")).await;
    let item = h.product("PIPE-1", 2000, 2).await;
    let customer = h.customer("exempt@example.com").await;
    sqlx::query("UPDATE customers SET is_tax_exempt = 1 WHERE id = ?1")
        .bind(&customer.id)
        .execute(h.db.pool())
        .await
        .unwrap();

    let mut request = card(vec![CheckoutLine::new(&item.id, 1)]);
    request.customer_id = Some(customer.id.clone());
    let committed = h.checkout.checkout(request).await.unwrap();

    assert_eq!(committed.transaction.tax_amount, Money::zero());
    assert_eq!(committed.transaction.exempt_amount, Money::from_cents(2000));
    assert!(committed.tax_breakdown.is_empty());
    assert_eq!(committed.transaction.loyalty_points_earned, 20);
}
