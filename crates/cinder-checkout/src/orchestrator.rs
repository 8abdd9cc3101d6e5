//! # Checkout Orchestrator
//!
//! Turns a cart into one committed, immutable transaction.
//!
//! ## Checkout Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │ checkout(request)        steps 2 to 5 must finish by the deadline      │
//! │                                                                         │
//! │  1. validate        empty cart, quantities, cart size, tender          │
//! │  2. read (pool)     products, customer, verification                   │
//! │  3. decide (pure)   stock check, age gate, tax, cash/change, loyalty   │
//! │  4. authorise       non-cash tender through PaymentProcessor           │
//! │  5. stage (UoW)     ┌─────────────────────────────────────────────┐    │
//! │                     │ conditional stock decrements                │    │
//! │                     │ transaction + line items + tax lines        │    │
//! │                     │ redeem / earn, spend, tier from new total   │    │
//! │                     └─────────────── all or nothing ──────────────┘    │
//! │  6. commit          own task, no deadline; its outcome is the answer   │
//! │  7. audit           after commit; never fails the sale                 │
//! │                                                                         │
//! │  Lost decrement ──► rollback, re-read, retry (stock_conflict_retries)  │
//! │  Still short    ──► InsufficientStock                                  │
//! │  Any rejection  ──► audit entry (compliance ones at high severity)     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! The unit of work takes SQLite's write lock as it opens, so the stock
//! decrements and the customer update of one checkout serialise against every
//! other writer. The decrement is still conditional (`on_hand >= qty`), which
//! is what makes an oversell impossible even if the earlier read was stale.
//!
//! ## Timeouts
//! `request_timeout` bounds everything up to the commit. Once the unit of
//! work is staged, `COMMIT` runs in a spawned task that the deadline cannot
//! cancel, so a sale that reached storage is always reported as committed.
//! A timeout while staging rolls back and voids the authorisation.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn};
use ts_rs::TS;
use uuid::Uuid;

use cinder_audit::AuditSink;
use cinder_core::audit::{AuditAction, Severity};
use cinder_core::loyalty::{accrue_on_purchase, redeem, tier_for, LoyaltyAccrual, LoyaltyMutation};
use cinder_core::receipt::{Receipt, StoreInfo};
use cinder_core::tax::{compute_tax, JurisdictionTable, TaxBreakdownLine, TaxComputation, TaxLineInput};
use cinder_core::validation::{validate_actor_id, validate_cart_size, validate_points, validate_quantity};
use cinder_core::{
    Customer, LineItem, Money, PaymentMethod, Product, Transaction, TransactionKind,
};
use cinder_db::{CustomerRepository, Database, DbError, ProductRepository, UnitOfWork};

use crate::audit_entry;
use crate::config::CinderConfig;
use crate::error::{CheckoutError, CheckoutResult};
use crate::payment::{PaymentAuthorization, PaymentProcessor, PaymentRequest};
use crate::verification::AgeVerificationService;

/// Stored on the transaction when no known jurisdiction was configured.
pub const DEFAULT_JURISDICTION: &str = "DEFAULT";

const RECEIPT_SUFFIX_LEN: usize = 6;
const BASE36: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

// =============================================================================
// Request / Response
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutLine {
    pub product_id: String,
    pub quantity: i64,
}

impl CheckoutLine {
    pub fn new(product_id: impl Into<String>, quantity: i64) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// What the register submits.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CheckoutRequest {
    pub store_id: String,
    pub cashier_id: String,
    pub lines: Vec<CheckoutLine>,
    #[serde(default)]
    pub customer_id: Option<String>,
    pub payment_method: PaymentMethod,
    /// Required for cash.
    #[serde(default)]
    pub cash_tendered: Option<Money>,
    /// Caller asserts an ID check happened at the register.
    #[serde(default)]
    pub age_verification_completed: bool,
    /// A stored verification; checked before a restricted sale when given.
    #[serde(default)]
    pub age_verification_id: Option<String>,
    /// Points to redeem; requires a customer.
    #[serde(default)]
    pub redeem_points: Option<i64>,
}

/// The committed transaction with everything needed for a receipt.
#[derive(Debug, Clone, Serialize, TS)]
#[ts(export)]
pub struct CommittedTransaction {
    pub transaction: Transaction,
    pub line_items: Vec<LineItem>,
    pub tax_breakdown: Vec<TaxBreakdownLine>,
    /// Customer as of the commit.
    pub customer: Option<Customer>,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub store: StoreInfo,
    pub jurisdiction: Option<String>,
    pub jurisdictions: JurisdictionTable,
    pub stock_conflict_retries: u32,
    pub request_timeout: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &CinderConfig) -> Self {
        Self {
            store: config.store_info(),
            jurisdiction: config.store.jurisdiction.clone(),
            jurisdictions: config.jurisdiction_table(),
            stock_conflict_retries: config.checkout.stock_conflict_retries,
            request_timeout: config.request_timeout(),
        }
    }
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self::from_config(&CinderConfig::default())
    }
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Decisions made before the commit. Nothing here has touched storage.
struct CheckoutPlan {
    transaction: Transaction,
    line_items: Vec<LineItem>,
    tax: TaxComputation,
    customer: Option<Customer>,
    accrual: Option<LoyaltyAccrual>,
    redeem_points: Option<i64>,
}

/// Every write of a checkout, applied but not yet committed.
struct StagedCheckout {
    uow: UnitOfWork,
    committed: CommittedTransaction,
}

/// When the pre-commit phase of a checkout must be done.
#[derive(Debug, Clone, Copy)]
struct Deadline {
    at: Instant,
    budget: Duration,
}

impl Deadline {
    fn after(budget: Duration) -> Self {
        Self {
            at: Instant::now() + budget,
            budget,
        }
    }

    /// Runs `step`, failing with `Timeout` if the deadline passes first.
    /// A step cut off this way is dropped mid-flight.
    async fn bound<T>(self, step: impl Future<Output = CheckoutResult<T>>) -> CheckoutResult<T> {
        tokio::time::timeout_at(self.at, step)
            .await
            .unwrap_or_else(|_| {
                Err(CheckoutError::Timeout {
                    after_ms: self.budget.as_millis() as u64,
                })
            })
    }
}

#[derive(Clone)]
pub struct CheckoutOrchestrator {
    db: Database,
    products: ProductRepository,
    customers: CustomerRepository,
    verification: AgeVerificationService,
    payments: Arc<dyn PaymentProcessor>,
    audit: AuditSink,
    settings: OrchestratorSettings,
}

impl std::fmt::Debug for CheckoutOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutOrchestrator")
            .field("store_id", &self.settings.store.store_id)
            .field("jurisdiction", &self.settings.jurisdiction)
            .finish_non_exhaustive()
    }
}

impl CheckoutOrchestrator {
    pub fn new(
        db: &Database,
        verification: AgeVerificationService,
        payments: Arc<dyn PaymentProcessor>,
        audit: AuditSink,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            db: db.clone(),
            products: db.products(),
            customers: db.customers(),
            verification,
            payments,
            audit,
            settings,
        }
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    /// Runs one checkout to a committed transaction or a rejection.
    ///
    /// Rejections are audited before they are returned.
    #[instrument(skip_all, fields(store_id = %request.store_id, cashier_id = %request.cashier_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> CheckoutResult<CommittedTransaction> {
        let deadline = Deadline::after(self.settings.request_timeout);
        let result = self.run(&request, deadline).await;

        match &result {
            Ok(committed) => self.audit_committed(committed).await,
            Err(err) => self.audit_rejection(&request, err).await,
        }
        result
    }

    /// Receipt projection for a committed checkout.
    pub fn receipt(&self, committed: &CommittedTransaction) -> Receipt {
        Receipt::project(
            &self.settings.store,
            &committed.transaction,
            &committed.line_items,
            &committed.tax_breakdown,
            committed.customer.as_ref(),
        )
    }

    async fn run(&self, request: &CheckoutRequest, deadline: Deadline) -> CheckoutResult<CommittedTransaction> {
        let lines = self.validate(request)?;
        let mut conflicts = 0;

        loop {
            match self.attempt(request, &lines, deadline).await {
                Err(CheckoutError::ConcurrentStockConflict { product_id })
                    if conflicts < self.settings.stock_conflict_retries =>
                {
                    conflicts += 1;
                    warn!(%product_id, attempt = conflicts, "Stock changed during checkout, retrying");
                }
                Err(CheckoutError::ConcurrentStockConflict { product_id }) => {
                    return Err(self.shortfall(&product_id, &lines).await);
                }
                other => return other,
            }
        }
    }

    /// Checks the request shape and merges repeated products into one line.
    fn validate(&self, request: &CheckoutRequest) -> CheckoutResult<Vec<CheckoutLine>> {
        validate_actor_id("store_id", &request.store_id)?;
        validate_actor_id("cashier_id", &request.cashier_id)?;

        if request.store_id != self.settings.store.store_id {
            return Err(CheckoutError::validation(format!(
                "register is configured for store {}, not {}",
                self.settings.store.store_id, request.store_id
            )));
        }

        if request.lines.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }

        let mut merged: Vec<CheckoutLine> = Vec::with_capacity(request.lines.len());
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for line in &request.lines {
            validate_actor_id("product_id", &line.product_id)?;
            validate_quantity(line.quantity)?;

            match positions.get(line.product_id.as_str()) {
                Some(&i) => merged[i].quantity += line.quantity,
                None => {
                    positions.insert(&line.product_id, merged.len());
                    merged.push(line.clone());
                }
            }
        }
        validate_cart_size(merged.len())?;
        for line in &merged {
            validate_quantity(line.quantity)?;
        }

        if let Some(points) = request.redeem_points {
            validate_points(points)?;
            if request.customer_id.is_none() {
                return Err(CheckoutError::validation("redeeming points requires a customer"));
            }
        }

        match (request.payment_method.is_cash(), request.cash_tendered) {
            (true, None) => {
                return Err(CheckoutError::validation("cash_tendered is required for cash payments"))
            }
            (true, Some(tendered)) if tendered.is_negative() => {
                return Err(CheckoutError::validation("cash_tendered must not be negative"))
            }
            _ => {}
        }

        Ok(merged)
    }

    async fn attempt(
        &self,
        request: &CheckoutRequest,
        lines: &[CheckoutLine],
        deadline: Deadline,
    ) -> CheckoutResult<CommittedTransaction> {
        let plan = deadline.bound(self.plan(request, lines)).await?;

        let authorization = if request.payment_method.is_cash() {
            None
        } else {
            let payment = PaymentRequest {
                method: request.payment_method,
                amount: plan.transaction.total_amount,
                reference_id: plan.transaction.id.clone(),
            };
            Some(deadline.bound(self.payments.authorize(&payment)).await?)
        };

        let result = match deadline.bound(self.stage(plan, authorization.as_ref())).await {
            Ok(staged) => commit(staged).await,
            Err(err) => Err(err),
        };

        if let (Err(_), Some(auth)) = (&result, &authorization) {
            self.void_quietly(auth).await;
        }
        result
    }

    /// Reads current state and makes every decision the commit will apply.
    async fn plan(&self, request: &CheckoutRequest, lines: &[CheckoutLine]) -> CheckoutResult<CheckoutPlan> {
        let now = Utc::now();
        let transaction_id = Uuid::new_v4().to_string();

        let mut products: Vec<(Product, i64)> = Vec::with_capacity(lines.len());
        for line in lines {
            let product = match self.products.get_by_id(&line.product_id).await? {
                Some(product) if product.is_active => product,
                _ => return Err(CheckoutError::ProductNotFound(line.product_id.clone())),
            };
            if !product.has_stock_for(line.quantity) {
                return Err(CheckoutError::InsufficientStock {
                    sku: product.sku.clone(),
                    available: product.on_hand,
                    requested: line.quantity,
                });
            }
            products.push((product, line.quantity));
        }

        let customer = match &request.customer_id {
            Some(id) => Some(
                self.customers
                    .get_by_id(id)
                    .await?
                    .ok_or_else(|| CheckoutError::CustomerNotFound(id.clone()))?,
            ),
            None => None,
        };

        let restricted = products.iter().any(|(p, _)| p.age_restricted);
        let age_verification_id = if restricted {
            self.authorise_restricted_sale(request, now).await?
        } else {
            None
        };

        let line_items = products
            .iter()
            .enumerate()
            .map(|(i, (product, quantity))| {
                let line_total = product.unit_price.checked_mul(*quantity).ok_or_else(|| {
                    CheckoutError::validation(format!("line total for {} is too large", product.sku))
                })?;
                Ok(LineItem {
                    id: Uuid::new_v4().to_string(),
                    transaction_id: transaction_id.clone(),
                    line_number: i as i64 + 1,
                    product_id: product.id.clone(),
                    name: product.name.clone(),
                    sku: product.sku.clone(),
                    quantity: *quantity,
                    unit_price: product.unit_price,
                    line_total,
                    age_verification_applied: product.age_restricted,
                    special_tax_category: product.special_tax_category,
                    created_at: now,
                })
            })
            .collect::<CheckoutResult<Vec<LineItem>>>()?;

        let tax_inputs: Vec<TaxLineInput> = line_items
            .iter()
            .zip(&products)
            .map(|(item, (product, _))| {
                let mut input = TaxLineInput::new(item.line_total);
                input.category = product.category.clone();
                if let Some(category) = product.special_tax_category {
                    input = input.special(category);
                }
                if product.is_tax_exempt {
                    input = input.exempt();
                }
                input
            })
            .collect();

        let customer_exempt = customer.as_ref().is_some_and(|c| c.is_tax_exempt);
        let tax = compute_tax(
            &tax_inputs,
            self.settings.jurisdiction.as_deref(),
            customer_exempt,
            &self.settings.jurisdictions,
        )?;
        if tax.used_default_rate {
            warn!(
                jurisdiction = ?self.settings.jurisdiction,
                "No known tax jurisdiction configured, applying the default rate"
            );
        }

        let (cash_tendered, change_given) = if request.payment_method.is_cash() {
            let tendered = request.cash_tendered.unwrap_or_else(Money::zero);
            if tendered < tax.total_amount {
                return Err(CheckoutError::InsufficientCash {
                    total: tax.total_amount,
                    tendered,
                });
            }
            let change = tendered
                .checked_sub(tax.total_amount)
                .ok_or_else(|| CheckoutError::validation("change is too large"))?;
            (Some(tendered), Some(change))
        } else {
            (None, None)
        };

        let redeem_points = match (&customer, request.redeem_points) {
            (Some(customer), Some(points)) => Some(redeem(customer, points)?.points_redeemed),
            _ => None,
        };
        let accrual = customer
            .as_ref()
            .map(|c| accrue_on_purchase(c, tax.total_amount, tax.subtotal))
            .transpose()?;

        let transaction = Transaction {
            id: transaction_id,
            store_id: request.store_id.clone(),
            receipt_number: String::new(),
            kind: TransactionKind::Sale,
            reverses_transaction_id: None,
            cashier_id: request.cashier_id.clone(),
            customer_id: customer.as_ref().map(|c| c.id.clone()),
            jurisdiction: match (&tax.jurisdiction, tax.used_default_rate) {
                (Some(code), false) => code.clone(),
                _ => DEFAULT_JURISDICTION.to_string(),
            },
            subtotal: tax.subtotal,
            tax_amount: tax.total_tax_amount,
            exempt_amount: tax.exempt_amount,
            total_amount: tax.total_amount,
            payment_method: request.payment_method,
            payment_reference: None,
            cash_tendered,
            change_given,
            age_verification_required: restricted,
            age_verification_completed: restricted || request.age_verification_completed,
            age_verification_id,
            loyalty_points_earned: accrual.map(|a| a.points_earned).unwrap_or(0),
            loyalty_points_redeemed: redeem_points.unwrap_or(0),
            created_at: now,
        };

        debug!(
            transaction_id = %transaction.id,
            subtotal = %transaction.subtotal,
            tax = %transaction.tax_amount,
            total = %transaction.total_amount,
            restricted,
            "Checkout planned"
        );

        Ok(CheckoutPlan {
            transaction,
            line_items,
            tax,
            customer,
            accrual,
            redeem_points,
        })
    }

    /// Age gate for a cart holding restricted products.
    ///
    /// Returns the id of the verification that authorises the sale, when one
    /// was supplied.
    async fn authorise_restricted_sale(
        &self,
        request: &CheckoutRequest,
        now: DateTime<Utc>,
    ) -> CheckoutResult<Option<String>> {
        match &request.age_verification_id {
            Some(id) => {
                let record = self
                    .verification
                    .authorising_record(id, &request.store_id, now)
                    .await?;
                Ok(Some(record.id))
            }
            None if request.age_verification_completed => Ok(None),
            None => Err(CheckoutError::AgeVerificationRequired),
        }
    }

    /// Applies a plan inside one unit of work and leaves it open.
    async fn stage(
        &self,
        plan: CheckoutPlan,
        authorization: Option<&PaymentAuthorization>,
    ) -> CheckoutResult<StagedCheckout> {
        let CheckoutPlan {
            mut transaction,
            line_items,
            tax,
            customer,
            accrual,
            redeem_points,
        } = plan;

        // Dropping `uow` on any early return rolls everything back.
        let mut uow = UnitOfWork::begin(self.db.pool()).await?;

        for item in &line_items {
            if !uow.decrement_stock(&item.product_id, item.quantity).await? {
                return Err(CheckoutError::ConcurrentStockConflict {
                    product_id: item.product_id.clone(),
                });
            }
        }

        transaction.receipt_number = self.unique_receipt_number(&mut uow, &transaction).await?;
        transaction.payment_reference = authorization.map(|a| a.reference.clone());

        uow.insert_transaction(&transaction).await?;
        for item in &line_items {
            uow.insert_line_item(item).await?;
        }
        uow.insert_tax_lines(&transaction.id, &tax.breakdown).await?;

        let customer = match customer {
            Some(customer) => {
                Some(apply_customer_updates(&mut uow, &customer, &transaction, accrual, redeem_points).await?)
            }
            None => None,
        };

        Ok(StagedCheckout {
            uow,
            committed: CommittedTransaction {
                transaction,
                line_items,
                tax_breakdown: tax.breakdown,
                customer,
            },
        })
    }

    async fn unique_receipt_number(
        &self,
        uow: &mut UnitOfWork,
        transaction: &Transaction,
    ) -> CheckoutResult<String> {
        for _ in 0..2 {
            let candidate = generate_receipt_number(transaction.created_at);
            if !uow.receipt_number_exists(&transaction.store_id, &candidate).await? {
                return Ok(candidate);
            }
            warn!(receipt_number = %candidate, "Receipt number collision, regenerating");
        }

        Err(CheckoutError::PersistenceFailure {
            message: "could not generate a unique receipt number".to_string(),
            transient: true,
        })
    }

    /// The error for a product that lost every decrement retry.
    async fn shortfall(&self, product_id: &str, lines: &[CheckoutLine]) -> CheckoutError {
        let requested = lines
            .iter()
            .find(|l| l.product_id == product_id)
            .map(|l| l.quantity)
            .unwrap_or_default();

        match self.products.get_by_id(product_id).await {
            Ok(Some(product)) if product.is_active => CheckoutError::InsufficientStock {
                sku: product.sku,
                available: product.on_hand,
                requested,
            },
            Ok(_) => CheckoutError::ProductNotFound(product_id.to_string()),
            Err(e) => e.into(),
        }
    }

    async fn void_quietly(&self, authorization: &PaymentAuthorization) {
        if let Err(e) = self.payments.void(authorization).await {
            error!(?e, reference = %authorization.reference, "Failed to void payment after aborted checkout");
        }
    }

    // =========================================================================
    // Audit
    // =========================================================================

    async fn audit_committed(&self, committed: &CommittedTransaction) {
        let tx = &committed.transaction;
        let severity = if tx.age_verification_required {
            Severity::Medium
        } else {
            Severity::Low
        };

        self.audit
            .record(
                audit_entry(&tx.cashier_id, AuditAction::TransactionCreated, "transaction")
                    .entity(&tx.id)
                    .severity(severity)
                    .details(json!({
                        "receipt_number": tx.receipt_number,
                        "store_id": tx.store_id,
                        "total_cents": tx.total_amount.cents(),
                        "payment_method": tx.payment_method,
                        "age_verification_required": tx.age_verification_required,
                        "age_verification_id": tx.age_verification_id,
                        "customer_id": tx.customer_id,
                        "points_earned": tx.loyalty_points_earned,
                        "points_redeemed": tx.loyalty_points_redeemed,
                    })),
            )
            .await;
    }

    async fn audit_rejection(&self, request: &CheckoutRequest, err: &CheckoutError) {
        warn!(code = ?err.code(), error = %err, "Checkout rejected");

        let action = match err {
            CheckoutError::AgeVerificationFailed { .. } => AuditAction::AgeVerificationFailed,
            e if e.is_compliance_failure() => AuditAction::ComplianceViolation,
            _ => AuditAction::CheckoutRejected,
        };

        let mut entry = audit_entry(&request.cashier_id, action, "transaction").details(json!({
            "code": err.code(),
            "message": err.to_string(),
            "store_id": request.store_id,
            "lines": request.lines.len(),
            "customer_id": request.customer_id,
            "age_verification_id": request.age_verification_id,
        }));
        if err.is_compliance_failure() {
            entry = entry.severity(Severity::High);
        }

        self.audit.record(entry).await;
    }
}

/// Commits a staged checkout on its own task.
///
/// Dropping the caller does not cancel the commit, and the task's outcome is
/// the only thing reported: a sale is never called a timeout once it is stored.
async fn commit(staged: StagedCheckout) -> CheckoutResult<CommittedTransaction> {
    let StagedCheckout { uow, committed } = staged;

    tokio::spawn(uow.commit())
        .await
        .map_err(|e| CheckoutError::PersistenceFailure {
            message: format!("commit task ended abnormally: {e}"),
            transient: false,
        })??;

    let tx = &committed.transaction;
    info!(
        transaction_id = %tx.id,
        receipt_number = %tx.receipt_number,
        total = %tx.total_amount,
        items = committed.line_items.len(),
        restricted = tx.age_verification_required,
        "Transaction committed"
    );

    Ok(committed)
}

/// Redeem, earn, spend and tier for the attached customer.
async fn apply_customer_updates(
    uow: &mut UnitOfWork,
    customer: &Customer,
    transaction: &Transaction,
    accrual: Option<LoyaltyAccrual>,
    redeem_points: Option<i64>,
) -> CheckoutResult<Customer> {
    let not_found = || CheckoutError::CustomerNotFound(customer.id.clone());

    if let Some(points) = redeem_points {
        let redemption = LoyaltyMutation::RedeemPoints { amount: points };
        if !uow.apply_loyalty(&customer.id, &redemption).await? {
            let available = uow
                .get_customer(&customer.id)
                .await?
                .ok_or_else(not_found)?
                .loyalty_points;
            return Err(CheckoutError::InsufficientPoints {
                requested: points,
                available,
            });
        }
    }

    if let Some(earn) = accrual.and_then(|a| a.mutation()) {
        if !uow.apply_loyalty(&customer.id, &earn).await? {
            return Err(not_found());
        }
    }

    let total_spent = uow
        .record_purchase(&customer.id, transaction.subtotal, transaction.created_at)
        .await
        .map_err(|e| match e {
            DbError::NotFound { .. } => not_found(),
            other => other.into(),
        })?;
    let tier = tier_for(total_spent);
    uow.set_tier(&customer.id, tier).await?;

    if tier != customer.loyalty_tier {
        info!(customer_id = %customer.id, from = %customer.loyalty_tier, to = %tier, "Loyalty tier changed");
    }

    uow.get_customer(&customer.id).await?.ok_or_else(not_found)
}

/// `R{yymmddHHMMSS}-{6 base36}`, e.g. `R250601143005-7QK2ZD`.
fn generate_receipt_number(at: DateTime<Utc>) -> String {
    let mut rng = rand::rng();
    let suffix: String = (0..RECEIPT_SUFFIX_LEN)
        .map(|_| BASE36[rng.random_range(0..BASE36.len())] as char)
        .collect();
    format!("R{}-{}", at.format("%y%m%d%H%M%S"), suffix)
}

// =============================================================================
// Unit Tests
// =============================================================================
