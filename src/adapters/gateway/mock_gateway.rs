//! Mock payment gateway for testing.
//!
//! In-memory implementation of `GatewayClient` for unit and integration
//! tests. Supports:
//! - A small customer/subscription/payment "database"
//! - Error injection, per method or for the next call
//! - Call tracking

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::domain::billing::{BillingMethod, PaymentStatus};
use crate::ports::{
    CreateCustomerRequest, CreateSubscriptionRequest, GatewayClient, GatewayCustomer,
    GatewayError, GatewayPayment, GatewaySubscription,
};

/// Mock gateway for testing.
///
/// # Example
///
/// ```ignore
/// let gateway = MockGatewayClient::new();
///
/// // Inject errors
/// gateway.set_method_error("create_subscription", GatewayError::timeout("slow"));
///
/// // Settle the first charge of a subscription
/// gateway.set_payment_status(&payment_id, PaymentStatus::Confirmed);
/// ```
#[derive(Default, Clone)]
pub struct MockGatewayClient {
    inner: Arc<Mutex<MockState>>,
}

#[derive(Default)]
struct MockState {
    customers: HashMap<String, CreateCustomerRequest>,
    subscriptions: HashMap<String, GatewaySubscription>,
    payments: HashMap<String, GatewayPayment>,
    canceled_subscriptions: Vec<String>,
    deleted_customers: Vec<String>,
    next_error: Option<GatewayError>,
    method_errors: HashMap<String, GatewayError>,
    call_log: Vec<MethodCall>,
    sequence: u64,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

impl MockGatewayClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Add a subscription to the "database".
    pub fn add_subscription(&self, subscription: GatewaySubscription) {
        self.state()
            .subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Add a payment to the "database".
    pub fn add_payment(&self, payment: GatewayPayment) {
        self.state().payments.insert(payment.id.clone(), payment);
    }

    /// Change the status of a known payment.
    pub fn set_payment_status(&self, payment_id: &str, status: PaymentStatus) {
        if let Some(payment) = self.state().payments.get_mut(payment_id) {
            payment.status = status;
        }
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: GatewayError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for a specific method until cleared.
    pub fn set_method_error(&self, method: &str, error: GatewayError) {
        self.state()
            .method_errors
            .insert(method.to_string(), error);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Inspection
    // ════════════════════════════════════════════════════════════════════════════

    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    pub fn customer_exists(&self, customer_id: &str) -> bool {
        self.state().customers.contains_key(customer_id)
    }

    pub fn customer_count(&self) -> usize {
        self.state().customers.len()
    }

    pub fn deleted_customers(&self) -> Vec<String> {
        self.state().deleted_customers.clone()
    }

    pub fn canceled_subscriptions(&self) -> Vec<String> {
        self.state().canceled_subscriptions.clone()
    }

    /// The subscription created with the given external reference, if any.
    pub fn subscription_by_reference(&self, reference: &str) -> Option<GatewaySubscription> {
        self.state()
            .subscriptions
            .values()
            .find(|s| s.external_reference.as_deref() == Some(reference))
            .cloned()
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn record_call(&self, method: &str, args: Vec<String>) {
        self.state().call_log.push(MethodCall {
            method: method.to_string(),
            args,
        });
    }

    fn check_error(&self, method: &str) -> Result<(), GatewayError> {
        let mut state = self.state();

        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }

    fn next_id(state: &mut MockState, prefix: &str) -> String {
        state.sequence += 1;
        format!("{}_mock_{}", prefix, state.sequence)
    }
}

#[async_trait]
impl GatewayClient for MockGatewayClient {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<GatewayCustomer, GatewayError> {
        self.record_call(
            "create_customer",
            vec![request.external_reference.clone(), request.profile.email.to_string()],
        );
        self.check_error("create_customer")?;

        let mut state = self.state();
        let id = Self::next_id(&mut state, "cus");
        state.customers.insert(id.clone(), request);
        Ok(GatewayCustomer { id })
    }

    async fn delete_customer(&self, customer_id: &str) -> Result<(), GatewayError> {
        self.record_call("delete_customer", vec![customer_id.to_string()]);
        self.check_error("delete_customer")?;

        let mut state = self.state();
        state
            .customers
            .remove(customer_id)
            .ok_or_else(|| GatewayError::not_found("Customer"))?;
        state.deleted_customers.push(customer_id.to_string());
        Ok(())
    }

    async fn create_subscription(
        &self,
        request: CreateSubscriptionRequest,
    ) -> Result<GatewaySubscription, GatewayError> {
        self.record_call(
            "create_subscription",
            vec![
                request.customer_id.clone(),
                request.value_cents.to_string(),
                request.external_reference.clone(),
            ],
        );
        self.check_error("create_subscription")?;

        let mut state = self.state();
        if !state.customers.contains_key(&request.customer_id) {
            return Err(GatewayError::not_found("Customer"));
        }

        let subscription_id = Self::next_id(&mut state, "sub");
        let payment_id = Self::next_id(&mut state, "pay");

        let payment = GatewayPayment {
            id: payment_id.clone(),
            customer_id: request.customer_id.clone(),
            subscription_id: Some(subscription_id.clone()),
            status: PaymentStatus::Pending,
            billing_method: request.billing_method,
            value_cents: request.value_cents,
            due_date: Some(request.next_due_date),
            external_reference: Some(request.external_reference.clone()),
        };
        let subscription = GatewaySubscription {
            id: subscription_id.clone(),
            customer_id: request.customer_id,
            status: "ACTIVE".to_string(),
            checkout_url: Some(format!("https://gateway.test/checkout/{}", subscription_id)),
            next_due_date: Some(request.next_due_date),
            first_payment_id: Some(payment_id.clone()),
            external_reference: Some(request.external_reference),
        };

        state.payments.insert(payment_id, payment);
        state
            .subscriptions
            .insert(subscription_id, subscription.clone());
        Ok(subscription)
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<GatewaySubscription>, GatewayError> {
        self.record_call("get_subscription", vec![subscription_id.to_string()]);
        self.check_error("get_subscription")?;

        Ok(self.state().subscriptions.get(subscription_id).cloned())
    }

    async fn list_subscription_payments(
        &self,
        subscription_id: &str,
    ) -> Result<Vec<GatewayPayment>, GatewayError> {
        self.record_call(
            "list_subscription_payments",
            vec![subscription_id.to_string()],
        );
        self.check_error("list_subscription_payments")?;

        let state = self.state();
        let mut payments: Vec<GatewayPayment> = state
            .payments
            .values()
            .filter(|p| p.subscription_id.as_deref() == Some(subscription_id))
            .cloned()
            .collect();
        payments.sort_by(|a, b| b.due_date.cmp(&a.due_date).then_with(|| b.id.cmp(&a.id)));
        Ok(payments)
    }

    async fn get_payment(&self, payment_id: &str) -> Result<Option<GatewayPayment>, GatewayError> {
        self.record_call("get_payment", vec![payment_id.to_string()]);
        self.check_error("get_payment")?;

        Ok(self.state().payments.get(payment_id).cloned())
    }

    async fn cancel_subscription(&self, subscription_id: &str) -> Result<(), GatewayError> {
        self.record_call("cancel_subscription", vec![subscription_id.to_string()]);
        self.check_error("cancel_subscription")?;

        let mut state = self.state();
        let subscription = state
            .subscriptions
            .get_mut(subscription_id)
            .ok_or_else(|| GatewayError::not_found("Subscription"))?;
        subscription.status = "CANCELED".to_string();
        state
            .canceled_subscriptions
            .push(subscription_id.to_string());
        Ok(())
    }
}

/// Convenience for tests that need a settled card payment.
pub fn paid_card_payment(id: &str, customer_id: &str, subscription_id: Option<&str>) -> GatewayPayment {
    GatewayPayment {
        id: id.to_string(),
        customer_id: customer_id.to_string(),
        subscription_id: subscription_id.map(str::to_string),
        status: PaymentStatus::Confirmed,
        billing_method: BillingMethod::CreditCard,
        value_cents: 4_990,
        due_date: None,
        external_reference: None,
    }
}
