//! Shared fixtures for billing handler tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::adapters::gateway::MockGatewayClient;
use crate::adapters::memory::{InMemoryAccountStore, InMemorySeatStore};
use crate::application::account_writer::{AccountLocks, AccountWriter};
use crate::domain::billing::{
    Account, BillingAddress, BillingMethod, BillingProfile, Pricing, SeatCandidate,
    SubscriptionStatus,
};
use crate::domain::foundation::{AccountId, CandidateId, DomainError, Email, ErrorCode};
use crate::ports::{
    AccountStore, BillingCycle, CreateCustomerRequest, CreateSubscriptionRequest, GatewayClient,
    IdentityProvider, PaymentNotifier,
};

use super::SeatCounter;

static EMAIL_SEQ: AtomicUsize = AtomicUsize::new(0);

pub fn pricing() -> Pricing {
    Pricing {
        base_price_cents: 4_990,
        per_seat_price_cents: 1_990,
    }
}

pub fn billing_profile() -> BillingProfile {
    BillingProfile::new(
        "Owner Example",
        "123.456.789-09",
        "owner@example.com",
        Some("+55 11 99999-0000".to_string()),
        BillingAddress {
            postal_code: "01310-100".to_string(),
            street: "Av. Paulista".to_string(),
            number: "1000".to_string(),
            complement: None,
            city: "Sao Paulo".to_string(),
        },
    )
    .unwrap()
}

pub fn candidate(n: u32) -> SeatCandidate {
    SeatCandidate::new(
        format!("cand-{}", n),
        format!("seat{}@example.com", n),
        format!("Seat {}", n),
    )
    .unwrap()
}

pub struct Fixture {
    pub accounts: Arc<InMemoryAccountStore>,
    pub seats: Arc<InMemorySeatStore>,
    pub gateway: Arc<MockGatewayClient>,
    pub locks: AccountLocks,
}

impl Fixture {
    pub fn new() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountStore::new()),
            seats: Arc::new(InMemorySeatStore::new()),
            gateway: Arc::new(MockGatewayClient::new()),
            locks: AccountLocks::new(),
        }
    }

    pub fn writer(&self) -> AccountWriter {
        AccountWriter::new(self.accounts.clone(), self.locks.clone())
    }

    pub fn seat_counter(&self) -> SeatCounter {
        SeatCounter::new(self.seats.clone(), self.writer())
    }

    /// A freshly registered trial account.
    pub async fn account(&self) -> Account {
        let n = EMAIL_SEQ.fetch_add(1, Ordering::SeqCst);
        let account = Account::register(
            AccountId::new(),
            Email::parse(format!("owner{}@example.com", n)).unwrap(),
        );
        self.accounts.insert(&account).await.unwrap();
        account
    }

    /// An active account whose primary plan exists at the gateway.
    pub async fn primary_account(&self) -> Account {
        let mut account = self.account().await;
        let customer = self
            .gateway
            .create_customer(CreateCustomerRequest {
                profile: billing_profile(),
                external_reference: account.id.to_string(),
            })
            .await
            .unwrap();
        let subscription = self
            .gateway
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer.id.clone(),
                value_cents: pricing().base_price_cents,
                cycle: BillingCycle::Monthly,
                next_due_date: chrono::Utc::now().date_naive(),
                billing_method: BillingMethod::CreditCard,
                description: "primary".to_string(),
                external_reference: account.id.to_string(),
            })
            .await
            .unwrap();

        account.external_customer_id = Some(customer.id);
        account.external_subscription_id = Some(subscription.id);
        account.status = SubscriptionStatus::Active;
        account.version = self.accounts.update(&account).await.unwrap();
        account
    }

    pub async fn stored(&self, id: &AccountId) -> Account {
        self.accounts.find_by_id(id).await.unwrap().unwrap()
    }
}

#[derive(Default)]
pub struct RecordingIdentityProvider {
    deleted: Mutex<Vec<CandidateId>>,
}

impl RecordingIdentityProvider {
    pub fn deleted(&self) -> Vec<CandidateId> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl IdentityProvider for RecordingIdentityProvider {
    async fn delete_identity(&self, identity_id: &CandidateId) -> Result<(), DomainError> {
        self.deleted.lock().unwrap().push(identity_id.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    notified: Mutex<Vec<AccountId>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self {
            notified: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn notified(&self) -> Vec<AccountId> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentNotifier for RecordingNotifier {
    async fn payment_confirmed(&self, account: &Account) -> Result<(), DomainError> {
        self.notified.lock().unwrap().push(account.id);
        if self.fail {
            return Err(DomainError::new(ErrorCode::InternalError, "mail server down"));
        }
        Ok(())
    }
}
