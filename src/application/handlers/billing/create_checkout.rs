//! CreateCheckoutHandler - provisions gateway billing for an account.
//!
//! Provisioning is a saga: each step that creates something pushes the
//! action that undoes it, and a failure runs the collected actions in
//! reverse. What gets collected depends on whether this is the account's
//! first checkout:
//!
//! - first checkout: delete the gateway customer, the local account and the
//!   login identity, then answer `RegistrationRolledBack`
//! - later checkout: only clear the customer id created by this call, then
//!   answer `CheckoutFailed`
//!
//! A gateway timeout never triggers compensation; it is reported as a
//! retryable `GatewayUnavailable` and the caller retries.

use std::sync::Arc;

use crate::application::account_writer::AccountWriter;
use crate::domain::billing::{BillingError, BillingMethod, BillingProfile, Pricing};
use crate::domain::foundation::{AccountId, CandidateId, DomainError, Timestamp};
use crate::ports::{
    BillingCycle, CreateCustomerRequest, CreateSubscriptionRequest, GatewayClient, GatewayError,
    IdentityProvider,
};

#[derive(Debug, Clone)]
pub struct CreateCheckoutCommand {
    pub account_id: AccountId,
    pub profile: BillingProfile,
    pub billing_method: BillingMethod,
    /// Login identity created at sign-up. Removed on first-checkout rollback.
    pub identity_id: Option<CandidateId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutResult {
    pub checkout_url: String,
    pub external_checkout_id: String,
    pub customer_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Compensation {
    DeleteIdentity(CandidateId),
    DeleteLocalAccount(AccountId),
    DeleteGatewayCustomer(String),
    ClearCustomerId {
        account_id: AccountId,
        customer_id: String,
    },
    CancelGatewaySubscription(String),
}

enum StepError {
    /// Client-side timeout. Retry, don't compensate.
    Timeout(GatewayError),
    Failed(BillingError),
}

impl From<GatewayError> for StepError {
    fn from(err: GatewayError) -> Self {
        if err.is_timeout() {
            StepError::Timeout(err)
        } else {
            StepError::Failed(err.into())
        }
    }
}

impl From<BillingError> for StepError {
    fn from(err: BillingError) -> Self {
        StepError::Failed(err)
    }
}

impl From<DomainError> for StepError {
    fn from(err: DomainError) -> Self {
        StepError::Failed(err.into())
    }
}

pub struct CreateCheckoutHandler {
    writer: AccountWriter,
    gateway: Arc<dyn GatewayClient>,
    identity: Option<Arc<dyn IdentityProvider>>,
    pricing: Pricing,
}

impl CreateCheckoutHandler {
    pub fn new(writer: AccountWriter, gateway: Arc<dyn GatewayClient>, pricing: Pricing) -> Self {
        Self {
            writer,
            gateway,
            identity: None,
            pricing,
        }
    }

    pub fn with_identity_provider(mut self, identity: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(identity);
        self
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutCommand,
    ) -> Result<CreateCheckoutResult, BillingError> {
        let account = self
            .writer
            .store()
            .find_by_id(&cmd.account_id)
            .await?
            .ok_or_else(|| BillingError::not_found("account", cmd.account_id))?;

        let first_checkout = account.is_first_checkout();
        let mut compensations = Vec::new();

        let failure = match self
            .provision(&cmd, account.external_customer_id.clone(), first_checkout, &mut compensations)
            .await
        {
            Ok(result) => {
                tracing::info!(
                    account_id = %cmd.account_id,
                    checkout_id = %result.external_checkout_id,
                    first_checkout,
                    "Checkout created"
                );
                return Ok(result);
            }
            Err(failure) => failure,
        };

        match failure {
            StepError::Timeout(err) => {
                tracing::warn!(
                    account_id = %cmd.account_id,
                    error = %err,
                    "Checkout timed out at the gateway; leaving state for retry"
                );
                Err(err.into())
            }
            StepError::Failed(err) if first_checkout && compensations.is_empty() => {
                // Nothing was provisioned yet, so there is nothing to roll back.
                tracing::warn!(account_id = %cmd.account_id, error = %err, "Checkout failed before provisioning");
                Err(err)
            }
            StepError::Failed(err) => {
                tracing::warn!(
                    account_id = %cmd.account_id,
                    error = %err,
                    first_checkout,
                    steps = compensations.len(),
                    "Checkout failed, compensating"
                );
                self.compensate(compensations).await;

                let reason = err.to_string();
                if first_checkout {
                    Err(BillingError::RegistrationRolledBack { reason })
                } else {
                    Err(BillingError::CheckoutFailed { reason })
                }
            }
        }
    }

    async fn provision(
        &self,
        cmd: &CreateCheckoutCommand,
        existing_customer: Option<String>,
        first_checkout: bool,
        compensations: &mut Vec<Compensation>,
    ) -> Result<CreateCheckoutResult, StepError> {
        let account_id = cmd.account_id;

        // 1. Gateway customer
        let customer_id = match existing_customer {
            Some(id) => id,
            None => {
                let customer = self
                    .gateway
                    .create_customer(CreateCustomerRequest {
                        profile: cmd.profile.clone(),
                        external_reference: account_id.to_string(),
                    })
                    .await?;

                if first_checkout {
                    if let Some(identity_id) = &cmd.identity_id {
                        compensations.push(Compensation::DeleteIdentity(identity_id.clone()));
                    }
                    compensations.push(Compensation::DeleteLocalAccount(account_id));
                    compensations.push(Compensation::DeleteGatewayCustomer(customer.id.clone()));
                } else {
                    compensations.push(Compensation::ClearCustomerId {
                        account_id,
                        customer_id: customer.id.clone(),
                    });
                }

                let linked = self
                    .writer
                    .modify(account_id, |account| account.link_customer(&customer.id))
                    .await?;
                if !linked.value {
                    return Err(BillingError::inconsistent(format!(
                        "account {} was linked to another customer concurrently",
                        account_id
                    ))
                    .into());
                }
                customer.id
            }
        };

        // 2. Recurring checkout
        let subscription = self
            .gateway
            .create_subscription(CreateSubscriptionRequest {
                customer_id: customer_id.clone(),
                value_cents: self.pricing.base_price_cents,
                cycle: BillingCycle::Monthly,
                next_due_date: Timestamp::now().date(),
                billing_method: cmd.billing_method,
                description: "Monthly subscription".to_string(),
                external_reference: account_id.to_string(),
            })
            .await?;
        compensations.push(Compensation::CancelGatewaySubscription(subscription.id.clone()));

        let checkout_url = subscription.checkout_url.clone().ok_or_else(|| {
            BillingError::inconsistent(format!(
                "gateway returned subscription {} without a checkout url",
                subscription.id
            ))
        })?;

        // 3. Plan tag, re-derived from the seat count. Status stays where the
        //    state machine has it; a fresh account is already in trial.
        self.writer
            .modify(account_id, |account| {
                let seats = account.seat_count;
                account.sync_seats(seats)
            })
            .await?;

        Ok(CreateCheckoutResult {
            checkout_url,
            external_checkout_id: subscription.id,
            customer_id,
        })
    }

    async fn compensate(&self, compensations: Vec<Compensation>) {
        for step in compensations.into_iter().rev() {
            if let Err(error) = self.run_compensation(&step).await {
                tracing::error!(step = ?step, error = %error, "Compensating action failed");
            } else {
                tracing::info!(step = ?step, "Compensating action applied");
            }
        }
    }

    async fn run_compensation(&self, step: &Compensation) -> Result<(), String> {
        match step {
            Compensation::CancelGatewaySubscription(id) => self
                .gateway
                .cancel_subscription(id)
                .await
                .map_err(|e| e.to_string()),
            Compensation::DeleteGatewayCustomer(id) => self
                .gateway
                .delete_customer(id)
                .await
                .map_err(|e| e.to_string()),
            Compensation::DeleteLocalAccount(account_id) => {
                let _guard = self.writer.locks().lock(*account_id).await;
                self.writer
                    .store()
                    .delete(account_id)
                    .await
                    .map_err(|e| e.to_string())
            }
            Compensation::DeleteIdentity(identity_id) => match &self.identity {
                Some(identity) => identity
                    .delete_identity(identity_id)
                    .await
                    .map_err(|e| e.to_string()),
                None => Err("no identity provider configured".to_string()),
            },
            Compensation::ClearCustomerId {
                account_id,
                customer_id,
            } => self
                .writer
                .modify(*account_id, |account| {
                    if account.external_customer_id.as_deref() == Some(customer_id.as_str()) {
                        account.external_customer_id = None;
                        account.updated_at = Timestamp::now();
                    }
                })
                .await
                .map(|_| ())
                .map_err(|e| e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gateway::MockGatewayClient;
    use crate::application::handlers::billing::test_support::{
        billing_profile, pricing, Fixture, RecordingIdentityProvider,
    };
    use crate::domain::billing::{Account, SubscriptionStatus};
    use crate::ports::{AccountStore, GatewayErrorCode};

    fn handler(fixture: &Fixture, identity: Arc<RecordingIdentityProvider>) -> CreateCheckoutHandler {
        CreateCheckoutHandler::new(fixture.writer(), fixture.gateway.clone(), pricing())
            .with_identity_provider(identity)
    }

    fn command(account: &Account) -> CreateCheckoutCommand {
        CreateCheckoutCommand {
            account_id: account.id,
            profile: billing_profile(),
            billing_method: BillingMethod::CreditCard,
            identity_id: Some(CandidateId::new("identity-1").unwrap()),
        }
    }

    #[tokio::test]
    async fn first_checkout_links_customer_and_returns_url() {
        let fixture = Fixture::new();
        let account = fixture.account().await;
        let identity = Arc::new(RecordingIdentityProvider::default());

        let result = handler(&fixture, identity.clone())
            .handle(command(&account))
            .await
            .unwrap();

        assert!(result.checkout_url.contains(&result.external_checkout_id));
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.external_customer_id, Some(result.customer_id));
        assert_eq!(stored.external_subscription_id, None);
        assert_eq!(stored.status, SubscriptionStatus::Trial);
        assert!(identity.deleted().is_empty());
    }

    #[tokio::test]
    async fn first_checkout_failure_rolls_back_everything() {
        let fixture = Fixture::new();
        let account = fixture.account().await;
        let identity = Arc::new(RecordingIdentityProvider::default());
        fixture
            .gateway
            .set_method_error("create_subscription", GatewayError::rejected("invalid document"));

        let err = handler(&fixture, identity.clone())
            .handle(command(&account))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::RegistrationRolledBack { .. }));
        assert!(fixture.accounts.find_by_id(&account.id).await.unwrap().is_none());
        assert_eq!(fixture.gateway.customer_count(), 0);
        assert_eq!(fixture.gateway.deleted_customers().len(), 1);
        assert_eq!(identity.deleted(), vec![CandidateId::new("identity-1").unwrap()]);
    }

    #[tokio::test]
    async fn repeat_checkout_failure_only_clears_fresh_customer_id() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        account.external_subscription_id = Some("sub_old".to_string());
        account.status = SubscriptionStatus::Active;
        account.version = fixture.accounts.update(&account).await.unwrap();
        fixture
            .gateway
            .set_method_error("create_subscription", GatewayError::rejected("declined"));
        let identity = Arc::new(RecordingIdentityProvider::default());

        let err = handler(&fixture, identity.clone())
            .handle(command(&account))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::CheckoutFailed { .. }));
        assert!(err.is_retryable());
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.external_customer_id, None);
        assert_eq!(stored.external_subscription_id, Some("sub_old".to_string()));
        assert_eq!(stored.status, SubscriptionStatus::Active);
        assert!(fixture.gateway.deleted_customers().is_empty());
        assert!(identity.deleted().is_empty());
    }

    #[tokio::test]
    async fn repeat_checkout_keeps_existing_customer() {
        let fixture = Fixture::new();
        let mut account = fixture.account().await;
        let customer = fixture
            .gateway
            .create_customer(CreateCustomerRequest {
                profile: billing_profile(),
                external_reference: account.id.to_string(),
            })
            .await
            .unwrap();
        account.external_customer_id = Some(customer.id.clone());
        fixture.accounts.update(&account).await.unwrap();
        fixture
            .gateway
            .set_method_error("create_subscription", GatewayError::rejected("declined"));

        let err = handler(&fixture, Arc::new(RecordingIdentityProvider::default()))
            .handle(command(&account))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::CheckoutFailed { .. }));
        let stored = fixture.stored(&account.id).await;
        assert_eq!(stored.external_customer_id, Some(customer.id));
    }

    #[tokio::test]
    async fn timeout_is_retryable_and_not_compensated() {
        let fixture = Fixture::new();
        let account = fixture.account().await;
        fixture
            .gateway
            .set_method_error("create_subscription", GatewayError::timeout("create_subscription timed out"));

        let err = handler(&fixture, Arc::new(RecordingIdentityProvider::default()))
            .handle(command(&account))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::GatewayUnavailable { retryable: true, .. }));
        let stored = fixture.stored(&account.id).await;
        assert!(stored.external_customer_id.is_some());
        assert!(!fixture.gateway.was_called("delete_customer"));
    }

    #[tokio::test]
    async fn customer_creation_failure_leaves_account_alone() {
        let fixture = Fixture::new();
        let account = fixture.account().await;
        fixture.gateway.set_method_error(
            "create_customer",
            GatewayError::new(GatewayErrorCode::ProviderError, "gateway down"),
        );

        let err = handler(&fixture, Arc::new(RecordingIdentityProvider::default()))
            .handle(command(&account))
            .await
            .unwrap_err();

        assert!(matches!(err, BillingError::GatewayUnavailable { .. }));
        assert!(fixture.accounts.find_by_id(&account.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unknown_account_is_not_found() {
        let fixture = Fixture::new();
        let ghost = Account::register(
            AccountId::new(),
            crate::domain::foundation::Email::parse("ghost@example.com").unwrap(),
        );

        let err = CreateCheckoutHandler::new(
            fixture.writer(),
            Arc::new(MockGatewayClient::new()),
            pricing(),
        )
        .handle(command(&ghost))
        .await
        .unwrap_err();

        assert!(matches!(err, BillingError::NotFound { .. }));
    }
}
