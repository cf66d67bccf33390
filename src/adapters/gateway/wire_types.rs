//! Gateway REST wire types.
//!
//! Only fields relevant to our processing are captured; unknown fields are
//! ignored. Amounts travel as decimal currency units.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::domain::billing::{BillingMethod, PaymentStatus};
use crate::ports::{
    BillingCycle, CreateCustomerRequest, CreateSubscriptionRequest, GatewayPayment,
    GatewaySubscription,
};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerBody {
    pub name: String,
    pub cpf_cnpj: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile_phone: Option<String>,
    pub postal_code: String,
    pub address: String,
    pub address_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complement: Option<String>,
    pub city_name: String,
    pub external_reference: String,
}

impl From<CreateCustomerRequest> for CustomerBody {
    fn from(request: CreateCustomerRequest) -> Self {
        let profile = request.profile;
        Self {
            name: profile.name,
            cpf_cnpj: profile.document,
            email: profile.email.to_string(),
            mobile_phone: profile.phone,
            postal_code: profile.address.postal_code,
            address: profile.address.street,
            address_number: profile.address.number,
            complement: profile.address.complement,
            city_name: profile.address.city,
            external_reference: request.external_reference,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomerResponse {
    pub id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionBody {
    pub customer: String,
    pub billing_type: &'static str,
    pub value: f64,
    pub next_due_date: NaiveDate,
    pub cycle: &'static str,
    pub description: String,
    pub external_reference: String,
}

impl From<CreateSubscriptionRequest> for SubscriptionBody {
    fn from(request: CreateSubscriptionRequest) -> Self {
        Self {
            customer: request.customer_id,
            billing_type: billing_type(request.billing_method),
            value: cents_to_units(request.value_cents),
            next_due_date: request.next_due_date,
            cycle: match request.cycle {
                BillingCycle::Monthly => "MONTHLY",
            },
            description: request.description,
            external_reference: request.external_reference,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionResponse {
    pub id: String,
    pub customer: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub checkout_url: Option<String>,
    #[serde(default)]
    pub next_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

impl SubscriptionResponse {
    pub fn into_domain(self, first_payment_id: Option<String>) -> GatewaySubscription {
        GatewaySubscription {
            id: self.id,
            customer_id: self.customer,
            status: self.status.unwrap_or_default(),
            checkout_url: self.checkout_url,
            next_due_date: self.next_due_date,
            first_payment_id,
            external_reference: self.external_reference,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub id: String,
    pub customer: String,
    #[serde(default)]
    pub subscription: Option<String>,
    pub status: String,
    pub billing_type: String,
    pub value: f64,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub external_reference: Option<String>,
}

impl From<PaymentResponse> for GatewayPayment {
    fn from(payment: PaymentResponse) -> Self {
        GatewayPayment {
            id: payment.id,
            customer_id: payment.customer,
            subscription_id: payment.subscription,
            status: PaymentStatus::from_gateway(&payment.status),
            billing_method: BillingMethod::from_gateway(&payment.billing_type),
            value_cents: (payment.value * 100.0).round() as i64,
            due_date: payment.due_date,
            external_reference: payment.external_reference,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentListResponse {
    #[serde(default)]
    pub data: Vec<PaymentResponse>,
}

/// Error body: `{ "errors": [{ "code": "...", "description": "..." }] }`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorResponse {
    #[serde(default)]
    pub errors: Vec<ErrorItem>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorItem {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl ErrorResponse {
    pub fn first_code(&self) -> Option<&str> {
        self.errors.iter().find_map(|e| e.code.as_deref())
    }

    pub fn describe(&self) -> String {
        let parts: Vec<&str> = self
            .errors
            .iter()
            .filter_map(|e| e.description.as_deref())
            .collect();
        parts.join("; ")
    }
}

fn billing_type(method: BillingMethod) -> &'static str {
    match method {
        BillingMethod::CreditCard => "CREDIT_CARD",
        BillingMethod::BankSlip => "BOLETO",
        BillingMethod::InstantTransfer => "PIX",
        BillingMethod::Undefined => "UNDEFINED",
    }
}

fn cents_to_units(cents: i64) -> f64 {
    cents as f64 / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn payment_response_maps_to_domain() {
        let raw: PaymentResponse = serde_json::from_value(json!({
            "id": "pay_1",
            "customer": "cus_1",
            "subscription": "sub_1",
            "status": "RECEIVED",
            "billingType": "PIX",
            "value": 19.9,
            "dueDate": "2024-03-10",
            "unknownField": 1
        }))
        .unwrap();

        let payment: GatewayPayment = raw.into();
        assert_eq!(payment.status, PaymentStatus::Received);
        assert_eq!(payment.billing_method, BillingMethod::InstantTransfer);
        assert_eq!(payment.value_cents, 1_990);
        assert!(payment.is_paid());
    }

    #[test]
    fn subscription_body_uses_gateway_vocabulary() {
        let body = SubscriptionBody::from(CreateSubscriptionRequest {
            customer_id: "cus_1".into(),
            value_cents: 4_990,
            cycle: BillingCycle::Monthly,
            next_due_date: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            billing_method: BillingMethod::BankSlip,
            description: "Plan".into(),
            external_reference: "acc".into(),
        });
        let value = serde_json::to_value(&body).unwrap();

        assert_eq!(value["billingType"], "BOLETO");
        assert_eq!(value["cycle"], "MONTHLY");
        assert_eq!(value["value"], 49.9);
        assert_eq!(value["nextDueDate"], "2024-05-01");
    }

    #[test]
    fn error_response_joins_descriptions() {
        let err: ErrorResponse = serde_json::from_value(json!({
            "errors": [
                {"code": "invalid_cpfCnpj", "description": "bad document"},
                {"description": "bad zip"}
            ]
        }))
        .unwrap();
        assert_eq!(err.first_code(), Some("invalid_cpfCnpj"));
        assert_eq!(err.describe(), "bad document; bad zip");
    }
}
