//! Billing profile supplied at checkout.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Email, ValidationError};

/// Postal address used for invoicing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingAddress {
    pub postal_code: String,
    pub street: String,
    pub number: String,
    pub complement: Option<String>,
    pub city: String,
}

/// Who pays: everything the gateway needs to create a customer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingProfile {
    pub name: String,
    /// Tax document, digits only (11 for individuals, 14 for companies).
    pub document: String,
    pub email: Email,
    pub phone: Option<String>,
    pub address: BillingAddress,
}

impl BillingProfile {
    /// Builds a validated profile. The document is stripped to its digits.
    pub fn new(
        name: impl Into<String>,
        document: impl AsRef<str>,
        email: impl AsRef<str>,
        phone: Option<String>,
        address: BillingAddress,
    ) -> Result<Self, ValidationError> {
        let name = name.into().trim().to_string();
        if name.is_empty() {
            return Err(ValidationError::empty_field("name"));
        }

        let document: String = document
            .as_ref()
            .chars()
            .filter(char::is_ascii_digit)
            .collect();
        if document.len() != 11 && document.len() != 14 {
            return Err(ValidationError::invalid_format(
                "document",
                "expected 11 or 14 digits",
            ));
        }

        let phone = phone
            .map(|p| p.chars().filter(char::is_ascii_digit).collect::<String>())
            .filter(|p| !p.is_empty());

        for (field, value) in [
            ("address.postal_code", &address.postal_code),
            ("address.street", &address.street),
            ("address.number", &address.number),
            ("address.city", &address.city),
        ] {
            if value.trim().is_empty() {
                return Err(ValidationError::empty_field(field));
            }
        }

        Ok(Self {
            name,
            document,
            email: Email::parse(email)?,
            phone,
            address,
        })
    }
}
