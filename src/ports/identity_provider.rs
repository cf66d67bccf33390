//! Identity provider port.
//!
//! Only the registration rollback needs it: a first checkout that fails
//! after provisioning removes the login identity created at sign-up.

use crate::domain::foundation::{CandidateId, DomainError};
use async_trait::async_trait;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Delete the identity. Deleting an unknown identity succeeds.
    async fn delete_identity(&self, identity_id: &CandidateId) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_provider_is_object_safe() {
        fn _accepts_dyn(_provider: &dyn IdentityProvider) {}
    }
}
