//! Identity provider adapters.

mod zitadel;

pub use zitadel::{ZitadelConfig, ZitadelIdentityProvider};
