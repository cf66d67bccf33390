//! E-mail adapters.

mod resend_notifier;

pub use resend_notifier::{ResendConfig, ResendNotifier};
