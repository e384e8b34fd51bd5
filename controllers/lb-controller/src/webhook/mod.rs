//! Validating admission webhook for the load-balancer resource kinds.

mod server;
mod validators;


pub use server::{WebhookState, serve};
pub use validators::Validators;
