pub mod advice;
pub mod auth;
pub mod grok_client;
pub mod paypal_client;
pub mod subscriptions;
pub mod webhooks_paypal;
