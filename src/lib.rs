pub mod api;
pub mod billing;
pub mod db;
pub mod docs;
pub mod error;
pub mod models;
pub mod prompts;

use sqlx::PgPool;

use crate::api::grok_client::GrokClient;
use crate::api::paypal_client::PayPalClient;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub grok: GrokClient,
    pub paypal: PayPalClient,
    pub paypal_webhook_id: Option<String>,
    pub paypal_plan_id: Option<String>,
    pub app_base_url: String,
    pub jwt_secret: String,
}
