// src/models.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Serialize, ToSchema)]
pub struct Subscription {
    pub id: i32,
    pub user_id: i32,
    pub tier: String,   // free | premium
    pub status: String, // pending | active | cancelled | expired
    pub paypal_subscription_id: Option<String>,
    pub paypal_payer_id: Option<String>,
    pub current_period_start: Option<DateTime<Utc>>,
    pub current_period_end: Option<DateTime<Utc>>,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Payment {
    pub id: i32,
    pub user_id: i32,
    pub amount: String,
    pub currency: String,
    pub status: String, // completed | refunded
    pub provider: String,
    pub provider_transaction_id: String,
    pub payment_type: String,
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AiUsage {
    pub id: i32,
    pub user_id: i32,
    pub request_type: String,
    pub tokens_input: i32,
    pub tokens_output: i32,
    pub cost_estimate: f64,
    pub created_at: Option<DateTime<Utc>>,
}

/// Snapshot of a user's AI quota for the current calendar month.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuotaInfo {
    pub tier: String,
    pub quota_limit: i64,
    pub usage_count: i64,
    pub remaining: i64,
    pub reset_date: DateTime<Utc>,
}
