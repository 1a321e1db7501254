// src/db.rs

use chrono::{DateTime, Utc};
use serde_json::json;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use crate::models::{AiUsage, Subscription};

const SUBSCRIPTION_COLUMNS: &str = "id, user_id, tier, status, paypal_subscription_id, \
     paypal_payer_id, current_period_start, current_period_end, metadata, created_at, updated_at";

fn subscription_from_row(r: &PgRow) -> Subscription {
    Subscription {
        id: r.get("id"),
        user_id: r.get("user_id"),
        tier: r.get("tier"),
        status: r.get("status"),
        paypal_subscription_id: r.get("paypal_subscription_id"),
        paypal_payer_id: r.get("paypal_payer_id"),
        current_period_start: r.get("current_period_start"),
        current_period_end: r.get("current_period_end"),
        metadata: r.get("metadata"),
        created_at: r.get("created_at"),
        updated_at: r.get("updated_at"),
    }
}

/// Every account carries exactly one subscription record, free/active by default.
pub async fn ensure_default_subscription(pool: &PgPool, user_id: i32) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO subscriptions (user_id) VALUES ($1) ON CONFLICT (user_id) DO NOTHING")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_subscription_by_user(
    pool: &PgPool,
    user_id: i32,
) -> Result<Option<Subscription>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(subscription_from_row))
}

pub async fn get_subscription_by_provider_id(
    pool: &PgPool,
    paypal_subscription_id: &str,
) -> Result<Option<Subscription>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE paypal_subscription_id = $1"
    ))
    .bind(paypal_subscription_id)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(subscription_from_row))
}

/// Stamps the provider subscription id and a `pending` status before the user
/// is redirected to the provider. The tier stays `free` until the activation
/// webhook confirms; that webhook is the authoritative transition out of
/// `pending`.
pub async fn upsert_pending_subscription(
    pool: &PgPool,
    user_id: i32,
    paypal_subscription_id: &str,
    plan_id: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO subscriptions
               (user_id, tier, status, paypal_subscription_id,
                current_period_start, current_period_end, metadata)
           VALUES ($1, 'free', 'pending', $2, NOW(), NOW() + INTERVAL '30 days',
                   jsonb_build_object('plan_id', $3::text, 'created_via', 'web'))
           ON CONFLICT (user_id)
           DO UPDATE SET
               tier = 'free',
               status = 'pending',
               paypal_subscription_id = EXCLUDED.paypal_subscription_id,
               current_period_start = EXCLUDED.current_period_start,
               current_period_end = EXCLUDED.current_period_end,
               metadata = subscriptions.metadata || EXCLUDED.metadata,
               updated_at = NOW()"#,
    )
    .bind(user_id)
    .bind(paypal_subscription_id)
    .bind(plan_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Absolute assignment keyed by the provider subscription id; replaying the
/// same activation leaves tier/status/payer unchanged. Returns the number of
/// matched records (0 when the id is unknown).
pub async fn activate_subscription(
    pool: &PgPool,
    paypal_subscription_id: &str,
    payer_id: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"UPDATE subscriptions
           SET tier = 'premium', status = 'active', paypal_payer_id = $2,
               current_period_start = NOW(), current_period_end = NOW() + INTERVAL '30 days',
               updated_at = NOW()
           WHERE paypal_subscription_id = $1"#,
    )
    .bind(paypal_subscription_id)
    .bind(payer_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn cancel_subscription(
    pool: &PgPool,
    paypal_subscription_id: &str,
    reason: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let mut patch = serde_json::Map::new();
    patch.insert("cancelled_at".to_string(), json!(Utc::now()));
    if let Some(reason) = reason {
        patch.insert("cancellation_reason".to_string(), json!(reason));
    }

    let res = sqlx::query(
        r#"UPDATE subscriptions
           SET tier = 'free', status = 'cancelled', updated_at = NOW(),
               metadata = metadata || $2::jsonb
           WHERE paypal_subscription_id = $1"#,
    )
    .bind(paypal_subscription_id)
    .bind(serde_json::Value::Object(patch))
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

pub async fn expire_subscription(
    pool: &PgPool,
    paypal_subscription_id: &str,
) -> Result<u64, sqlx::Error> {
    let res = sqlx::query(
        r#"UPDATE subscriptions
           SET tier = 'free', status = 'expired', updated_at = NOW()
           WHERE paypal_subscription_id = $1"#,
    )
    .bind(paypal_subscription_id)
    .execute(pool)
    .await?;
    Ok(res.rows_affected())
}

/// Appends a payment record. Returns false when the provider transaction id
/// was already recorded, so redelivered payment events never double-count.
pub async fn insert_payment(
    pool: &PgPool,
    user_id: i32,
    amount: &str,
    currency: &str,
    provider_transaction_id: &str,
    metadata: &serde_json::Value,
) -> Result<bool, sqlx::Error> {
    let res = sqlx::query(
        r#"INSERT INTO payments
               (user_id, amount, currency, status, provider,
                provider_transaction_id, payment_type, metadata)
           VALUES ($1, $2::numeric, $3, 'completed', 'paypal', $4, 'subscription', $5)
           ON CONFLICT (provider_transaction_id) DO NOTHING"#,
    )
    .bind(user_id)
    .bind(amount)
    .bind(currency)
    .bind(provider_transaction_id)
    .bind(metadata)
    .execute(pool)
    .await?;
    Ok(res.rows_affected() > 0)
}

pub async fn find_user_email(pool: &PgPool, user_id: i32) -> Result<Option<String>, sqlx::Error> {
    let row = sqlx::query("SELECT email FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|r| r.get("email")))
}

pub async fn insert_ai_usage(
    pool: &PgPool,
    user_id: i32,
    request_type: &str,
    tokens_input: i32,
    tokens_output: i32,
    cost_estimate: f64,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"INSERT INTO ai_usage (user_id, request_type, tokens_input, tokens_output, cost_estimate)
           VALUES ($1, $2, $3, $4, $5)"#,
    )
    .bind(user_id)
    .bind(request_type)
    .bind(tokens_input)
    .bind(tokens_output)
    .bind(cost_estimate)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn count_usage_between(
    pool: &PgPool,
    user_id: i32,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<i64, sqlx::Error> {
    let row = sqlx::query(
        "SELECT COUNT(*) AS count FROM ai_usage WHERE user_id = $1 AND created_at >= $2 AND created_at < $3",
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_one(pool)
    .await?;
    Ok(row.get("count"))
}

pub async fn list_usage_between(
    pool: &PgPool,
    user_id: i32,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<AiUsage>, sqlx::Error> {
    let rows = sqlx::query(
        r#"SELECT id, user_id, request_type, tokens_input, tokens_output, cost_estimate, created_at
           FROM ai_usage
           WHERE user_id = $1 AND created_at >= $2 AND created_at < $3
           ORDER BY created_at DESC"#,
    )
    .bind(user_id)
    .bind(from)
    .bind(to)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|r| AiUsage {
            id: r.get("id"),
            user_id: r.get("user_id"),
            request_type: r.get("request_type"),
            tokens_input: r.get("tokens_input"),
            tokens_output: r.get("tokens_output"),
            cost_estimate: r.get("cost_estimate"),
            created_at: r.get("created_at"),
        })
        .collect())
}
