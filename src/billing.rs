// src/billing.rs

use chrono::{DateTime, Datelike, TimeZone, Utc};
use sqlx::PgPool;

use crate::db;
use crate::error::ApiError;
use crate::models::QuotaInfo;

pub const FREE_TIER_QUOTA: i64 = 10;
pub const PREMIUM_TIER_QUOTA: i64 = 100;

const COST_PER_MILLION_OUTPUT_TOKENS: f64 = 15.0;
const FREE_TIER_COST_MULTIPLIER: f64 = 1.5;

pub fn quota_limit_for_tier(tier: &str) -> i64 {
    if tier == "premium" {
        PREMIUM_TIER_QUOTA
    } else {
        FREE_TIER_QUOTA
    }
}

/// Calendar-month window containing `now`: [first of this month, first of next month).
/// The upper bound doubles as the quota reset date.
pub fn month_window(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let start = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("valid month start");
    let (next_year, next_month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let end = Utc
        .with_ymd_and_hms(next_year, next_month, 1, 0, 0, 0)
        .single()
        .expect("valid month end");
    (start, end)
}

/// A missing subscription record counts as the free tier; accounts created
/// before the paywall rollout never got one.
pub async fn get_user_quota_info(pool: &PgPool, user_id: i32) -> Result<QuotaInfo, sqlx::Error> {
    let tier = db::get_subscription_by_user(pool, user_id)
        .await?
        .map(|s| s.tier)
        .unwrap_or_else(|| "free".to_string());

    let quota_limit = quota_limit_for_tier(&tier);
    let (start, end) = month_window(Utc::now());
    let usage_count = db::count_usage_between(pool, user_id, start, end).await?;

    Ok(QuotaInfo {
        tier,
        quota_limit,
        usage_count,
        remaining: (quota_limit - usage_count).max(0),
        reset_date: end,
    })
}

/// Gate for the AI endpoint. Exhausted quota is an error; a failed lookup is
/// not — availability wins over strict enforcement, so the call is allowed
/// and the failure logged (returns None in that case).
pub async fn check_quota(pool: &PgPool, user_id: i32) -> Result<Option<QuotaInfo>, ApiError> {
    let info = match get_user_quota_info(pool, user_id).await {
        Ok(info) => info,
        Err(e) => {
            log::warn!("quota lookup failed user_id={user_id}, allowing call: {e}");
            return Ok(None);
        }
    };

    if info.remaining <= 0 {
        let reset = info.reset_date.format("%Y-%m-%d");
        let message = if info.tier == "premium" {
            format!(
                "You've used all {} AI calls this month. Your quota resets on {reset}.",
                info.quota_limit
            )
        } else {
            format!(
                "You've used all {} AI calls this month. Upgrade to Premium for {PREMIUM_TIER_QUOTA} AI insights! Resets {reset}.",
                info.quota_limit
            )
        };
        return Err(ApiError::QuotaExceeded(message));
    }

    Ok(Some(info))
}

/// Output-token pricing with a free-tier infrastructure multiplier.
pub fn estimate_cost(tokens_output: i32, tier: &str) -> f64 {
    let base = (tokens_output as f64 / 1_000_000.0) * COST_PER_MILLION_OUTPUT_TOKENS;
    if tier == "premium" {
        base
    } else {
        base * FREE_TIER_COST_MULTIPLIER
    }
}

pub async fn record_usage(
    pool: &PgPool,
    user_id: i32,
    request_type: &str,
    tokens_input: i32,
    tokens_output: i32,
    tier: &str,
) -> Result<(), sqlx::Error> {
    let cost = estimate_cost(tokens_output, tier);
    db::insert_ai_usage(pool, user_id, request_type, tokens_input, tokens_output, cost).await
}
