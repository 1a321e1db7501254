// src/api/subscriptions.rs

use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::{billing, db, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct SubscribeRequest {
    /// Provider billing plan; falls back to the configured default.
    #[serde(default, alias = "planId")]
    pub plan_id: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

/// Creates the provider-side subscription and parks the local record in
/// `pending`. The activation webhook is the authoritative transition out of
/// `pending`, which is why a failed local write does not fail the request.
#[utoipa::path(
    post,
    context_path = "/api",
    tag = "billing",
    request_body = SubscribeRequest,
    responses(
        (status = 200, description = "Approval URL for the provider checkout redirect"),
        (status = 400, description = "Unknown user"),
        (status = 500, description = "Provider not configured or provider API failure")
    )
)]
#[post("/subscribe")]
pub async fn create_subscription(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<SubscribeRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = *user_id;

    let plan_id = payload
        .plan_id
        .clone()
        .or_else(|| state.paypal_plan_id.clone())
        .ok_or_else(|| ApiError::Configuration("no PayPal plan id configured".to_string()))?;

    let email = db::find_user_email(&state.pool, user_id)
        .await?
        .ok_or_else(|| ApiError::Validation("user not found".to_string()))?;

    let return_url = format!("{}/app?paypal=success", state.app_base_url);
    let cancel_url = format!("{}/app?paypal=cancel", state.app_base_url);

    log::info!("paypal create subscription user_id={user_id} plan_id={plan_id}");
    let created = state
        .paypal
        .create_subscription(&plan_id, user_id, &email, &return_url, &cancel_url)
        .await?;

    if let Err(e) =
        db::upsert_pending_subscription(&state.pool, user_id, &created.id, &plan_id).await
    {
        // The activation webhook will resync the record.
        log::error!("pending subscription write failed user_id={user_id}: {e}");
    }

    Ok(HttpResponse::Ok().json(json!({
        "subscription_id": created.id,
        "approval_url": created.approval_url,
    })))
}

#[utoipa::path(
    post,
    context_path = "/api",
    tag = "billing",
    request_body = CancelRequest,
    responses(
        (status = 200, description = "Subscription cancelled provider-side and locally"),
        (status = 400, description = "No active subscription to cancel"),
        (status = 500, description = "Provider API failure")
    )
)]
#[post("/subscription/cancel")]
pub async fn cancel_subscription(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<CancelRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = *user_id;
    let reason = payload
        .reason
        .clone()
        .unwrap_or_else(|| "User requested cancellation".to_string());

    let subscription = db::get_subscription_by_user(&state.pool, user_id)
        .await?
        .ok_or_else(|| ApiError::Validation("no subscription on record".to_string()))?;

    let provider_id = subscription
        .paypal_subscription_id
        .filter(|_| matches!(subscription.status.as_str(), "active" | "pending"))
        .ok_or_else(|| ApiError::Validation("no active subscription to cancel".to_string()))?;

    state
        .paypal
        .cancel_subscription(&provider_id, &reason)
        .await?;
    log::info!("paypal subscription cancelled user_id={user_id} id={provider_id}");

    if let Err(e) = db::cancel_subscription(&state.pool, &provider_id, Some(&reason)).await {
        // Provider-side cancellation already succeeded; the webhook resyncs.
        log::error!("subscription cancel write failed user_id={user_id}: {e}");
    }

    let subscription = db::get_subscription_by_user(&state.pool, user_id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "message": "Subscription cancelled successfully",
        "subscription": subscription,
    })))
}

#[utoipa::path(
    get,
    context_path = "/api",
    tag = "billing",
    responses(
        (status = 200, description = "Current subscription record and quota snapshot")
    )
)]
#[get("/subscription")]
pub async fn get_subscription(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, ApiError> {
    let user_id = *user_id;
    let subscription = db::get_subscription_by_user(&state.pool, user_id).await?;
    let quota = billing::get_user_quota_info(&state.pool, user_id).await?;

    Ok(HttpResponse::Ok().json(json!({
        "subscription": subscription,
        "quota": quota,
    })))
}
