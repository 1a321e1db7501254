// src/api/webhooks_paypal.rs
//
// Reconciles PayPal subscription lifecycle events into the local record.
// The provider treats any non-2xx as "redeliver later", so every branch in
// here answers 200 {"received": true}; internal failures are logged instead
// of surfaced.

use actix_web::{post, web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use utoipa::ToSchema;

use crate::api::paypal_client::VerificationHeaders;
use crate::error::ApiError;
use crate::{db, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct WebhookEnvelope {
    #[serde(default)]
    pub id: Option<String>,
    pub event_type: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub resource: Value,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventType {
    SubscriptionActivated,
    SubscriptionCancelled,
    SubscriptionExpired,
    SubscriptionCreated,
    PaymentCompleted,
    Unknown(String),
}

impl From<&str> for WebhookEventType {
    fn from(s: &str) -> Self {
        match s {
            "BILLING.SUBSCRIPTION.ACTIVATED" => Self::SubscriptionActivated,
            "BILLING.SUBSCRIPTION.CANCELLED" => Self::SubscriptionCancelled,
            "BILLING.SUBSCRIPTION.EXPIRED" => Self::SubscriptionExpired,
            "BILLING.SUBSCRIPTION.CREATED" => Self::SubscriptionCreated,
            "PAYMENT.SALE.COMPLETED" => Self::PaymentCompleted,
            other => Self::Unknown(other.to_string()),
        }
    }
}

pub fn extract_verification_headers(req: &HttpRequest) -> Option<VerificationHeaders> {
    let get = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|h| h.to_str().ok())
            .map(|s| s.to_string())
    };

    Some(VerificationHeaders {
        transmission_id: get("paypal-transmission-id")?,
        transmission_time: get("paypal-transmission-time")?,
        cert_url: get("paypal-cert-url")?,
        auth_algo: get("paypal-auth-algo")?,
        transmission_sig: get("paypal-transmission-sig")?,
    })
}

fn received() -> HttpResponse {
    HttpResponse::Ok().json(json!({ "received": true }))
}

fn received_with_error(error: &str) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "received": true, "error": error }))
}

#[utoipa::path(
    post,
    path = "/webhook/paypal",
    tag = "webhooks",
    request_body = WebhookEnvelope,
    responses(
        (status = 200, description = "Event acknowledged; internal outcome is never surfaced")
    )
)]
#[post("/webhook/paypal")]
pub async fn paypal_webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> HttpResponse {
    // Authenticity first. An unverifiable envelope must not mutate anything,
    // but the provider still gets a 200 so it stops redelivering.
    if let Some(webhook_id) = state.paypal_webhook_id.as_deref() {
        let Some(headers) = extract_verification_headers(&req) else {
            log::warn!("paypal webhook missing verification headers");
            return received_with_error("missing verification headers");
        };

        match state
            .paypal
            .verify_webhook_signature(webhook_id, &headers, &body)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                log::warn!(
                    "paypal webhook signature verification failed transmission_id={}",
                    headers.transmission_id
                );
                return received_with_error("invalid signature");
            }
            Err(e) => {
                log::error!("paypal webhook verification error: {e}");
                return received_with_error("verification error");
            }
        }
    } else {
        log::warn!("PAYPAL_WEBHOOK_ID not set, skipping webhook signature verification");
    }

    let envelope: WebhookEnvelope = match serde_json::from_slice(&body) {
        Ok(ev) => ev,
        Err(e) => {
            log::error!("paypal webhook invalid payload: {e}");
            return received_with_error("invalid payload");
        }
    };

    log::info!("paypal webhook event_type={}", envelope.event_type);

    let outcome = match WebhookEventType::from(envelope.event_type.as_str()) {
        WebhookEventType::SubscriptionActivated => {
            handle_subscription_activated(&state, &envelope.resource).await
        }
        WebhookEventType::SubscriptionCancelled => {
            handle_subscription_cancelled(&state, &envelope.resource).await
        }
        WebhookEventType::SubscriptionExpired => {
            handle_subscription_expired(&state, &envelope.resource).await
        }
        WebhookEventType::PaymentCompleted => {
            handle_payment_completed(&state, &envelope.resource).await
        }
        WebhookEventType::SubscriptionCreated => {
            log::info!("paypal subscription created, waiting for activation");
            Ok(())
        }
        WebhookEventType::Unknown(other) => {
            log::info!("unhandled paypal event type: {other}");
            Ok(())
        }
    };

    match outcome {
        Ok(()) => received(),
        Err(e) => {
            // Redelivery cannot fix an application-level failure, and a
            // non-2xx answer only triggers provider retry storms.
            log::error!(
                "paypal webhook processing failed event_type={}: {e}",
                envelope.event_type
            );
            received_with_error(&e.to_string())
        }
    }
}

fn resource_id(resource: &Value) -> Result<&str, ApiError> {
    resource
        .get("id")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Validation("webhook resource missing id".to_string()))
}

async fn handle_subscription_activated(
    state: &AppState,
    resource: &Value,
) -> Result<(), ApiError> {
    let subscription_id = resource_id(resource)?;
    let payer_id = resource
        .pointer("/subscriber/payer_id")
        .and_then(|v| v.as_str());

    let matched = db::activate_subscription(&state.pool, subscription_id, payer_id).await?;
    if matched == 0 {
        log::warn!("activation for unknown subscription id={subscription_id}");
    } else {
        log::info!("subscription activated id={subscription_id}");
    }
    Ok(())
}

async fn handle_subscription_cancelled(
    state: &AppState,
    resource: &Value,
) -> Result<(), ApiError> {
    let subscription_id = resource_id(resource)?;
    let matched = db::cancel_subscription(&state.pool, subscription_id, None).await?;
    if matched == 0 {
        log::warn!("cancellation for unknown subscription id={subscription_id}");
    } else {
        log::info!("subscription cancelled id={subscription_id}");
    }
    Ok(())
}

async fn handle_subscription_expired(state: &AppState, resource: &Value) -> Result<(), ApiError> {
    let subscription_id = resource_id(resource)?;
    let matched = db::expire_subscription(&state.pool, subscription_id).await?;
    if matched == 0 {
        log::warn!("expiration for unknown subscription id={subscription_id}");
    } else {
        log::info!("subscription expired id={subscription_id}");
    }
    Ok(())
}

async fn handle_payment_completed(state: &AppState, resource: &Value) -> Result<(), ApiError> {
    let transaction_id = resource_id(resource)?;

    let Some(subscription_id) = resource.get("billing_agreement_id").and_then(|v| v.as_str())
    else {
        log::warn!("payment tx={transaction_id} without billing agreement, skipping");
        return Ok(());
    };

    // The payment may predate or outlive our subscription record; that is
    // not an error, there is simply nothing to attach it to.
    let Some(subscription) =
        db::get_subscription_by_provider_id(&state.pool, subscription_id).await?
    else {
        log::warn!("no subscription found for payment sub_id={subscription_id} tx={transaction_id}");
        return Ok(());
    };

    let amount = resource
        .pointer("/amount/total")
        .and_then(|v| v.as_str())
        .unwrap_or("0");
    let currency = resource
        .pointer("/amount/currency")
        .and_then(|v| v.as_str())
        .unwrap_or("USD");

    let metadata = json!({
        "subscription_id": subscription_id,
        "resource": resource,
    });

    let inserted = db::insert_payment(
        &state.pool,
        subscription.user_id,
        amount,
        currency,
        transaction_id,
        &metadata,
    )
    .await?;

    if inserted {
        log::info!(
            "payment recorded tx={transaction_id} user_id={}",
            subscription.user_id
        );
    } else {
        log::info!("payment tx={transaction_id} already recorded, skipping duplicate");
    }
    Ok(())
}
