// src/api/paypal_client.rs
//
// Minimal client for the PayPal REST API: subscription checkout/cancel and
// webhook signature verification. Auth: OAuth2 client-credentials token.

use serde::Deserialize;
use serde_json::{json, Value};

pub const PAYPAL_LIVE_API_BASE: &str = "https://api-m.paypal.com";
pub const PAYPAL_SANDBOX_API_BASE: &str = "https://api-m.sandbox.paypal.com";

const BRAND_NAME: &str = "Daily Drink Tracker";

#[derive(Debug, thiserror::Error)]
pub enum PayPalError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("paypal api error status={status} body={body}")]
    Api { status: u16, body: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    access_token: String,
}

#[derive(Debug)]
pub struct CreatedSubscription {
    pub id: String,
    pub approval_url: String,
}

/// The provider signature headers delivered alongside each webhook envelope.
#[derive(Debug, Clone)]
pub struct VerificationHeaders {
    pub transmission_id: String,
    pub transmission_time: String,
    pub cert_url: String,
    pub auth_algo: String,
    pub transmission_sig: String,
}

#[derive(Clone)]
pub struct PayPalClient {
    http: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl PayPalClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Tokens are valid for ~9 hours; we fetch a fresh one per operation.
    pub async fn get_access_token(&self) -> Result<String, PayPalError> {
        let resp = self
            .http
            .post(format!("{}/v1/oauth2/token", self.base_url))
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(PayPalError::Api {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str::<AccessTokenResponse>(&body)
            .map(|t| t.access_token)
            .map_err(|e| PayPalError::InvalidResponse(format!("{e}; body={body}")))
    }

    /// Creates the provider-side subscription and returns its id plus the
    /// approval URL the user must be redirected to. The `PayPal-Request-Id`
    /// header makes the create idempotent against double submits.
    pub async fn create_subscription(
        &self,
        plan_id: &str,
        user_id: i32,
        email: &str,
        return_url: &str,
        cancel_url: &str,
    ) -> Result<CreatedSubscription, PayPalError> {
        let access_token = self.get_access_token().await?;
        let request_id = format!("{}-{}", user_id, chrono::Utc::now().timestamp_millis());

        let resp = self
            .http
            .post(format!("{}/v1/billing/subscriptions", self.base_url))
            .bearer_auth(&access_token)
            .header("PayPal-Request-Id", request_id)
            .json(&json!({
                "plan_id": plan_id,
                "subscriber": { "email_address": email },
                "application_context": {
                    "brand_name": BRAND_NAME,
                    "locale": "en-US",
                    "shipping_preference": "NO_SHIPPING",
                    "user_action": "SUBSCRIBE_NOW",
                    "return_url": return_url,
                    "cancel_url": cancel_url,
                }
            }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(PayPalError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| PayPalError::InvalidResponse(format!("{e}; body={body}")))?;

        let id = parsed
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PayPalError::InvalidResponse(format!("no subscription id; body={body}")))?
            .to_string();

        let approval_url = parsed
            .get("links")
            .and_then(|v| v.as_array())
            .and_then(|links| {
                links.iter().find(|l| {
                    l.get("rel").and_then(|r| r.as_str()) == Some("approve")
                })
            })
            .and_then(|l| l.get("href").and_then(|h| h.as_str()))
            .ok_or_else(|| PayPalError::InvalidResponse(format!("no approval url; body={body}")))?
            .to_string();

        Ok(CreatedSubscription { id, approval_url })
    }

    /// PayPal answers 204 No Content on success.
    pub async fn cancel_subscription(
        &self,
        subscription_id: &str,
        reason: &str,
    ) -> Result<(), PayPalError> {
        let access_token = self.get_access_token().await?;

        let resp = self
            .http
            .post(format!(
                "{}/v1/billing/subscriptions/{}/cancel",
                self.base_url, subscription_id
            ))
            .bearer_auth(&access_token)
            .json(&json!({ "reason": reason }))
            .send()
            .await?;

        let status = resp.status();
        if status.as_u16() == 204 || status.is_success() {
            return Ok(());
        }

        let body = resp.text().await.unwrap_or_default();
        Err(PayPalError::Api {
            status: status.as_u16(),
            body,
        })
    }

    /// Delegates authenticity checking to the provider's own verification
    /// endpoint; true only when it reports `verification_status == SUCCESS`.
    pub async fn verify_webhook_signature(
        &self,
        webhook_id: &str,
        headers: &VerificationHeaders,
        raw_body: &[u8],
    ) -> Result<bool, PayPalError> {
        let webhook_event: Value = serde_json::from_slice(raw_body)
            .map_err(|e| PayPalError::InvalidResponse(format!("webhook body is not json: {e}")))?;

        let access_token = self.get_access_token().await?;

        let resp = self
            .http
            .post(format!(
                "{}/v1/notifications/verify-webhook-signature",
                self.base_url
            ))
            .bearer_auth(&access_token)
            .json(&json!({
                "transmission_id": headers.transmission_id,
                "transmission_time": headers.transmission_time,
                "cert_url": headers.cert_url,
                "auth_algo": headers.auth_algo,
                "transmission_sig": headers.transmission_sig,
                "webhook_id": webhook_id,
                "webhook_event": webhook_event,
            }))
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;

        if !status.is_success() {
            return Err(PayPalError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| PayPalError::InvalidResponse(format!("{e}; body={body}")))?;

        Ok(parsed.get("verification_status").and_then(|v| v.as_str()) == Some("SUCCESS"))
    }
}
