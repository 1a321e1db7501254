// src/api/advice.rs

use actix_web::web::ReqData;
use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use utoipa::ToSchema;

use crate::api::grok_client::{ChatMessage, ChatRequest};
use crate::error::ApiError;
use crate::prompts::{self, RequestKind};
use crate::{billing, db, AppState};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdviceRequest {
    #[serde(default, alias = "userData")]
    #[schema(value_type = Option<Object>)]
    pub user_data: Option<serde_json::Value>,

    #[serde(default, alias = "requestType")]
    pub request_type: Option<String>,
}

#[utoipa::path(
    post,
    context_path = "/api",
    tag = "advice",
    request_body = AdviceRequest,
    responses(
        (status = 200, description = "AI coaching response, in `advice` or `response` depending on the request category"),
        (status = 400, description = "Missing or invalid userData/requestType"),
        (status = 429, description = "Monthly AI quota exhausted"),
        (status = 500, description = "Completion API failure after retries")
    )
)]
#[post("/advice")]
pub async fn get_advice(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
    payload: web::Json<AdviceRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = *user_id;
    let payload = payload.into_inner();

    let user_data = payload
        .user_data
        .ok_or_else(|| ApiError::Validation("userData is required".to_string()))?;
    let request_type = payload
        .request_type
        .ok_or_else(|| ApiError::Validation("Missing requestType".to_string()))?;
    let kind = RequestKind::from_wire(&request_type)
        .ok_or_else(|| ApiError::Validation(format!("unknown requestType: {request_type}")))?;

    // Quota gate before any outbound call; a failed lookup allows the call.
    let quota = billing::check_quota(&state.pool, user_id).await?;
    let tier = quota
        .as_ref()
        .map(|q| q.tier.clone())
        .unwrap_or_else(|| "free".to_string());

    let cfg = kind.config();
    let request = ChatRequest {
        model: cfg.model.to_string(),
        messages: vec![
            ChatMessage {
                role: "system",
                content: cfg.system_prompt.to_string(),
            },
            ChatMessage {
                role: "user",
                content: prompts::build_user_prompt(kind, &user_data),
            },
        ],
        temperature: cfg.temperature,
        max_tokens: cfg.max_tokens,
    };

    let completion = state.grok.complete(&request).await?;

    billing::record_usage(
        &state.pool,
        user_id,
        cfg.usage_category,
        completion.usage.prompt_tokens,
        completion.usage.completion_tokens,
        &tier,
    )
    .await?;

    let mut body = serde_json::Map::new();
    body.insert(
        cfg.response_field.to_string(),
        serde_json::Value::String(completion.content),
    );
    Ok(HttpResponse::Ok().json(serde_json::Value::Object(body)))
}

#[utoipa::path(
    get,
    context_path = "/api",
    tag = "advice",
    responses(
        (status = 200, description = "Current-month AI usage entries", body = [crate::models::AiUsage])
    )
)]
#[get("/usage")]
pub async fn list_usage(
    state: web::Data<AppState>,
    user_id: ReqData<i32>,
) -> Result<HttpResponse, ApiError> {
    let (start, end) = billing::month_window(Utc::now());
    let usage = db::list_usage_between(&state.pool, *user_id, start, end).await?;
    Ok(HttpResponse::Ok().json(usage))
}
