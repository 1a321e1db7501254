// src/main.rs
use actix_web::{web, App, HttpResponse, HttpServer, Responder};
use dotenvy::dotenv;
use sqlx::PgPool;
use std::env;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use drink_tracker_api::api::grok_client::{GrokClient, RetryPolicy, DEFAULT_GROK_API_BASE};
use drink_tracker_api::api::paypal_client::{
    PayPalClient, PAYPAL_LIVE_API_BASE, PAYPAL_SANDBOX_API_BASE,
};
use drink_tracker_api::{api, docs, AppState};

async fn index() -> impl Responder {
    HttpResponse::Ok().body("Service ready!")
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPool::connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let jwt_secret = env::var("JWT_SECRET").expect("JWT_SECRET required");

    let grok_api_key = env::var("GROK_API_KEY").expect("GROK_API_KEY required");
    let grok_base_url =
        env::var("GROK_API_BASE_URL").unwrap_or_else(|_| DEFAULT_GROK_API_BASE.to_string());
    let retry = RetryPolicy {
        max_attempts: env_u32("GROK_MAX_ATTEMPTS", 3),
        attempt_timeout: Duration::from_secs(env_u64("GROK_ATTEMPT_TIMEOUT_SECS", 20)),
        base_delay: Duration::from_secs(env_u64("GROK_RETRY_BASE_DELAY_SECS", 2)),
    };

    let paypal_client_id = env::var("PAYPAL_CLIENT_ID").expect("PAYPAL_CLIENT_ID required");
    let paypal_client_secret =
        env::var("PAYPAL_CLIENT_SECRET").expect("PAYPAL_CLIENT_SECRET required");
    let paypal_base_url = if env::var("PAYPAL_SANDBOX").unwrap_or_default() == "true" {
        PAYPAL_SANDBOX_API_BASE.to_string()
    } else {
        PAYPAL_LIVE_API_BASE.to_string()
    };
    let paypal_webhook_id = env::var("PAYPAL_WEBHOOK_ID").ok();
    let paypal_plan_id = env::var("PAYPAL_PLAN_ID").ok();
    let app_base_url =
        env::var("APP_BASE_URL").unwrap_or_else(|_| "http://localhost:8888".to_string());

    let http = reqwest::Client::new();
    let grok = GrokClient::new(http.clone(), grok_base_url, grok_api_key, retry);
    let paypal = PayPalClient::new(http, paypal_base_url, paypal_client_id, paypal_client_secret);

    let state = web::Data::new(AppState {
        pool,
        grok,
        paypal,
        paypal_webhook_id,
        paypal_plan_id,
        app_base_url,
        jwt_secret,
    });

    HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .route("/", web::get().to(index))
            .service(
                SwaggerUi::new("/docs/{_:.*}").url("/api-docs/openapi.json", docs::ApiDoc::openapi()),
            )
            // Public auth routes
            .service(api::auth::register)
            .service(api::auth::login)
            // Protected routes
            .service(
                web::scope("/api")
                    .wrap(api::auth::JwtMiddleware)
                    .service(api::advice::get_advice)
                    .service(api::advice::list_usage)
                    .service(api::subscriptions::create_subscription)
                    .service(api::subscriptions::cancel_subscription)
                    .service(api::subscriptions::get_subscription),
            )
            // Webhooks (public)
            .service(api::webhooks_paypal::paypal_webhook)
    })
    .bind(("0.0.0.0", 8065))?
    .run()
    .await
}

fn env_u32(name: &str, default: u32) -> u32 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
