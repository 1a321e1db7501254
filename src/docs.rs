use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::advice::get_advice,
        crate::api::advice::list_usage,
        crate::api::subscriptions::create_subscription,
        crate::api::subscriptions::cancel_subscription,
        crate::api::subscriptions::get_subscription,
        crate::api::webhooks_paypal::paypal_webhook
    ),
    components(
        schemas(
            crate::api::auth::RegisterRequest,
            crate::api::auth::LoginRequest,
            crate::api::auth::AuthResponse,
            crate::api::advice::AdviceRequest,
            crate::api::subscriptions::SubscribeRequest,
            crate::api::subscriptions::CancelRequest,
            crate::api::webhooks_paypal::WebhookEnvelope,
            crate::models::Subscription,
            crate::models::Payment,
            crate::models::AiUsage,
            crate::models::QuotaInfo
        )
    ),
    tags(
        (name = "auth", description = "Authentication"),
        (name = "advice", description = "AI coaching"),
        (name = "billing", description = "Subscriptions and payments"),
        (name = "webhooks", description = "Callbacks from PayPal")
    )
)]
pub struct ApiDoc;
