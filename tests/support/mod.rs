use sqlx::{PgPool, Row};
use std::env;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};

use drink_tracker_api::api::grok_client::{GrokClient, RetryPolicy};
use drink_tracker_api::api::paypal_client::PayPalClient;
use drink_tracker_api::AppState;

fn split_db_url(url: &str) -> Result<(String, String), String> {
    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base.to_string(), Some(query)),
        None => (url.to_string(), None),
    };

    let db_start = base
        .rfind('/')
        .ok_or_else(|| "invalid database url".to_string())?;
    if db_start + 1 >= base.len() {
        return Err("database name is empty".to_string());
    }

    let db_name = base[db_start + 1..].to_string();
    let mut admin_url = format!("{}postgres", &base[..db_start + 1]);
    if let Some(query) = query {
        admin_url = format!("{admin_url}?{query}");
    }

    Ok((admin_url, db_name))
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

static TEST_DB_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

pub struct TestDb {
    pub pool: PgPool,
    _guard: MutexGuard<'static, ()>,
}

pub async fn init_test_db() -> TestDb {
    dotenvy::dotenv().ok();
    let test_url = env::var("TEST_DATABASE_URL").expect("TEST_DATABASE_URL must be set");
    let (admin_url, db_name) = split_db_url(&test_url).expect("invalid TEST_DATABASE_URL format");

    let lock = TEST_DB_LOCK.get_or_init(|| Mutex::new(()));
    let guard = lock.lock().await;

    let admin_pool = PgPool::connect(&admin_url).await.expect("connect admin db");

    let _ = sqlx::query("SELECT pg_advisory_lock(424242)")
        .execute(&admin_pool)
        .await;

    let quoted_name = quote_identifier(&db_name);
    let drop_sql = format!("DROP DATABASE IF EXISTS {quoted_name} WITH (FORCE)");
    let create_sql = format!("CREATE DATABASE {quoted_name}");

    let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
    let create_result = sqlx::query(&create_sql).execute(&admin_pool).await;
    if let Err(e) = create_result {
        eprintln!("create test db error: {e}");
        let _ = sqlx::query(&drop_sql).execute(&admin_pool).await;
        sqlx::query(&create_sql)
            .execute(&admin_pool)
            .await
            .expect("create test db retry");
    }

    let _ = sqlx::query("SELECT pg_advisory_unlock(424242)")
        .execute(&admin_pool)
        .await;

    admin_pool.close().await;

    let pool = PgPool::connect(&test_url).await.expect("connect test db");
    sqlx::migrate!().run(&pool).await.expect("migrations");
    TestDb {
        pool,
        _guard: guard,
    }
}

pub fn test_retry_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        attempt_timeout: Duration::from_millis(250),
        base_delay: Duration::from_millis(50),
    }
}

pub fn build_state(
    pool: PgPool,
    grok_base_url: &str,
    paypal_base_url: &str,
    paypal_webhook_id: Option<&str>,
) -> AppState {
    let http = reqwest::Client::new();
    AppState {
        pool,
        grok: GrokClient::new(http.clone(), grok_base_url, "test-grok", test_retry_policy()),
        paypal: PayPalClient::new(http, paypal_base_url, "test-client", "test-secret"),
        paypal_webhook_id: paypal_webhook_id.map(|s| s.to_string()),
        paypal_plan_id: Some("P-TEST-PLAN".to_string()),
        app_base_url: "http://localhost:8888".to_string(),
        jwt_secret: "test-jwt-secret".to_string(),
    }
}

pub async fn insert_user(pool: &PgPool, email: &str) -> i32 {
    sqlx::query(
        r#"INSERT INTO users (username, email, password_hash)
           VALUES ($1, $2, $3)
           RETURNING id"#,
    )
    .bind("test_user")
    .bind(email)
    .bind("test-hash")
    .fetch_one(pool)
    .await
    .expect("insert user")
    .get("id")
}

pub async fn insert_subscription(
    pool: &PgPool,
    user_id: i32,
    paypal_subscription_id: &str,
    status: &str,
) {
    sqlx::query(
        r#"INSERT INTO subscriptions (user_id, tier, status, paypal_subscription_id)
           VALUES ($1, 'free', $2, $3)"#,
    )
    .bind(user_id)
    .bind(status)
    .bind(paypal_subscription_id)
    .execute(pool)
    .await
    .expect("insert subscription");
}
