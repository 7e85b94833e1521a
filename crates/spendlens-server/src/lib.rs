//! spendlens Web Server
//!
//! Axum-based JSON API over a spendlens data directory.
//!
//! Security features:
//! - HTTP Basic authentication when credentials are configured
//! - Restrictive CORS policy
//! - Security headers (CSP, nosniff, frame denial)
//! - Sanitized error responses

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, warn};

use spendlens_core::ai::{AIBackend, AIClient};
use spendlens_core::pipeline::regenerate_summary;
use spendlens_core::{DataStore, Settings};

mod handlers;

/// HTTP Basic credentials
#[derive(Clone)]
pub struct BasicCredentials {
    pub username: String,
    pub password: String,
}

impl BasicCredentials {
    /// Compare both halves in constant time
    fn matches(&self, username: &str, password: &str) -> bool {
        let user_ok = constant_time_eq(username, &self.username);
        let pass_ok = constant_time_eq(password, &self.password);
        user_ok & pass_ok
    }
}

/// Server configuration
#[derive(Clone, Default)]
pub struct ServerConfig {
    /// Basic auth is enforced only when set
    pub credentials: Option<BasicCredentials>,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Credentials from `[server]` settings unless `no_auth` is set
    pub fn from_settings(settings: &Settings, no_auth: bool) -> Self {
        let credentials = if no_auth {
            None
        } else {
            settings
                .basic_auth()
                .map(|(username, password)| BasicCredentials { username, password })
        };
        Self {
            credentials,
            allowed_origins: settings.server.allowed_origins.clone(),
        }
    }
}

/// Shared application state
pub struct AppState {
    pub store: DataStore,
    pub settings: Settings,
    pub config: ServerConfig,
    pub ai: Option<AIClient>,
    /// Held across read-modify-write of the data files
    pub write_lock: Mutex<()>,
}

/// Basic authentication middleware
///
/// A missing, malformed or wrong `Authorization` header gets a 401 with a
/// `WWW-Authenticate` challenge so browsers prompt for credentials.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let Some(credentials) = &state.config.credentials else {
        return next.run(request).await;
    };

    let authorized = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(decode_basic)
        .map(|(user, pass)| credentials.matches(&user, &pass))
        .unwrap_or(false);

    if authorized {
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, "Basic realm=\"Protected\"")],
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// `Basic dXNlcjpwYXNz` -> ("user", "pass")
fn decode_basic(value: &str) -> Option<(String, String)> {
    let encoded = value.strip_prefix("Basic ")?.trim();
    let decoded = STANDARD.decode(encoded).ok()?;
    let text = String::from_utf8(decoded).ok()?;
    let (user, pass) = text.split_once(':')?;
    Some((user.to_string(), pass.to_string()))
}

fn constant_time_eq(provided: &str, expected: &str) -> bool {
    use subtle::ConstantTimeEq;

    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    // Only compare if lengths match (constant-time for same-length values)
    provided.len() == expected.len() && provided.ct_eq(expected).into()
}

/// Create the application router
pub fn create_router(
    store: DataStore,
    settings: Settings,
    static_dir: Option<&Path>,
    config: ServerConfig,
) -> Router {
    let ai = AIClient::from_settings(&settings.ai);
    match &ai {
        Some(client) => info!(
            "AI backend configured: {} {} (model: {})",
            client.kind(),
            client.host(),
            client.model()
        ),
        None => info!("ℹ️  AI backend not configured (set OPENAI_API_KEY or OLLAMA_HOST to enable)"),
    }

    let state = Arc::new(AppState {
        store,
        settings,
        config: config.clone(),
        ai,
        write_lock: Mutex::new(()),
    });

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        // Summary views
        .route("/summary", get(handlers::get_summary))
        .route("/dashboard", get(handlers::get_dashboard))
        .route("/years", get(handlers::list_years))
        .route("/years/:year", get(handlers::get_year))
        .route("/years/:year/insights", get(handlers::get_year_insights))
        .route("/years/:year/:month", get(handlers::get_month))
        .route(
            "/years/:year/:month/insights",
            get(handlers::get_month_insights),
        )
        .route(
            "/years/:year/:month/category/:category",
            get(handlers::list_category_transactions),
        )
        // Transactions
        .route(
            "/years/:year/:month/transactions",
            get(handlers::list_month_transactions),
        )
        .route(
            "/years/:year/:month/transactions/bulk",
            post(handlers::bulk_update_month),
        )
        .route("/transactions", get(handlers::list_transactions))
        .route("/transactions/bulk", post(handlers::bulk_update))
        // Export
        .route("/export", get(handlers::export_transactions))
        // Data management
        .route("/manage/reset", post(handlers::reset_data))
        .route(
            "/manage/load-default-categories",
            post(handlers::load_default_categories),
        )
        .route("/manage/process", post(handlers::process_imports));

    // Build CORS layer
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);
    let cors = if config.allowed_origins.is_empty() {
        cors
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    };

    // CSP: same-origin scripts, inline styles for the dashboard, blob: for charts
    let csp_value = HeaderValue::from_static(
        "default-src 'self'; script-src 'self'; style-src 'self' 'unsafe-inline'; img-src 'self' blob: data:; font-src 'self'; connect-src 'self'; frame-ancestors 'none'"
    );

    let mut app = Router::new().nest("/api", api_routes);

    // Static files sit behind the same auth as the API
    if let Some(dir) = static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }

    app.layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ))
    .with_state(state)
    .layer(TraceLayer::new_for_http())
    .layer(cors)
    // Security headers
    .layer(SetResponseHeaderLayer::overriding(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("DENY"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
        header::X_XSS_PROTECTION,
        HeaderValue::from_static("1; mode=block"),
    ))
    .layer(SetResponseHeaderLayer::overriding(
        header::CONTENT_SECURITY_POLICY,
        csp_value,
    ))
}

/// Start the server
///
/// Seeds the default data files and rebuilds `summary.json` from the
/// categorized file before accepting requests.
pub async fn serve(settings: Settings, config: ServerConfig) -> anyhow::Result<()> {
    if config.credentials.is_none() {
        warn!("⚠️  Authentication disabled - do not expose to network!");
    }

    let store = DataStore::new(&settings.data_dir);
    store.seed_defaults()?;
    match regenerate_summary(&store, &settings) {
        Ok(summary) => info!(months = summary.monthly_overview.len(), "Summary regenerated"),
        Err(e) => warn!("Failed to regenerate summary: {}", e),
    }

    check_ai_connection(&settings).await;

    let static_dir = settings.server.static_dir.clone();
    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let app = create_router(store, settings, static_dir.as_deref(), config);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Check and log AI backend connection status
async fn check_ai_connection(settings: &Settings) {
    match AIClient::from_settings(&settings.ai) {
        Some(client) => {
            if client.health_check().await {
                info!(
                    "✅ AI backend connected: {} (model: {})",
                    client.host(),
                    client.model()
                );
            } else {
                warn!(
                    "⚠️  AI backend configured but not responding: {} (model: {})",
                    client.host(),
                    client.model()
                );
            }
        }
        None => {
            info!("ℹ️  AI backend not configured, the ai classifier is unavailable");
        }
    }
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map a core error: lookups become 404, bad input 400, the rest 500
    pub fn core(err: spendlens_core::Error) -> Self {
        use spendlens_core::Error;
        match err {
            Error::NotFound(msg) => Self::not_found(&format!("Not found: {}", msg)),
            err @ (Error::UnsupportedFormat(_) | Error::Config(_)) => {
                Self::bad_request(&err.to_string())
            }
            other => other.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

/// Generic success response
#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}
