//! AidBoard API Gateway
//!
//! HTTP entry point for the dashboard:
//! - Project CRUD and filtered listing
//! - Reference entity lists
//! - Dashboard breakdowns, KPIs and the optional AI summary
//! - Observability (logging, metrics, request ids)

mod handlers;
mod middleware;

use aidboard_common::{
    config::AppConfig,
    db::{schema::ensure_schema, DbPool},
    metrics, telemetry, AggregationService, Repository, SummaryService,
};
use axum::{
    http::StatusCode,
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub aggregation: AggregationService,
    pub summary: SummaryService,
}

impl AppState {
    fn new(config: Arc<AppConfig>, pool: DbPool, summary: SummaryService) -> Self {
        Self {
            config,
            repository: Repository::new(pool.clone()),
            aggregation: AggregationService::new(pool),
            summary,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    telemetry::init_tracing(&config.observability);
    info!(
        service = %config.observability.service_name,
        "Starting AidBoard API Gateway v{}",
        aidboard_common::VERSION
    );

    if config.observability.metrics_port != 0 {
        install_metrics_exporter(config.observability.metrics_port)?;
    }
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let pool = DbPool::new(&config.database).await?;
    if config.database.auto_migrate {
        ensure_schema(pool.write()).await?;
    }

    let summary = SummaryService::from_config(AggregationService::new(pool.clone()), &config)?;
    let state = AppState::new(config.clone(), pool, summary);

    let app = create_router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Serve Prometheus metrics on their own port
fn install_metrics_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            metrics::LATENCY_BUCKETS,
        )?
        .install()?;

    info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        // Projects
        .route(
            "/projects",
            get(handlers::projects::list_projects).post(handlers::projects::create_project),
        )
        .route(
            "/projects/{id}",
            get(handlers::projects::get_project)
                .put(handlers::projects::update_project)
                .delete(handlers::projects::delete_project),
        )
        .route("/projects/country/{name}", get(handlers::projects::projects_by_country))
        .route("/projects/status/{status}", get(handlers::projects::projects_by_status))

        // Reference entities
        .route("/countries", get(handlers::references::list_countries))
        .route("/org-units", get(handlers::references::list_org_units))
        .route("/themes", get(handlers::references::list_themes))
        .route("/donors", get(handlers::references::list_donors))

        // Dashboard
        .route("/dashboard/countries", get(handlers::dashboard::count_by_country))
        .route("/dashboard/org-units", get(handlers::dashboard::count_by_org_unit))
        .route("/dashboard/themes", get(handlers::dashboard::count_by_theme))
        .route("/dashboard/values/{dimension}", get(handlers::dashboard::value_by_dimension))
        .route("/dashboard/summary", get(handlers::dashboard::kpi_summary))
        .route("/dashboard/ai-summary", post(handlers::dashboard::ai_summary));

    let timeout = state.config.request_timeout();
    let max_concurrent = state.config.server.max_concurrent_requests;

    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .nest("/api", api_routes)
        // Inside routing so the matched route template is known
        .route_layer(axum::middleware::from_fn(middleware::metrics::track_requests))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(PropagateRequestIdLayer::x_request_id())
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(timeout_layer(timeout))
                // Concurrency limit for backpressure
                .layer(ConcurrencyLimitLayer::new(max_concurrent)),
        )
        .with_state(state)
}

/// Slow requests are answered with 408 Request Timeout
fn timeout_layer(timeout: Duration) -> TimeoutLayer {
    TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, timeout)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aidboard_common::summary::TextGenerator;
    use async_trait::async_trait;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct CannedGenerator;

    #[async_trait]
    impl TextGenerator for CannedGenerator {
        async fn generate(&self, _system: &str, prompt: &str) -> aidboard_common::Result<String> {
            Ok(format!("{} chars of figures", prompt.len()))
        }

        fn model_name(&self) -> &str {
            "canned"
        }
    }

    async fn app_with(generator: Option<Arc<dyn TextGenerator>>) -> Router {
        let pool = DbPool::connect_url("sqlite::memory:").await.unwrap();
        ensure_schema(pool.write()).await.unwrap();
        let summary = SummaryService::new(AggregationService::new(pool.clone()), generator);
        create_router(AppState::new(Arc::new(AppConfig::default()), pool, summary))
    }

    async fn app() -> Router {
        app_with(None).await
    }

    /// Decimals serialize as strings
    fn decimal(value: &Value) -> f64 {
        value.as_str().unwrap().parse().unwrap()
    }

    async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }

    #[tokio::test]
    async fn test_health_and_ready() {
        let app = app().await;
        let (status, body) = send(&app, Method::GET, "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");

        let (status, body) = send(&app, Method::GET, "/ready", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["checks"]["database"]["status"], "up");
        assert_eq!(body["checks"]["ai_summary"]["status"], "disabled");
    }

    #[tokio::test]
    async fn test_slow_request_times_out_with_408() {
        let app = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "done"
                }),
            )
            .layer(timeout_layer(Duration::from_millis(20)));

        let (status, _) = send(&app, Method::GET, "/slow", None).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
    }

    #[tokio::test]
    async fn test_project_crud_roundtrip() {
        let app = app().await;

        let (status, created) = send(
            &app,
            Method::POST,
            "/api/projects",
            Some(json!({
                "title": "Clean water",
                "external_id": "P-1",
                "country": "Kenya",
                "themes": ["Water", "Health"],
                "total_contribution": "100",
                "total_expenditure": "40"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["country"]["name"], "Kenya");
        assert_eq!(created["themes"][0]["name"], "Health");
        assert_eq!(created["status"], "Approved");
        assert_eq!(decimal(&created["total_contribution_expenditure_diff"]), 60.0);

        let id = created["id"].as_str().unwrap().to_string();
        let uri = format!("/api/projects/{}", id);

        let (status, updated) = send(
            &app,
            Method::PUT,
            &uri,
            Some(json!({"title": "Clean water II", "external_id": "P-1", "country": "KENYA"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(updated["title"], "Clean water II");
        assert_eq!(updated["country"]["name"], "Kenya");
        assert_eq!(updated["themes"], json!([]));

        let (status, _) = send(&app, Method::DELETE, &uri, None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (status, body) = send(&app, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "PROJECT_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_duplicate_external_id_conflicts() {
        let app = app().await;
        let body = json!({"title": "A", "external_id": "X-1"});

        let (status, _) = send(&app, Method::POST, "/api/projects", Some(body.clone())).await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, body) = send(&app, Method::POST, "/api/projects", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["error"]["code"], "DUPLICATE_EXTERNAL_ID");
    }

    #[tokio::test]
    async fn test_validation_errors_are_bad_requests() {
        let app = app().await;

        let (status, body) = send(
            &app,
            Method::POST,
            "/api/projects",
            Some(json!({"title": "A", "start_date": "2024-05-01", "end_date": "2024-01-01"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "VALIDATION_ERROR");

        let (status, _) = send(&app, Method::GET, "/api/projects/status/paused", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, Method::GET, "/api/dashboard/values/region", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_filters_and_lookups() {
        let app = app().await;
        for (title, country, status) in [
            ("Water for Kenya", "Kenya", "Approved"),
            ("Schools", "Peru", "Completed"),
            ("More water", "kenya", "Completed"),
        ] {
            let (code, _) = send(
                &app,
                Method::POST,
                "/api/projects",
                Some(json!({"title": title, "country": country, "status": status})),
            )
            .await;
            assert_eq!(code, StatusCode::CREATED);
        }

        let (_, body) = send(&app, Method::GET, "/api/projects?search=WATER", None).await;
        assert_eq!(body.as_array().unwrap().len(), 2);

        let (_, body) = send(&app, Method::GET, "/api/projects?country=KENYA&status=completed", None).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
        assert_eq!(body[0]["title"], "More water");

        let (status, body) = send(&app, Method::GET, "/api/projects/country/peru", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 1);

        let (status, body) = send(&app, Method::GET, "/api/projects/country/Chad", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "COUNTRY_NOT_FOUND");

        let (_, body) = send(&app, Method::GET, "/api/countries", None).await;
        let names: Vec<&str> = body.as_array().unwrap().iter().map(|c| c["name"].as_str().unwrap()).collect();
        assert_eq!(names, vec!["Kenya", "Peru"]);
    }

    #[tokio::test]
    async fn test_dashboard_endpoints() {
        let app = app().await;
        for (title, country, pag) in [("A", "Kenya", "100"), ("B", "Kenya", "50.25"), ("C", "Chad", "10")] {
            send(
                &app,
                Method::POST,
                "/api/projects",
                Some(json!({"title": title, "country": country, "pag_value": pag})),
            )
            .await;
        }

        let (_, body) = send(&app, Method::GET, "/api/dashboard/countries", None).await;
        assert_eq!(body, json!([{"name": "Kenya", "count": 2}, {"name": "Chad", "count": 1}]));

        let (status, body) = send(&app, Method::GET, "/api/dashboard/values/countries", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["name"], "Kenya");
        assert_eq!(decimal(&body[0]["value"]), 150.25);

        let (status, _) = send(&app, Method::GET, "/api/dashboard/values/country?field=total_psc", None).await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = send(&app, Method::GET, "/api/dashboard/summary", None).await;
        assert_eq!(body["total_projects"], 3);
        assert_eq!(body["countries"], 2);
        assert_eq!(body["themes"], 0);
    }

    #[tokio::test]
    async fn test_ai_summary_outcomes() {
        let (status, body) = send(&app().await, Method::POST, "/api/dashboard/ai-summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "unavailable");

        let generator = Arc::new(CannedGenerator) as Arc<dyn TextGenerator>;
        let app = app_with(Some(generator)).await;
        let (status, body) = send(&app, Method::POST, "/api/dashboard/ai-summary", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "available");
        assert_eq!(body["model"], "canned");
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let app = app().await;
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }
}
