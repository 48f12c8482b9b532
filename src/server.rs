// HTTP API: arrivals, dashboard layout state, health

use actix_cors::Cors;
use actix_web::{App, HttpResponse, HttpServer, middleware, web};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::countdown::current_timestamp;
use crate::layout::LayoutStore;
use crate::models::{ApiFailure, ArrivalsResponse};
use crate::service::ArrivalService;

pub const LAYOUT_KEY: &str = "dashboard-layout-v1";
const LAYOUT_VERSION: u32 = 1;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ArrivalService>,
    pub layout: Arc<dyn LayoutStore>,
    pub station: String,
}

#[derive(Serialize)]
struct ApiResponse<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    timestamp: i64,
}

impl<T: Serialize> ApiResponse<T> {
    fn success(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

impl ApiResponse<()> {
    fn message(message: &str) -> Self {
        ApiResponse {
            success: true,
            data: None,
            error: None,
            message: Some(message.to_string()),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    fn error(error: &str, message: Option<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(error.to_string()),
            message,
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

// ============================================================================
// Arrivals
// ============================================================================

async fn get_arrivals(state: web::Data<AppState>) -> HttpResponse {
    let now = current_timestamp();
    let view = state.service.refresh_if_stale(now).await;

    match (&view.last_failure, &view.snapshot) {
        (Some(failure), _) => {
            error!(error = %failure.message, "Serving arrivals failure");
            HttpResponse::InternalServerError().json(ApiFailure {
                error: "Failed to fetch train data".to_string(),
                message: failure.message.clone(),
            })
        }
        (None, Some(snapshot)) => {
            HttpResponse::Ok().json(ArrivalsResponse::from_snapshot(&state.station, snapshot, now))
        }
        (None, None) => HttpResponse::InternalServerError().json(ApiFailure {
            error: "Failed to fetch train data".to_string(),
            message: "No arrival data available yet".to_string(),
        }),
    }
}

// ============================================================================
// Dashboard Layout State
// ============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StoredLayout<'a> {
    layout: &'a serde_json::Value,
    saved_at: i64,
    version: u32,
}

async fn get_dashboard_state(state: web::Data<AppState>) -> HttpResponse {
    let data = match state.layout.get(LAYOUT_KEY) {
        Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(error = %e, "Stored layout is not valid JSON, ignoring it");
            serde_json::Value::Null
        }),
        None => serde_json::Value::Null,
    };
    HttpResponse::Ok().json(ApiResponse::success(data))
}

async fn save_dashboard_state(state: web::Data<AppState>, body: web::Bytes) -> HttpResponse {
    let layout = serde_json::from_slice::<serde_json::Value>(&body)
        .ok()
        .and_then(|mut v| v.get_mut("layout").map(serde_json::Value::take))
        .filter(|l| !l.is_null());

    let Some(layout) = layout else {
        return HttpResponse::BadRequest().json(ApiResponse::error("Missing layout data", None));
    };

    let stored = StoredLayout {
        layout: &layout,
        saved_at: Utc::now().timestamp_millis(),
        version: LAYOUT_VERSION,
    };
    let encoded = match serde_json::to_vec(&stored) {
        Ok(encoded) => encoded,
        Err(e) => {
            error!(error = %e, "Failed to encode layout");
            return HttpResponse::InternalServerError()
                .json(ApiResponse::error("Internal server error", Some(e.to_string())));
        }
    };

    if state.layout.set(LAYOUT_KEY, encoded.into()) {
        HttpResponse::Ok().json(ApiResponse::message("State saved"))
    } else {
        HttpResponse::InternalServerError().json(ApiResponse::error(
            "Internal server error",
            Some("Failed to persist layout".to_string()),
        ))
    }
}

async fn method_not_allowed() -> HttpResponse {
    HttpResponse::MethodNotAllowed().json(ApiResponse::error("Method not allowed", None))
}

// ============================================================================
// Health
// ============================================================================

async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let now = current_timestamp();
    let view = state.service.store().view();
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "Subway Arrivals Board",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": now,
        "snapshotAgeSecs": view.snapshot_age(now),
        "lastError": view.last_failure.map(|f| f.message),
    }))
}

// ============================================================================
// Server Setup
// ============================================================================

pub fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health_check))
        .route("/api/arrivals", web::get().to(get_arrivals))
        .service(
            web::resource("/api/dashboard-state")
                .route(web::get().to(get_dashboard_state))
                .route(web::post().to(save_dashboard_state))
                .default_service(web::to(method_not_allowed)),
        );
}

pub async fn run_server(state: AppState, bind: &str, port: u16) -> std::io::Result<()> {
    info!(bind, port, "Starting HTTP server");
    info!("  GET  /api/arrivals        - Upcoming arrivals per line");
    info!("  GET  /api/dashboard-state - Saved dashboard layout");
    info!("  POST /api/dashboard-state - Save dashboard layout");
    info!("  GET  /health              - Health check");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(Cors::permissive())
            .wrap(middleware::Logger::default())
            .wrap(middleware::Compress::default())
            .configure(routes)
    })
    .bind((bind, port))?
    .run()
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::MemoryLayoutStore;
    use crate::service::tests::FakeSource;
    use crate::store::ArrivalStore;
    use actix_web::http::StatusCode;
    use actix_web::test;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn state(source: Arc<FakeSource>) -> AppState {
        AppState {
            service: Arc::new(ArrivalService::new(
                source,
                Arc::new(ArrivalStore::new()),
                Duration::from_secs(30),
            )),
            layout: Arc::new(MemoryLayoutStore::new()),
            station: "Grand St".to_string(),
        }
    }

    #[actix_web::test]
    async fn test_arrivals_endpoint() {
        let source = Arc::new(FakeSource::new(905));
        let app = test::init_service(
            App::new().app_data(web::Data::new(state(source.clone()))).configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/arrivals").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;

        assert_eq!(body["station"], "Grand St");
        assert_eq!(body["stopId"], "D21N");
        assert_eq!(body["arrivals"]["B"][0]["minutes"], 15);
        assert_eq!(body["arrivals"]["D"], serde_json::json!([]));

        // a second request inside the poll interval is served from the store
        let req = test::TestRequest::get().uri("/api/arrivals").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[actix_web::test]
    async fn test_arrivals_failure_is_500() {
        let source = Arc::new(FakeSource::new(600));
        source.fail.store(true, Ordering::SeqCst);
        let app = test::init_service(
            App::new().app_data(web::Data::new(state(source))).configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/arrivals").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Failed to fetch train data");
        assert_eq!(body["message"], "Transport error: connection refused");
    }

    #[actix_web::test]
    async fn test_dashboard_state_round_trip() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(Arc::new(FakeSource::new(600)))))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::get().uri("/api/dashboard-state").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert!(body["data"].is_null());

        let req = test::TestRequest::post()
            .uri("/api/dashboard-state")
            .set_json(serde_json::json!({ "layout": [{ "id": "subway", "x": 0, "y": 0 }] }))
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "State saved");

        let req = test::TestRequest::get().uri("/api/dashboard-state").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["data"]["layout"][0]["id"], "subway");
        assert_eq!(body["data"]["version"], 1);
        assert!(body["data"]["savedAt"].is_i64());
    }

    #[actix_web::test]
    async fn test_dashboard_state_rejects_missing_layout() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(state(Arc::new(FakeSource::new(600)))))
                .configure(routes),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/api/dashboard-state")
            .set_json(serde_json::json!({ "widgets": [] }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["error"], "Missing layout data");

        let req = test::TestRequest::delete().uri("/api/dashboard-state").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
    }
}
