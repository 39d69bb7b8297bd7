/**
 * HTTP API - Snapshot reads, operator actions, subscription upgrade
 *
 * ROLE:
 * The outer surface of the kernel. Dashboards read collections or the
 * combined snapshot, operators register entities and clear alerts/logs,
 * and /ws hands out a live subscription.
 *
 * HOW IT WORKS:
 * - every read goes through StateStore (one lock, consistent copy)
 * - every write goes through a StateStore operation, which publishes
 * - POST /api/refresh runs the on-demand cycle and answers once it is done
 * - bind: host:port, one retry on port+1, then KernelError::Bind
 */

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use sysdash_probe::ResourceSummary;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::error::KernelError;
use crate::health::{HealthTracker, KernelHealth};
use crate::models::{
    AlertEvent, ApplicationRecord, LogEntry, NetworkSnapshot, NewApplication, NewServer, ServerRecord, Snapshot,
};
use crate::scheduler::{CycleOutcome, Scheduler};
use crate::state::StateStore;

#[derive(Clone)]
pub struct AppState {
    pub store: StateStore,
    pub scheduler: Scheduler,
    pub health: HealthTracker,
}

#[derive(Serialize)]
struct RefreshReply {
    outcome: CycleOutcome,
    snapshot: Snapshot,
}

impl IntoResponse for KernelError {
    fn into_response(self) -> Response {
        let status = match &self {
            KernelError::NotFound(_) => StatusCode::NOT_FOUND,
            KernelError::Bind { .. } | KernelError::Address(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE])
        .allow_headers(Any);

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/api/health", get(get_health))
        .route("/api/system-info", get(get_system_info))
        .route("/api/snapshot", get(get_snapshot))
        .route("/api/servers", get(get_servers).post(create_server))
        .route("/api/applications", get(get_applications).post(create_application))
        .route("/api/network", get(get_network))
        .route("/api/alerts", get(get_alerts).delete(clear_alerts))
        .route("/api/alerts/{id}", axum::routing::delete(delete_alert))
        .route("/api/logs", get(get_logs).delete(clear_logs))
        .route("/api/refresh", post(refresh))
        .route("/ws", get(crate::ws::ws_handler))
        .with_state(app_state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}

// GET /api/health
async fn get_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health.get_health(&app.store))
}

// GET /api/system-info (sysinfo refresh blocks, keep it off the runtime threads)
async fn get_system_info(State(app): State<AppState>) -> Result<Json<ResourceSummary>, StatusCode> {
    let started = app.health.started_at();
    tokio::task::spawn_blocking(move || ResourceSummary::collect(started))
        .await
        .map(Json)
        .map_err(|e| {
            error!("system info task failed: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })
}

// GET /api/snapshot (logs trimmed to the client window)
async fn get_snapshot(State(app): State<AppState>) -> Json<Snapshot> {
    Json(app.store.client_snapshot())
}

async fn get_servers(State(app): State<AppState>) -> Json<Vec<ServerRecord>> {
    Json(app.store.servers())
}

async fn get_applications(State(app): State<AppState>) -> Json<Vec<ApplicationRecord>> {
    Json(app.store.applications())
}

async fn get_network(State(app): State<AppState>) -> Json<NetworkSnapshot> {
    Json(app.store.network())
}

async fn get_alerts(State(app): State<AppState>) -> Json<Vec<AlertEvent>> {
    Json(app.store.alerts())
}

async fn get_logs(State(app): State<AppState>) -> Json<Vec<LogEntry>> {
    Json(app.store.recent_logs())
}

// POST /api/servers
async fn create_server(
    State(app): State<AppState>,
    Json(new): Json<NewServer>,
) -> (StatusCode, Json<ServerRecord>) {
    (StatusCode::CREATED, Json(app.store.register_server(new)))
}

// POST /api/applications
async fn create_application(
    State(app): State<AppState>,
    Json(new): Json<NewApplication>,
) -> (StatusCode, Json<ApplicationRecord>) {
    (StatusCode::CREATED, Json(app.store.register_application(new)))
}

// DELETE /api/alerts/{id}
async fn delete_alert(
    State(app): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, KernelError> {
    if app.store.remove_alert(&id) {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(KernelError::NotFound(format!("alert {id}")))
    }
}

// DELETE /api/alerts
async fn clear_alerts(State(app): State<AppState>) -> StatusCode {
    app.store.clear_alerts();
    StatusCode::NO_CONTENT
}

// DELETE /api/logs
async fn clear_logs(State(app): State<AppState>) -> StatusCode {
    app.store.clear_logs();
    StatusCode::NO_CONTENT
}

// POST /api/refresh
async fn refresh(State(app): State<AppState>) -> Json<RefreshReply> {
    let outcome = app.scheduler.refresh().await;
    Json(RefreshReply { outcome, snapshot: app.store.client_snapshot() })
}

/// Bind `host:port`; if that fails, try `port + 1` once.
pub async fn bind_with_retry(host: &str, port: u16) -> Result<TcpListener, KernelError> {
    let ip: IpAddr = host.parse().map_err(|_| KernelError::Address(host.to_string()))?;
    let primary = SocketAddr::new(ip, port);

    match TcpListener::bind(primary).await {
        Ok(listener) => Ok(listener),
        Err(first) => {
            let Some(next) = port.checked_add(1) else {
                return Err(KernelError::Bind { addr: primary, source: first });
            };
            let fallback = SocketAddr::new(ip, next);
            warn!("cannot bind {}: {}, trying {}", primary, first, fallback);
            TcpListener::bind(fallback)
                .await
                .map_err(|source| KernelError::Bind { addr: fallback, source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertRules;
    use crate::collector::Collect;
    use crate::config::{LimitsConf, ScheduleConf};
    use crate::hub::BroadcastHub;
    use crate::models::{ServerMetricsUpdate, Severity, LOCAL_SERVER_ID};
    use crate::state::CycleReadings;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use futures::future::BoxFuture;
    use serde_json::Value;
    use tower::ServiceExt;

    struct Fixed;

    impl Collect for Fixed {
        fn collect(&self) -> BoxFuture<'_, CycleReadings> {
            Box::pin(async {
                CycleReadings {
                    server_id: LOCAL_SERVER_ID.into(),
                    server: ServerMetricsUpdate { cpu_percent: Some(64.0), ..Default::default() },
                    applications: Some(Vec::new()),
                    ..Default::default()
                }
            })
        }
    }

    fn app_state() -> AppState {
        let identity = sysdash_probe::HostIdentity { hostname: "node-a".into(), primary_ipv4: "10.9.8.7".into() };
        let store = StateStore::seeded(BroadcastHub::new(64), &LimitsConf::default(), &identity);
        let health = HealthTracker::new();
        let scheduler = Scheduler::new(
            store.clone(),
            Box::new(Fixed),
            AlertRules::default(),
            health.clone(),
            &ScheduleConf::default(),
        );
        AppState { store, scheduler, health }
    }

    async fn call(app: Router, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
        let mut req = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(b) => {
                req = req.header("content-type", "application/json");
                Body::from(b.to_string())
            }
            None => Body::empty(),
        };
        let resp = app.oneshot(req.body(body).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_is_plain_ok() {
        let resp = build_router(app_state())
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ok");
    }

    #[tokio::test]
    async fn snapshot_lists_seeded_host() {
        let (status, json) = call(build_router(app_state()), "GET", "/api/snapshot", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["servers"][0]["id"], LOCAL_SERVER_ID);
        assert_eq!(json["servers"][0]["name"], "node-a");
        assert_eq!(json["logs"][0]["message"], "Dashboard server started");
        assert!(json["alerts"].as_array().unwrap().is_empty());
    }

    #[tokio::test]
    async fn register_server_then_list() {
        let state = app_state();
        let body = r#"{"name":"db-1","address":"10.0.0.20","status":"warning"}"#;
        let (status, created) = call(build_router(state.clone()), "POST", "/api/servers", Some(body)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(created["id"].as_str().unwrap().starts_with("srv-"));
        assert_eq!(created["status"], "warning");

        let (_, list) = call(build_router(state), "GET", "/api/servers", None).await;
        assert_eq!(list.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_json_is_rejected() {
        let (status, _) = call(build_router(app_state()), "POST", "/api/applications", Some("{name:")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn delete_alert_by_id_and_unknown() {
        let state = app_state();
        let alert = AlertEvent::new(Severity::Critical, "High CPU usage on node-a: 97%");
        let id = alert.id.clone();
        state.store.append_alert(alert);

        let (status, _) = call(build_router(state.clone()), "DELETE", &format!("/api/alerts/{id}"), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(state.store.alerts().is_empty());

        let (status, json) = call(build_router(state), "DELETE", &format!("/api/alerts/{id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains(&id));
    }

    #[tokio::test]
    async fn clear_alerts_and_logs() {
        let state = app_state();
        state.store.append_alert(AlertEvent::new(Severity::Warning, "High network latency: 150ms"));

        let (status, _) = call(build_router(state.clone()), "DELETE", "/api/alerts", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        let (status, _) = call(build_router(state.clone()), "DELETE", "/api/logs", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        assert!(state.store.alerts().is_empty());
        assert!(state.store.recent_logs().is_empty());
    }

    #[tokio::test]
    async fn refresh_runs_a_cycle() {
        let state = app_state();
        let (status, json) = call(build_router(state.clone()), "POST", "/api/refresh", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["outcome"], "completed");
        assert_eq!(json["snapshot"]["servers"][0]["cpu_percent"], 64.0);

        let (_, health) = call(build_router(state), "GET", "/api/health", None).await;
        assert_eq!(health["fast_cycles_completed"], 1);
    }

    #[tokio::test]
    async fn system_info_has_host_facts() {
        let (status, json) = call(build_router(app_state()), "GET", "/api/system-info", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["cpus"].as_u64().unwrap() >= 1);
        assert_eq!(json["platform"], std::env::consts::OS);
        assert!(json["total_memory"].as_u64().unwrap() > 0);
        assert!(json["process_uptime_seconds"].is_u64());
    }

    #[tokio::test]
    async fn bind_falls_back_to_next_port() {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }
        // port + 1 may itself be taken on a busy host; only check the fallback when it is free
        if std::net::TcpListener::bind(("127.0.0.1", port.wrapping_add(1))).is_err() {
            return;
        }
        let listener = bind_with_retry("127.0.0.1", port).await.unwrap();
        assert_eq!(listener.local_addr().unwrap().port(), port + 1);
    }

    #[tokio::test]
    async fn bind_fails_when_both_ports_taken() {
        let first = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = first.local_addr().unwrap().port();
        let Ok(_second) = TcpListener::bind(("127.0.0.1", port.wrapping_add(1))).await else {
            return;
        };
        let err = bind_with_retry("127.0.0.1", port).await.unwrap_err();
        assert!(matches!(err, KernelError::Bind { .. }));
    }

    #[tokio::test]
    async fn bad_host_is_an_address_error() {
        let err = bind_with_retry("not-an-ip", 3000).await.unwrap_err();
        assert!(matches!(err, KernelError::Address(_)));
    }
}
