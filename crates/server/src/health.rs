use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use zapys_db::DbPool;

#[derive(Clone)]
struct HealthState {
    db_pool: DbPool,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub database: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Probes the schema, not just connectivity: a reachable pool with pending
/// migrations is still an unusable server.
async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let probe = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'appointments'",
    )
    .fetch_one(&state.db_pool)
    .await;

    let checked_at = Utc::now().to_rfc3339();
    let (code, report) = match probe {
        Ok(1) => (
            StatusCode::OK,
            HealthReport { status: "ready", database: "ready", detail: None, checked_at },
        ),
        Ok(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthReport {
                status: "degraded",
                database: "unmigrated",
                detail: Some("appointments table is missing".to_string()),
                checked_at,
            },
        ),
        Err(error) => (
            StatusCode::SERVICE_UNAVAILABLE,
            HealthReport {
                status: "degraded",
                database: "unreachable",
                detail: Some(error.to_string()),
                checked_at,
            },
        ),
    };
    (code, Json(report))
}

#[cfg(test)]
mod tests {
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::util::ServiceExt;

    use zapys_db::{connect_with_settings, migrations};

    use super::router;

    async fn report(app: axum::Router) -> (StatusCode, Value) {
        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        (status, serde_json::from_slice(&bytes).expect("json"))
    }

    #[tokio::test]
    async fn health_is_ready_once_migrations_have_run() {
        let pool = connect_with_settings("sqlite:file:health_ready?mode=memory&cache=shared", 1, 5)
            .await
            .expect("pool should connect");
        migrations::run_pending(&pool).await.expect("migrations");

        let (status, payload) = report(router(pool.clone())).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload["status"], "ready");
        assert_eq!(payload["database"], "ready");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_reports_unmigrated_schema_as_degraded() {
        let pool =
            connect_with_settings("sqlite:file:health_unmigrated?mode=memory&cache=shared", 1, 5)
                .await
                .expect("pool should connect");

        let (status, payload) = report(router(pool.clone())).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["status"], "degraded");
        assert_eq!(payload["database"], "unmigrated");

        pool.close().await;
    }

    #[tokio::test]
    async fn health_reports_unreachable_database_as_degraded() {
        let pool =
            connect_with_settings("sqlite:file:health_closed?mode=memory&cache=shared", 1, 5)
                .await
                .expect("pool should connect");
        pool.close().await;

        let (status, payload) = report(router(pool)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload["database"], "unreachable");
    }
}
