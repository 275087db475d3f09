use axum::{extract::State, http::StatusCode, response::Json};
use diesel::{sql_query, RunQueryDsl};
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let database = match state.db() {
        Ok(mut conn) => sql_query("SELECT 1")
            .execute(&mut conn)
            .map(|_| ())
            .map_err(|err| err.to_string()),
        Err(err) => Err(err.message().to_string()),
    };
    let storage = state.store.check().await.map_err(|err| err.to_string());

    let status = if database.is_ok() && storage.is_ok() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let report = |result: &Result<(), String>| match result {
        Ok(()) => json!("ok"),
        Err(err) => json!({ "error": err }),
    };

    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "database": report(&database),
            "storage": {
                "backend": state.store.kind(),
                "state": report(&storage),
            },
        })),
    )
}
