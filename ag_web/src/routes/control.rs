//! ABOUTME: Control API handlers: add/cancel/status/list plus health
//! ABOUTME: Thin wrappers over `ag_pipeline::Registry`, wire contract in the `{code, msg}` envelope

use crate::error::{ApiError, ApiResult};
use crate::models::{
    envelope_ok, envelope_ok_with, AddControlRequest, ControlBody, ControlCodeRequest, ControlsListBody,
};
use crate::AppState;
use actix_web::{get, post, web, HttpResponse};
use serde_json::json;
use tracing::info;
use validator::Validate;

/// `POST /api/controls` — snapshot every live control.
#[post("/controls")]
pub async fn list_controls(state: web::Data<AppState>) -> ApiResult<HttpResponse> {
    let data = state.registry.list();
    Ok(HttpResponse::Ok().json(envelope_ok_with(ControlsListBody { data })))
}

/// `POST /api/control` — snapshot one control by code. 404 if unknown.
#[post("/control")]
pub async fn get_control(
    state: web::Data<AppState>,
    body: web::Json<ControlCodeRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;

    if !state.registry.contains(&body.code) {
        return Err(ApiError::not_found(format!("no control with code {}", body.code)));
    }

    let control = state.registry.status(&body.code);
    Ok(HttpResponse::Ok().json(envelope_ok_with(ControlBody { control })))
}

/// `POST /api/control/add` — register and start a new detection pipeline.
#[post("/control/add")]
pub async fn add_control(
    state: web::Data<AppState>,
    body: web::Json<AddControlRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;
    let req = body.into_inner();

    state.registry.add(
        req.code.clone(),
        req.behavior_code,
        req.stream_url,
        req.push_stream,
        req.push_stream_url,
    )?;

    info!(code = %req.code, "control added via API");
    Ok(HttpResponse::Ok().json(envelope_ok()))
}

/// `POST /api/control/cancel` — request graceful shutdown of a control.
#[post("/control/cancel")]
pub async fn cancel_control(
    state: web::Data<AppState>,
    body: web::Json<ControlCodeRequest>,
) -> ApiResult<HttpResponse> {
    body.validate()?;

    let (stopped, msg) = state.registry.cancel(&body.code).await;
    if stopped {
        info!(code = %body.code, "control cancelled via API");
        Ok(HttpResponse::Ok().json(envelope_ok()))
    } else {
        Err(ApiError::bad_request(msg))
    }
}

/// `GET /health`
#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "active_detections": state.registry.active_count(),
        "logLevel": state.config.server.log_level,
        "alarmDbPath": state.config.pipeline.alarm_db_path,
    }))
}
