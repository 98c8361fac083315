#![warn(unreachable_pub)]
//! The `/x-nmos/connection/<api_version>/` HTTP surface over [`core`]'s engine.
//!
//! Routing, request/response marshalling and CORS/tracing middleware live here; schema
//! validation of request bodies, device registry publishing and the concrete SDP-driver
//! factory remain external collaborators this layer doesn't reach into.

mod error;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use core::bulk::{BulkDispatcher, BulkEntry, BulkResult};
use core::error::ConnectionError;
use core::registry::{ApiVersion, PatchBody, PatchOutcome, Registry, Transport, TransceiverKind};
use error::ApiError;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/x-nmos/", get(|| async { Json(json!(["connection/"])) }))
        .route(
            "/x-nmos/connection/",
            get(|| async { Json(json!(["v1.0/", "v1.1/"])) }),
        )
        .route("/x-nmos/connection/{version}/", get(version_index))
        .route("/x-nmos/connection/{version}/single/", get(single_index))
        .route("/x-nmos/connection/{version}/single/{kind}/", get(kind_index))
        .route(
            "/x-nmos/connection/{version}/single/{kind}/{id}/",
            get(transceiver_index),
        )
        .route(
            "/x-nmos/connection/{version}/single/{kind}/{id}/constraints/",
            get(constraints),
        )
        .route(
            "/x-nmos/connection/{version}/single/{kind}/{id}/staged/",
            get(get_staged).patch(patch_staged),
        )
        .route(
            "/x-nmos/connection/{version}/single/{kind}/{id}/active/",
            get(get_active),
        )
        .route(
            "/x-nmos/connection/{version}/single/senders/{id}/transportfile/",
            get(transport_file),
        )
        .route(
            "/x-nmos/connection/{version}/single/{kind}/{id}/transporttype/",
            get(transport_type),
        )
        .route("/x-nmos/connection/{version}/bulk/{kind}", post(bulk))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

fn parse_version(s: &str) -> Result<ApiVersion, ApiError> {
    match s {
        "v1.0" => Ok(ApiVersion::V1_0),
        "v1.1" => Ok(ApiVersion::V1_1),
        _ => Err(ApiError::new(ConnectionError::not_found(format!(
            "unknown API version '{s}'"
        )))),
    }
}

fn parse_kind(s: &str) -> Result<TransceiverKind, ApiError> {
    match s {
        "senders" => Ok(TransceiverKind::Sender),
        "receivers" => Ok(TransceiverKind::Receiver),
        _ => Err(ApiError::new(ConnectionError::not_found(format!(
            "unknown transceiver kind '{s}'"
        )))),
    }
}

async fn version_index(Path(version): Path<String>) -> Result<impl IntoResponse, ApiError> {
    parse_version(&version)?;
    Ok(Json(json!(["single/", "bulk/"])))
}

async fn single_index(Path(version): Path<String>) -> Result<impl IntoResponse, ApiError> {
    parse_version(&version)?;
    Ok(Json(json!(["senders/", "receivers/"])))
}

async fn kind_index(
    State(state): State<AppState>,
    Path((version, kind)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    parse_version(&version)?;
    let kind = parse_kind(&kind)?;
    let ids = match kind {
        TransceiverKind::Sender => state.registry.sender_ids(),
        TransceiverKind::Receiver => state.registry.receiver_ids(),
    };
    Ok(Json(json!(ids.into_iter().map(|id| format!("{id}/")).collect::<Vec<_>>())))
}

async fn transceiver_index(
    State(state): State<AppState>,
    Path((version, kind, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    let transceiver_kind = parse_kind(&kind)?;
    lookup_transport(&state, api_version, transceiver_kind, &id, format!("single/{kind}/{id}/"))?;

    let mut entries = vec!["constraints/", "staged/", "active/"];
    if transceiver_kind == TransceiverKind::Sender {
        entries.push("transportfile/");
    }
    if api_version == ApiVersion::V1_1 {
        entries.push("transporttype/");
    }
    Ok(Json(json!(entries)))
}

fn lookup_transport(
    state: &AppState,
    api_version: ApiVersion,
    kind: TransceiverKind,
    id: &str,
    path_after_version: impl Into<String>,
) -> Result<Transport, ApiError> {
    let result = match kind {
        TransceiverKind::Sender => state.registry.sender_transport(api_version, id),
        TransceiverKind::Receiver => state.registry.receiver_transport(api_version, id),
    };
    result.map_err(|e| ApiError::with_path(e, path_after_version.into()))
}

async fn constraints(
    State(state): State<AppState>,
    Path((version, kind, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    let transceiver_kind = parse_kind(&kind)?;
    lookup_transport(
        &state,
        api_version,
        transceiver_kind,
        &id,
        format!("single/{kind}/{id}/constraints/"),
    )?;

    let body = match transceiver_kind {
        TransceiverKind::Sender => {
            serde_json::to_value(state.registry.with_sender(&id, |s| s.get_constraints())?).unwrap()
        }
        TransceiverKind::Receiver => {
            serde_json::to_value(state.registry.with_receiver(&id, |s| s.get_constraints())?).unwrap()
        }
    };
    Ok(Json(body))
}

/// Merges an `activation` record (and, for a receiver, the `transport_file` request)
/// into a staged/active params body, matching the extra columns spec.md §6's endpoint
/// table documents for both GET endpoints.
fn with_activation_and_transport_file(
    mut body: Value,
    record: Option<core::activator::ActivationRecord>,
    transport_file: Option<core::transport_file::TransportFileRequest>,
) -> Value {
    if let Value::Object(map) = &mut body {
        map.insert("activation".to_owned(), serde_json::to_value(&record).unwrap());
        if let Some(file) = transport_file {
            map.insert("transport_file".to_owned(), serde_json::to_value(&file).unwrap());
        }
    }
    body
}

async fn get_staged(
    State(state): State<AppState>,
    Path((version, kind, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    let transceiver_kind = parse_kind(&kind)?;
    lookup_transport(
        &state,
        api_version,
        transceiver_kind,
        &id,
        format!("single/{kind}/{id}/staged/"),
    )?;

    let (body, last, transport_file) = match transceiver_kind {
        TransceiverKind::Sender => {
            let body = serde_json::to_value(state.registry.with_sender(&id, |s| s.get_staged())?).unwrap();
            let (last, _active) = state.registry.sender_activation(&id)?;
            (body, last, None)
        }
        TransceiverKind::Receiver => {
            let body = serde_json::to_value(state.registry.with_receiver(&id, |s| s.get_staged())?).unwrap();
            let (last, _active) = state.registry.receiver_activation(&id)?;
            let (staged_file, _active_file) = state.registry.receiver_transport_file(&id)?;
            (body, last, Some(staged_file))
        }
    };
    Ok(Json(with_activation_and_transport_file(body, last, transport_file)))
}

async fn get_active(
    State(state): State<AppState>,
    Path((version, kind, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    let transceiver_kind = parse_kind(&kind)?;
    lookup_transport(
        &state,
        api_version,
        transceiver_kind,
        &id,
        format!("single/{kind}/{id}/active/"),
    )?;

    let (body, active, transport_file) = match transceiver_kind {
        TransceiverKind::Sender => {
            let body = serde_json::to_value(state.registry.with_sender(&id, |s| s.get_active())?).unwrap();
            let (_last, active) = state.registry.sender_activation(&id)?;
            (body, active, None)
        }
        TransceiverKind::Receiver => {
            let body = serde_json::to_value(state.registry.with_receiver(&id, |s| s.get_active())?).unwrap();
            let (_last, active) = state.registry.receiver_activation(&id)?;
            let (_staged_file, active_file) = state.registry.receiver_transport_file(&id)?;
            (body, active, Some(active_file))
        }
    };
    Ok(Json(with_activation_and_transport_file(body, active, transport_file)))
}

async fn patch_staged(
    State(state): State<AppState>,
    Path((version, kind, id)): Path<(String, String, String)>,
    Json(body): Json<PatchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let _span = tracing::info_span!("patch_staged", %version, %kind, %id).entered();

    let api_version = parse_version(&version)?;
    let transceiver_kind = parse_kind(&kind)?;

    let outcome: PatchOutcome = state
        .registry
        .patch_transceiver(api_version, transceiver_kind, &id, body)
        .map_err(|e| ApiError::with_path(e, format!("single/{kind}/{id}/staged/")))?;

    let status = StatusCode::from_u16(outcome.status).unwrap_or(StatusCode::OK);
    Ok((status, Json(serde_json::to_value(&outcome).unwrap())))
}

async fn transport_file(
    State(state): State<AppState>,
    Path((version, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    lookup_transport(
        &state,
        api_version,
        TransceiverKind::Sender,
        &id,
        format!("single/senders/{id}/transportfile/"),
    )?;

    // Senders don't carry a TransportFileManager in this engine (that shim exists for
    // receiver ingestion only); a deployment's SDP-driver factory supplies this text.
    Ok(([(axum::http::header::CONTENT_TYPE, "application/sdp")], String::new()))
}

async fn transport_type(
    State(state): State<AppState>,
    Path((version, kind, id)): Path<(String, String, String)>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    if api_version != ApiVersion::V1_1 {
        return Err(ApiError::new(ConnectionError::not_found(
            "transporttype/ requires API version v1.1",
        )));
    }
    let transceiver_kind = parse_kind(&kind)?;
    let transport = lookup_transport(
        &state,
        api_version,
        transceiver_kind,
        &id,
        format!("single/{kind}/{id}/transporttype/"),
    )?;
    Ok(Json(json!(transport.urn())))
}

async fn bulk(
    State(state): State<AppState>,
    Path((version, kind)): Path<(String, String)>,
    Json(entries): Json<Vec<BulkEntry>>,
) -> Result<impl IntoResponse, ApiError> {
    let api_version = parse_version(&version)?;
    let transceiver_kind = parse_kind(&kind)?;

    let dispatcher = BulkDispatcher::new(&state.registry);
    let results: Vec<BulkResult> = dispatcher.dispatch(api_version, transceiver_kind, entries);
    Ok(Json(results))
}
