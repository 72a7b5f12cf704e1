//! HTTP binding for the sync protocol engine. Every
//! handler here is a thin adapter: parse the wire shape (path/query/body),
//! call straight into `sync_protocol::SyncProtocolEngine`, render the
//! result back to the wire shape the table specifies. No business
//! logic lives in this file.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::Deserialize;
use std::collections::HashMap;

use crate::error::AppError;
use crate::extract::{Hostname, TenantId};
use crate::state::AppState;

const PROTOCOL_VERSION: i32 = sync_protocol::PROTOCOL_VERSION;

fn newline_list(body: &str) -> Vec<String> {
    body.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect()
}

pub async fn protocol_version() -> impl IntoResponse {
    Json(serde_json::json!({ "version": PROTOCOL_VERSION }))
}

pub async fn head_commit(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path(lib): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let resp = state.engine.head_commit(&tenant, &lib).await?;
    Ok(Json(resp))
}

#[derive(Deserialize)]
pub struct HeadQuery {
    head: String,
}

pub async fn put_head(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path(lib): Path<String>,
    Query(q): Query<HeadQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.put_head(&tenant, &lib, &q.head).await?;
    Ok(StatusCode::OK)
}

pub async fn get_commit(
    State(state): State<AppState>,
    Path((lib, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let commit = state.engine.get_commit(&lib, &id).await?;
    Ok(Json(commit))
}

pub async fn put_commit(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path((lib, id)): Path<(String, String)>,
    Json(mut body): Json<sync_protocol::CommitPutRequest>,
) -> Result<impl IntoResponse, AppError> {
    // The path segment is authoritative over whatever commit_id the body
    // carries, so a client can never smuggle a mismatched row key in.
    body.commit_id = id;
    state.engine.put_commit(&tenant, &lib, body).await?;
    Ok(StatusCode::OK)
}

pub async fn get_block(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path((_lib, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let mut reader = state.engine.fetch_block(&tenant, &id).await?;
    let mut body = Vec::new();
    std::io::Read::read_to_end(&mut reader, &mut body)
        .map_err(|e| AppError::new(common::ErrorKind::Unavailable, e.to_string()))?;
    Ok(body)
}

#[derive(Deserialize)]
pub struct PutBlockQuery {
    hash_type: Option<String>,
}

pub async fn put_block(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Hostname(hostname): Hostname,
    Path((_lib, id)): Path<(String, String)>,
    Query(q): Query<PutBlockQuery>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let asserts_sha256 = q.hash_type.as_deref() == Some("sha256");
    state.engine.put_block(&tenant, &hostname, &id, asserts_sha256, body).await?;
    Ok(StatusCode::OK)
}

pub async fn check_blocks(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Hostname(hostname): Hostname,
    Path(lib): Path<String>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let _ = &lib; // check-blocks is scoped by (tenant, hostname), not library
    let ids = newline_list(&body);
    let missing = state.engine.check_blocks(&tenant, &hostname, &ids).await?;
    Ok(missing.join("\n"))
}

#[derive(Deserialize)]
pub struct FsIdListQuery {
    #[serde(rename = "server-head")]
    server_head: String,
}

pub async fn fs_id_list(
    State(state): State<AppState>,
    Path(lib): Path<String>,
    Query(q): Query<FsIdListQuery>,
) -> Result<impl IntoResponse, AppError> {
    let ids = state.engine.fs_id_list(&lib, &q.server_head).await?;
    Ok(Json(ids))
}

pub async fn fs_object_fetch(
    State(state): State<AppState>,
    Path((lib, id)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let obj = state.engine.fs_object_fetch(&lib, &id).await?;
    Ok(Json(obj))
}

pub async fn pack_fs(
    State(state): State<AppState>,
    Path(lib): Path<String>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let ids = newline_list(&body);
    let objs = state.engine.fs_object_pack(&lib, &ids).await?;
    Ok(Json(objs))
}

pub async fn recv_fs(
    State(state): State<AppState>,
    Path(lib): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    state.engine.fs_object_receive(&lib, &body).await?;
    Ok(StatusCode::OK)
}

pub async fn check_fs(
    State(state): State<AppState>,
    Path(lib): Path<String>,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let ids = newline_list(&body);
    let missing = state.engine.check_fs(&lib, &ids).await?;
    Ok(missing.join("\n"))
}

pub async fn permission_check(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path(lib): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.permission_check(&tenant, &lib).await?;
    // Empty 200, never a JSON body.
    Ok(StatusCode::OK)
}

pub async fn quota_check(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path(lib): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let has_quota = state.engine.quota_check(&tenant, &lib).await?;
    Ok(Json(serde_json::json!({ "has_quota": has_quota })))
}

#[derive(Deserialize)]
pub struct UpdateBranchQuery {
    head: String,
    expected_parent: Option<String>,
}

pub async fn update_branch(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    Path(lib): Path<String>,
    Query(q): Query<UpdateBranchQuery>,
) -> Result<impl IntoResponse, AppError> {
    state.engine.update_branch(&tenant, &lib, &q.head, q.expected_parent.as_deref()).await?;
    Ok(StatusCode::OK)
}

pub async fn head_commits_multi(
    State(state): State<AppState>,
    TenantId(tenant): TenantId,
    body: String,
) -> Result<impl IntoResponse, AppError> {
    let ids = newline_list(&body);
    let heads: HashMap<String, String> = state.engine.multi_repo_head_commits(&tenant, &ids).await?;
    Ok(Json(heads))
}
