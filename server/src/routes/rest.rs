//! Token-gated REST upload/download, the server-side chunking path. Unlike
//! the `/seafhttp` wire surface, which assumes a legacy client already
//! chunked the file itself, these two resources accept (or emit) a whole
//! file and let the server compute blocks at ingest time.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use bytes::Bytes;
use common::model::{AccessToken, BlockRow, TokenKind};
use object_backend::Tier;
use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AppError;
use crate::extract::Hostname;
use crate::state::AppState;

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

/// Splits a token's stored path into (parent directory, leaf file name),
/// treating a trailing-slash-free path as "directory/leaf".
fn split_parent(path: &str) -> (&str, &str) {
    let trimmed = path.trim_start_matches('/');
    match trimmed.rsplit_once('/') {
        Some((dir, leaf)) => (dir, leaf),
        None => ("", trimmed),
    }
}

/// Appends a newly-ingested file at `token.path` in `token.library`'s tree,
/// minting a fresh commit on top of the current head. Shared by the upload
/// handler's only caller; pulled out for readability.
async fn append_file_and_commit(
    state: &AppState,
    token: &AccessToken,
    file_name: &str,
    size: i64,
    block_ids: Vec<String>,
    now: i64,
) -> Result<(), AppError> {
    let head = state.engine.head_commit(&token.tenant, &token.library).await?;
    let commit = state.store.get_commit(&token.library, &head.head_commit_id).await?;

    let traversal = state.fs_graph.traverse_to_path(&token.library, &commit.root_fs_id, &token.path).await?;

    let file_fs_id = state.fs_graph.create_file(&token.library, file_name, size, block_ids, now).await?;
    let new_root = state
        .fs_graph
        .rebuild_path(&token.library, &traversal.ancestors, file_name, &file_fs_id)
        .await?;

    let new_commit_id = state
        .fs_graph
        .create_commit(
            &token.library,
            &new_root,
            Some(head.head_commit_id),
            None,
            common::ZERO_CREATOR,
            "rest upload",
            now,
        )
        .await?;
    state.store.update_head(&token.tenant, &token.library, &new_commit_id, now).await?;
    Ok(())
}

/// `POST /seafhttp/upload-api/{token}`: consumes a single-use upload token,
/// server-side-chunks the `file` multipart field through `chunker`, stores
/// each chunk via the storage-manager-resolved hot class, and appends the
/// result to the library tree
pub async fn upload(
    State(state): State<AppState>,
    Hostname(hostname): Hostname,
    Path(token): Path<String>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let access = state.tokens.get_token(&token, TokenKind::Upload).await?;

    let mut file_name = None;
    let spill = spillbuffer::SpillBuffer::new(state.spill_threshold, state.spill_dir.clone(), "upload-api-");

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::new(common::ErrorKind::InvalidArgument, e.to_string()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        file_name = field.file_name().map(str::to_string);
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| AppError::new(common::ErrorKind::InvalidArgument, e.to_string()))?
        {
            spill.write(&chunk).map_err(|e| AppError::new(e.kind(), e.to_string()))?;
        }
    }
    let file_name = file_name.unwrap_or_else(|| split_parent(&access.path).1.to_string());

    let class_name = state
        .storage
        .resolve_storage_class(&hostname, None, Tier::Hot)
        .await
        .ok_or_else(|| AppError::new(common::ErrorKind::Unavailable, "no storage class registered"))?;
    let (_, class_name) = state.storage.get_healthy_backend(&class_name).await?;
    let block_store = state.storage.block_store_for_class(&class_name).await?;

    let reader = spill.reader().map_err(|e| AppError::new(e.kind(), e.to_string()))?;
    let chunker = chunker::FastCdcChunker::new(reader, state.chunker_config);

    let now = unix_now();
    let total_size = spill.size() as i64;
    let mut block_ids = Vec::new();
    for chunk in chunker {
        let chunk = chunk.map_err(|e| AppError::new(e.kind(), e.to_string()))?;
        let key = block_store.put_block(&chunk.digest, Bytes::from(chunk.data)).await?;
        state
            .store
            .upsert_block(&BlockRow {
                tenant: access.tenant.clone(),
                block_id: chunk.digest.to_hex(),
                size_bytes: chunk.size as i64,
                storage_class: class_name.clone(),
                storage_key: key,
                ref_count: 1,
                created_at: now,
                last_accessed: now,
            })
            .await?;
        block_ids.push(chunk.digest.to_hex());
    }
    spill.close().map_err(|e| AppError::new(e.kind(), e.to_string()))?;

    append_file_and_commit(&state, &access, &file_name, total_size, block_ids, now).await?;
    state.tokens.delete_token(&token).await?;

    Ok(StatusCode::OK)
}

/// `GET /seafhttp/files/{token}/{path}`: consumes a (reusable, TTL-bound)
/// download token scoped to a path and streams the named file's blocks back
/// concatenated in order ("FS-Object" ordered block list).
pub async fn download(
    State(state): State<AppState>,
    Path((token, path)): Path<(String, String)>,
) -> Result<impl IntoResponse, AppError> {
    let access = state.tokens.get_token(&token, TokenKind::Download).await?;
    if access.path.trim_start_matches('/') != path.trim_start_matches('/') {
        return Err(AppError::new(common::ErrorKind::Forbidden, "token does not cover this path"));
    }

    let head = state.engine.head_commit(&access.tenant, &access.library).await?;
    let commit = state.store.get_commit(&access.library, &head.head_commit_id).await?;
    let traversal = state.fs_graph.traverse_to_path(&access.library, &commit.root_fs_id, &path).await?;
    let entry = traversal
        .target
        .ok_or_else(|| AppError::new(common::ErrorKind::NotFound, "no file at that path"))?;

    let file_obj = state.engine.fs_object_fetch(&access.library, &entry.child_fs_id).await?;
    let block_ids = match file_obj {
        sync_protocol::FsObjectWire::File { block_ids, .. } => block_ids,
        sync_protocol::FsObjectWire::Dir { .. } => {
            return Err(AppError::new(common::ErrorKind::InvalidArgument, "path names a directory"));
        }
    };

    let mut body = Vec::new();
    for block_id in block_ids {
        let class = match state.store.get_block(&access.tenant, &block_id).await {
            Ok(row) => row.storage_class,
            Err(store::MetadataStoreError::NotFound) => "hot".to_string(),
            Err(e) => return Err(e.into()),
        };
        let (_, class) = state.storage.get_healthy_backend(&class).await?;
        let block_store = state.storage.block_store_for_class(&class).await?;
        let mut reader = block_store.get_block_reader_hex(&block_id).await?;
        reader
            .read_to_end(&mut body)
            .map_err(|e| AppError::new(common::ErrorKind::Unavailable, e.to_string()))?;
    }

    Ok(body)
}
