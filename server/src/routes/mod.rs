pub mod rest;
pub mod sync;

use axum::routing::{get, post};
use axum::Router;

use crate::state::AppState;

/// The `/seafhttp` wire surface plus the token-gated REST
/// upload/download resources.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/seafhttp/protocol-version", get(sync::protocol_version))
        .route("/seafhttp/repo/:lib/commit/HEAD", get(sync::head_commit).put(sync::put_head))
        .route("/seafhttp/repo/:lib/commit/:id", get(sync::get_commit).put(sync::put_commit))
        .route("/seafhttp/repo/:lib/block/:id", get(sync::get_block).put(sync::put_block))
        .route("/seafhttp/repo/:lib/check-blocks", post(sync::check_blocks))
        .route("/seafhttp/repo/:lib/fs-id-list", get(sync::fs_id_list))
        .route("/seafhttp/repo/:lib/fs/:id", get(sync::fs_object_fetch))
        .route("/seafhttp/repo/:lib/pack-fs", post(sync::pack_fs))
        .route("/seafhttp/repo/:lib/recv-fs", post(sync::recv_fs))
        .route("/seafhttp/repo/:lib/check-fs", post(sync::check_fs))
        .route("/seafhttp/repo/:lib/permission-check", get(sync::permission_check))
        .route("/seafhttp/repo/:lib/quota-check", get(sync::quota_check))
        .route("/seafhttp/repo/:lib/update-branch", post(sync::update_branch))
        .route("/seafhttp/head-commits-multi", post(sync::head_commits_multi))
        .route("/seafhttp/upload-api/:token", post(rest::upload))
        .route("/seafhttp/files/:token/*path", get(rest::download))
        .with_state(state)
}
