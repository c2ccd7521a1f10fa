//! Upload pipeline: `Receiving -> Verifying -> {Committed | Rejected}`.
//!
//! Bytes land in a staging file outside the archive namespace. Only an
//! archive whose every entry sits under `{module}@{version}/` is published,
//! and publishing never replaces an existing archive.

use axum::body::Body;
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use http_body_util::LengthLimitError;
use tokio::io::AsyncWriteExt;

use super::archive;
use crate::error::ApiError;
use crate::store::{AppState, ModulePath, StagedUpload, StoreError};
use crate::version;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadState {
    Receiving,
    Verifying,
    Committed,
    Rejected,
}

/// `POST {upload_prefix}/{module}/@v/{version}.zip`
#[tracing::instrument(skip(state, headers, body), fields(module = %module_raw, %version), err(level = "debug"))]
pub async fn upload(
    state: &AppState,
    module_raw: &str,
    version: &str,
    headers: &HeaderMap,
    body: Body,
) -> Result<Response, ApiError> {
    let user = state.config.auth_users.authenticate(headers)?;

    let module = ModulePath::parse(module_raw)
        .ok_or_else(|| ApiError::BadRequest(format!("invalid module path: {module_raw:?}")))?;
    if !version::is_valid(version) {
        return Err(ApiError::BadRequest(format!("invalid version: {version:?}")));
    }

    match state.artifacts.stat(&module, version).await {
        Ok(_) => return Err(ApiError::Conflict(format!("{module}@{version} already exists"))),
        Err(StoreError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    let mut staged = state.artifacts.begin_upload(&module, version).await?;
    tracing::debug!(state = ?UploadState::Receiving, user = user.as_deref(), "upload started");

    let received = match receive(&mut staged, body).await {
        Ok(n) => n,
        Err(e) => return reject(state, staged, e).await,
    };

    tracing::debug!(state = ?UploadState::Verifying, bytes = received, "upload received");
    let prefix = module.archive_prefix(version);
    let entries = match verify(&staged, prefix).await {
        Ok(n) => n,
        Err(e) => return reject(state, staged, e).await,
    };

    if let Err(e) = state.artifacts.commit(staged, &module, version).await {
        tracing::info!(state = ?UploadState::Rejected, "upload not committed");
        return Err(e.into());
    }

    tracing::info!(
        state = ?UploadState::Committed,
        bytes = received,
        entries,
        user = user.as_deref(),
        "module version published"
    );
    Ok(([(CONTENT_TYPE, "text/plain; charset=utf-8")], "ok").into_response())
}

/// Stream the request body into the staging file. Returns the byte count.
async fn receive(staged: &mut StagedUpload, body: Body) -> Result<u64, ApiError> {
    let mut stream = body.into_data_stream();
    let mut total: u64 = 0;
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(body_error)?;
        staged
            .file_mut()
            .write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("write staging file: {e}")))?;
        total += chunk.len() as u64;
    }
    staged
        .finish()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("flush staging file: {e}")))?;
    Ok(total)
}

async fn verify(staged: &StagedUpload, prefix: String) -> Result<usize, ApiError> {
    let path = staged.path().to_owned();
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&path)
            .map_err(|e| ApiError::Internal(anyhow::anyhow!("reopen staging file: {e}")))?;
        archive::verify_entry_prefix(file, &prefix)
    })
    .await
    .map_err(|e| ApiError::Internal(e.into()))?
}

async fn reject(state: &AppState, staged: StagedUpload, err: ApiError) -> Result<Response, ApiError> {
    state.artifacts.discard(staged).await;
    tracing::info!(state = ?UploadState::Rejected, error = %err, "upload rejected");
    Err(err)
}

/// Classify a failure while reading the request body.
fn body_error(err: axum::Error) -> ApiError {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(&err);
    while let Some(e) = source {
        if e.is::<LengthLimitError>() {
            return ApiError::PayloadTooLarge;
        }
        source = e.source();
    }
    ApiError::BadRequest(format!("failed to read upload body: {err}"))
}
