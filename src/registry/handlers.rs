use axum::Json;
use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use tokio_util::io::ReaderStream;

use super::archive;
use crate::error::ApiError;
use crate::store::{AppState, ModulePath};

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Body of the `@latest` and `.info` endpoints.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct VersionInfo {
    pub version: String,
    #[serde(serialize_with = "rfc3339")]
    pub time: DateTime<Utc>,
}

fn rfc3339<S: serde::Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&t.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// `GET {prefix}/{module}/@v/list`
#[tracing::instrument(skip(state), fields(%module), err(level = "debug"))]
pub async fn list(state: &AppState, module: &ModulePath) -> Result<Response, ApiError> {
    let versions = state.artifacts.list_versions(module).await?;
    let mut body = String::with_capacity(versions.len() * 8);
    for version in &versions {
        body.push_str(version);
        body.push('\n');
    }
    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], body).into_response())
}

/// `GET {prefix}/{module}/@latest`
#[tracing::instrument(skip(state), fields(%module), err(level = "debug"))]
pub async fn latest(state: &AppState, module: &ModulePath) -> Result<Response, ApiError> {
    let mut versions = state.artifacts.list_versions(module).await?;
    let version = versions
        .pop()
        .ok_or_else(|| ApiError::NotFound(format!("module {module}")))?;
    tracing::debug!(%version, candidates = versions.len() + 1, "resolved latest");

    let meta = state.artifacts.stat(module, &version).await?;
    Ok(Json(VersionInfo {
        version,
        time: meta.publish_time,
    })
    .into_response())
}

/// `GET {prefix}/{module}/@v/{version}.info`
#[tracing::instrument(skip(state), fields(%module, %version), err(level = "debug"))]
pub async fn info(state: &AppState, module: &ModulePath, version: &str) -> Result<Response, ApiError> {
    let meta = state.artifacts.stat(module, version).await?;
    Ok(Json(VersionInfo {
        version: version.to_owned(),
        time: meta.publish_time,
    })
    .into_response())
}

/// `GET {prefix}/{module}/@v/{version}.mod`
///
/// Serves `{module}@{version}/go.mod` out of the published archive.
#[tracing::instrument(skip(state), fields(%module, %version), err(level = "debug"))]
pub async fn mod_file(
    state: &AppState,
    module: &ModulePath,
    version: &str,
) -> Result<Response, ApiError> {
    let file = state
        .artifacts
        .open_archive(module, version)
        .await?
        .into_std()
        .await;
    let entry = format!("{}go.mod", module.archive_prefix(version));

    let bytes = tokio::task::spawn_blocking(move || archive::read_entry(file, &entry))
        .await
        .map_err(|e| ApiError::Internal(e.into()))??;

    Ok(([(CONTENT_TYPE, TEXT_PLAIN)], bytes).into_response())
}

/// `GET {prefix}/{module}/@v/{version}.zip`
///
/// Streams the archive; the file is not buffered in memory.
#[tracing::instrument(skip(state), fields(%module, %version), err(level = "debug"))]
pub async fn zip_file(
    state: &AppState,
    module: &ModulePath,
    version: &str,
) -> Result<Response, ApiError> {
    let file = state.artifacts.open_archive(module, version).await?;
    let len = file
        .metadata()
        .await
        .map_err(|e| ApiError::Internal(anyhow::anyhow!("archive metadata: {e}")))?
        .len();

    let body = Body::from_stream(ReaderStream::new(file));
    Ok((
        [
            (CONTENT_TYPE, "application/zip".to_owned()),
            (CONTENT_LENGTH, len.to_string()),
        ],
        body,
    )
        .into_response())
}
