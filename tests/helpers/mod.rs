#![allow(dead_code)]

use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};

use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, StatusCode};
use http_body_util::BodyExt;
use tower::ServiceExt;
use zip::write::SimpleFileOptions;

use modvault::auth::users::AuthUsers;
use modvault::config::{Config, Listen};
use modvault::store::AppState;

/// Config with test defaults rooted at `root`.
pub fn test_config(root: &Path) -> Config {
    Config {
        listen: Listen::Tcp("127.0.0.1:0".into()),
        socket_mode: 0o660,
        root: root.to_path_buf(),
        read_prefix: "/dl".into(),
        upload_prefix: "/ul".into(),
        uploads_enabled: true,
        auth_users: AuthUsers::default(),
        max_upload_bytes: 4 * 1024 * 1024,
    }
}

pub fn test_state(config: Config) -> AppState {
    AppState::new(config).expect("state build failed")
}

/// Build the full application router for a fresh store at `root`.
pub fn test_router(root: &Path) -> Router {
    modvault::registry::app(test_state(test_config(root)))
}

/// Zip `entries` in memory.
pub fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        zip.start_file(*name, SimpleFileOptions::default())
            .expect("start_file");
        zip.write_all(data).expect("write entry");
    }
    zip.finish().expect("finish zip").into_inner()
}

/// A well-formed module archive for `module@version`.
pub fn module_zip(module: &str, version: &str) -> Vec<u8> {
    let modfile = format!("module {module}\n\ngo 1.22\n");
    let modfile_name = format!("{module}@{version}/go.mod");
    let source_name = format!("{module}@{version}/widgets.go");
    build_zip(&[
        (modfile_name.as_str(), modfile.as_bytes()),
        (source_name.as_str(), b"package widgets\n".as_slice()),
    ])
}

/// Place an archive directly in the store, bypassing the upload endpoint.
pub fn seed_archive(root: &Path, module: &str, version: &str, bytes: &[u8]) -> PathBuf {
    let (dir, base) = module.rsplit_once('/').unwrap_or(("", module));
    let dir = root.join("modules").join(dir);
    std::fs::create_dir_all(&dir).expect("create module dir");
    let path = dir.join(format!("{base}@{version}.zip"));
    std::fs::write(&path, bytes).expect("write archive");
    path
}

/// Send a GET request; returns status, headers and raw body.
pub async fn get(app: &Router, path: &str) -> (StatusCode, HeaderMap, Bytes) {
    let req = Request::builder()
        .method("GET")
        .uri(path)
        .body(Body::empty())
        .unwrap();
    send(app, req).await
}

/// POST an archive, optionally with Basic credentials.
pub async fn post_zip(
    app: &Router,
    path: &str,
    bytes: Vec<u8>,
    basic: Option<(&str, &str)>,
) -> (StatusCode, HeaderMap, Bytes) {
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("Content-Type", "application/zip");
    if let Some((user, pass)) = basic {
        let encoded = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            format!("{user}:{pass}"),
        );
        builder = builder.header("Authorization", format!("Basic {encoded}"));
    }
    let req = builder.body(Body::from(bytes)).unwrap();
    send(app, req).await
}

pub async fn send(app: &Router, req: Request<Body>) -> (StatusCode, HeaderMap, Bytes) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    (status, headers, body)
}

/// Files currently in the staging directory.
pub fn staged_files(root: &Path) -> Vec<PathBuf> {
    match std::fs::read_dir(root.join("uploads")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}
