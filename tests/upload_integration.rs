mod helpers;

use axum::http::StatusCode;
use axum::http::header::WWW_AUTHENTICATE;

use helpers::{
    build_zip, get, module_zip, post_zip, seed_archive, staged_files, test_config, test_router,
    test_state,
};
use modvault::auth::password::hash_password;
use modvault::auth::users::AuthUsers;

#[tokio::test]
async fn upload_then_list_and_download() {
    let tmp = tempfile::tempdir().unwrap();
    seed_archive(tmp.path(), "acme/widgets", "v1.0.0", &module_zip("acme/widgets", "v1.0.0"));
    let app = test_router(tmp.path());

    let archive = module_zip("acme/widgets", "v2.0.0");
    let (status, _, body) =
        post_zip(&app, "/ul/acme/widgets/@v/v2.0.0.zip", archive.clone(), None).await;
    assert_eq!(status, StatusCode::OK, "{}", String::from_utf8_lossy(&body));

    let (_, _, list) = get(&app, "/dl/acme/widgets/@v/list").await;
    assert_eq!(&list[..], b"v1.0.0\nv2.0.0\n");

    let (status, _, zip) = get(&app, "/dl/acme/widgets/@v/v2.0.0.zip").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&zip[..], &archive[..]);

    let (_, _, latest) = get(&app, "/dl/acme/widgets/@latest").await;
    let info: serde_json::Value = serde_json::from_slice(&latest).unwrap();
    assert_eq!(info["Version"], "v2.0.0");

    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn reupload_conflicts_and_keeps_original() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_router(tmp.path());

    let first = module_zip("acme/widgets", "v1.0.0");
    let (status, _, _) = post_zip(&app, "/ul/acme/widgets/@v/v1.0.0.zip", first.clone(), None).await;
    assert_eq!(status, StatusCode::OK);

    let second = build_zip(&[
        ("acme/widgets@v1.0.0/go.mod", b"module acme/widgets\n"),
        ("acme/widgets@v1.0.0/other.go", b"package widgets\n"),
    ]);
    let (status, _, _) = post_zip(&app, "/ul/acme/widgets/@v/v1.0.0.zip", second, None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, _, served) = get(&app, "/dl/acme/widgets/@v/v1.0.0.zip").await;
    assert_eq!(&served[..], &first[..]);
    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn wrong_entry_prefix_is_rejected_without_trace() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_router(tmp.path());

    let archive = build_zip(&[
        ("acme/widgets@v1.0.0/go.mod", b"module acme/widgets\n"),
        ("acme/gadgets@v1.0.0/go.mod", b"module acme/gadgets\n"),
    ]);
    let (status, _, _) = post_zip(&app, "/ul/acme/widgets/@v/v1.0.0.zip", archive, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(!tmp.path().join("modules/acme/widgets@v1.0.0.zip").exists());
    assert!(staged_files(tmp.path()).is_empty());
    let (status, _, _) = get(&app, "/dl/acme/widgets/@v/list").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn non_zip_and_empty_zip_are_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_router(tmp.path());

    let (status, _, _) =
        post_zip(&app, "/ul/acme/widgets/@v/v1.0.0.zip", b"not a zip".to_vec(), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = post_zip(&app, "/ul/acme/widgets/@v/v1.0.0.zip", build_zip(&[]), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn invalid_version_or_module_is_bad_request() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_router(tmp.path());

    let (status, _, _) = post_zip(
        &app,
        "/ul/acme/widgets/@v/latest.zip",
        module_zip("acme/widgets", "latest"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _, _) = post_zip(
        &app,
        "/ul/acme/../widgets/@v/v1.0.0.zip",
        module_zip("acme/../widgets", "v1.0.0"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn get_on_upload_path_is_method_not_allowed() {
    let tmp = tempfile::tempdir().unwrap();
    let app = test_router(tmp.path());
    let (status, _, _) = get(&app, "/ul/acme/widgets/@v/v1.0.0.zip").await;
    assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn uploads_disabled_hides_endpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.uploads_enabled = false;
    let app = modvault::registry::app(test_state(config));

    let (status, _, _) = post_zip(
        &app,
        "/ul/acme/widgets/@v/v1.0.0.zip",
        module_zip("acme/widgets", "v1.0.0"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!tmp.path().join("modules/acme/widgets@v1.0.0.zip").exists());
}

#[tokio::test]
async fn oversized_upload_is_rejected() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = test_config(tmp.path());
    config.max_upload_bytes = 64;
    let app = modvault::registry::app(test_state(config));

    let (status, _, _) = post_zip(
        &app,
        "/ul/acme/widgets/@v/v1.0.0.zip",
        module_zip("acme/widgets", "v1.0.0"),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(!tmp.path().join("modules/acme/widgets@v1.0.0.zip").exists());
    assert!(staged_files(tmp.path()).is_empty());
}

#[tokio::test]
async fn basic_auth_guards_uploads() {
    let tmp = tempfile::tempdir().unwrap();
    let alice = hash_password("s3cret").unwrap();
    let carol = hash_password("other").unwrap();
    let mut config = test_config(tmp.path());
    config.auth_users = AuthUsers::parse(&format!("alice:{alice};carol:{carol}")).unwrap();
    let app = modvault::registry::app(test_state(config));
    let path = "/ul/acme/widgets/@v/v1.0.0.zip";
    let archive = module_zip("acme/widgets", "v1.0.0");

    let (status, headers, _) = post_zip(&app, path, archive.clone(), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(headers[WWW_AUTHENTICATE].to_str().unwrap().starts_with("Basic"));

    let (status, _, _) = post_zip(&app, path, archive.clone(), Some(("alice", "wrong"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = post_zip(&app, path, archive.clone(), Some(("bob", "s3cret"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = post_zip(&app, path, archive, Some(("alice", "s3cret"))).await;
    assert_eq!(status, StatusCode::OK);

    // Reads stay anonymous.
    let (status, _, _) = get(&app, "/dl/acme/widgets/@v/list").await;
    assert_eq!(status, StatusCode::OK);
}
