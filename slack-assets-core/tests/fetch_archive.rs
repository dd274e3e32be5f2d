use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use slack_assets_core::archive::fetch;
use slack_assets_core::error::FetchError;
use tempfile::tempdir;

fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
    );
    headers
}

#[tokio::test]
async fn fetch_writes_the_body_to_a_tagged_scratch_file() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/files/assets.zip")
        .match_header("authorization", "Bearer xoxb-test")
        .with_status(200)
        .with_body(b"PK\x03\x04 archive bytes")
        .create_async()
        .await;
    let scratch = tempdir().unwrap();
    let client = reqwest::Client::new();

    let path = fetch(
        &client,
        &format!("{}/files/assets.zip", server.url()),
        bearer("xoxb-test"),
        "zip",
        scratch.path(),
    )
    .await
    .expect("download should succeed");

    mock.assert_async().await;
    assert!(path.starts_with(scratch.path()));
    assert_eq!(path.extension().and_then(|e| e.to_str()), Some("zip"));
    assert_eq!(std::fs::read(&path).unwrap(), b"PK\x03\x04 archive bytes");
}

#[tokio::test]
async fn fetch_fails_on_error_status_without_leaving_files() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/files/missing.zip")
        .with_status(404)
        .with_body("not found")
        .create_async()
        .await;
    let scratch = tempdir().unwrap();

    let err = fetch(
        &reqwest::Client::new(),
        &format!("{}/files/missing.zip", server.url()),
        HeaderMap::new(),
        "zip",
        scratch.path(),
    )
    .await
    .unwrap_err();

    assert!(matches!(err, FetchError::Status { status: 404 }), "got {err:?}");
    assert_eq!(std::fs::read_dir(scratch.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn fetch_creates_a_missing_scratch_directory() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/a.zip")
        .with_status(200)
        .with_body("zip")
        .create_async()
        .await;
    let scratch = tempdir().unwrap();
    let nested = scratch.path().join("bot/scratch");

    let path = fetch(
        &reqwest::Client::new(),
        &format!("{}/a.zip", server.url()),
        HeaderMap::new(),
        "zip",
        &nested,
    )
    .await
    .expect("download should succeed");

    assert!(path.starts_with(&nested));
}
