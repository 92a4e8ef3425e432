//! Defines the single path-space of the file drop.
//!
//! ## Structure
//! - `POST <any path>` — upload one file, response body is the new token
//! - any other method on `/<token>` — download the object the token names
//!
//! There are no reserved paths: every request reaches the same dispatcher,
//! which routes on method alone, so the whole token namespace stays
//! addressable.

use crate::{handlers::drop_handlers::dispatch, services::storage_service::StorageService};
use axum::{Router, routing::any};

/// Build and return the router for the drop.
///
/// The router carries shared state (`StorageService`) to the dispatcher; the
/// upload size cap is layered on by the caller.
pub fn routes() -> Router<StorageService> {
    Router::new()
        .route("/", any(dispatch))
        .route("/{*path}", any(dispatch))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::DefaultBodyLimit;
    use reqwest::multipart::{Form, Part};
    use tempfile::TempDir;

    async fn spawn_drop(dir: &TempDir, max_upload_size: usize) -> String {
        let storage = StorageService::new(dir.path(), 10);
        let app = routes()
            .layer(DefaultBodyLimit::max(max_upload_size))
            .with_state(storage);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        format!("http://{}", addr)
    }

    fn upload_form(payload: Vec<u8>) -> Form {
        let part = Part::bytes(payload)
            .file_name("blob.bin")
            .mime_str("application/octet-stream")
            .unwrap();
        Form::new().part("file", part)
    }

    #[tokio::test]
    async fn upload_and_download_over_http() {
        let tmp = TempDir::new().unwrap();
        let base = spawn_drop(&tmp, 1024 * 1024).await;
        let client = reqwest::Client::new();

        // POST is an upload on any path, not just the root.
        let response = client
            .post(format!("{}/anywhere/at/all", base))
            .multipart(upload_form(b"over the wire".to_vec()))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let token = response.text().await.unwrap();
        assert_eq!(token.len(), 10);

        let download = client
            .get(format!("{}/{}", base, token))
            .send()
            .await
            .unwrap();
        assert_eq!(download.status(), reqwest::StatusCode::OK);
        assert_eq!(
            download
                .headers()
                .get(reqwest::header::CONTENT_LENGTH)
                .unwrap(),
            "13"
        );
        assert_eq!(download.bytes().await.unwrap().as_ref(), b"over the wire");
    }

    #[tokio::test]
    async fn oversized_upload_is_an_internal_error() {
        let tmp = TempDir::new().unwrap();
        let base = spawn_drop(&tmp, 1024).await;
        let client = reqwest::Client::new();

        let response = client
            .post(&base)
            .multipart(upload_form(vec![0u8; 8 * 1024]))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn unknown_token_is_not_found_over_http() {
        let tmp = TempDir::new().unwrap();
        let base = spawn_drop(&tmp, 1024).await;

        let response = reqwest::get(format!("{}/NoSuchDrop", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::NOT_FOUND);
        assert!(response.bytes().await.unwrap().is_empty());
    }
}
