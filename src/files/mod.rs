use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use std::path::Path as FsPath;
use std::sync::Arc;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::shared::error::ApiError;
use crate::shared::models::ContentKind;
use crate::shared::state::AppState;

/// Write an uploaded payload under `<upload_dir>/<kind>/` with a fresh
/// uuid-based name, keeping the original extension. Returns the relative
/// path stored on the ticket (e.g. `image/3f2a….png`).
pub async fn store_upload(
    upload_dir: &FsPath,
    kind: ContentKind,
    original_name: Option<&str>,
    data: &[u8],
) -> std::io::Result<String> {
    let subdir = kind.as_str().to_ascii_lowercase();

    let extension = original_name
        .map(FsPath::new)
        .and_then(|p| p.extension())
        .and_then(|ext| ext.to_str());
    let filename = match extension {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    };

    let dir = upload_dir.join(&subdir);
    tokio::fs::create_dir_all(&dir).await?;
    tokio::fs::write(dir.join(&filename), data).await?;

    Ok(format!("{subdir}/{filename}"))
}

pub async fn serve_file(
    State(state): State<Arc<AppState>>,
    Path((kind, filename)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    if !matches!(kind.as_str(), "image" | "audio") {
        return Err(ApiError::NotFound(format!("unknown file type: {kind}")));
    }
    // The filename is a single path segment we generated ourselves.
    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        return Err(ApiError::BadRequest("invalid filename".to_string()));
    }

    let path = state.config.storage.upload_dir.join(&kind).join(&filename);
    let file = tokio::fs::File::open(&path)
        .await
        .map_err(|_| ApiError::NotFound(format!("file not found: {kind}/{filename}")))?;

    let mime = mime_guess::from_path(&path).first_or_octet_stream();
    let body = Body::from_stream(ReaderStream::new(file));

    Ok(([(header::CONTENT_TYPE, mime.to_string())], body).into_response())
}

pub fn configure_files_routes() -> Router<Arc<AppState>> {
    Router::new().route("/api/files/:kind/:filename", get(serve_file))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn store_upload_keeps_extension_and_kind_dir() {
        let dir = tempfile::tempdir().unwrap();
        let stored = store_upload(dir.path(), ContentKind::Image, Some("photo.png"), b"abc")
            .await
            .unwrap();

        assert!(stored.starts_with("image/"));
        assert!(stored.ends_with(".png"));
        assert_eq!(tokio::fs::read(dir.path().join(&stored)).await.unwrap(), b"abc");
    }

    #[tokio::test]
    async fn store_upload_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let stored = store_upload(dir.path(), ContentKind::Audio, None, b"xyz")
            .await
            .unwrap();

        assert!(stored.starts_with("audio/"));
        assert!(!stored.contains('.'));
    }
}
