//! Playlist and segment serving.
//!
//! Files come straight from the segment store. Nothing here is cacheable:
//! the playlist changes every segment and segment names are recycled by the
//! next session.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

use super::error::AppError;
use crate::segments::SegmentFile;
use super::AppContext;

pub fn hls_routes() -> Router<AppContext> {
    Router::new().route("/hls/*filename", get(serve_file))
}

async fn serve_file(
    State(ctx): State<AppContext>,
    Path(filename): Path<String>,
) -> Result<Response, AppError> {
    let opened = ctx.store.open(&filename).await?;

    tracing::trace!(file = %filename, len = opened.len, "Serving HLS file");

    Ok(file_response(opened))
}

/// Build the uncached response for an opened store file.
///
/// The transcoder may still be appending to the file, so the body stops at
/// the length recorded when it was opened to keep `Content-Length` honest.
fn file_response(opened: SegmentFile) -> Response {
    let headers = [
        (
            header::CONTENT_TYPE,
            HeaderValue::from_static(opened.kind.content_type()),
        ),
        (header::CONTENT_LENGTH, HeaderValue::from(opened.len)),
        (
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-store, must-revalidate"),
        ),
        (header::PRAGMA, HeaderValue::from_static("no-cache")),
        (header::EXPIRES, HeaderValue::from_static("0")),
    ];

    let body = Body::from_stream(ReaderStream::new(opened.file.take(opened.len)));

    (StatusCode::OK, headers, body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::SegmentStore;
    use http_body_util::BodyExt;
    use std::io::Write;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_body_stops_at_opened_length() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stream_aa_0.ts");
        std::fs::write(&path, b"first").unwrap();
        let store = SegmentStore::new(dir.path());
        let opened = store.open("stream_aa_0.ts").await.unwrap();

        // Transcoder keeps writing after the handler opened the file
        let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b" and more").unwrap();

        let response = file_response(opened);
        assert_eq!(response.headers()[header::CONTENT_LENGTH], "5");
        assert_eq!(response.headers()[header::CONTENT_TYPE], "video/mp2t");

        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"first");
    }
}
