use super::cors::{Admission, CorsHeaders, Gatekeeper};
use crate::media::MediaFetcher;
use crate::storage::{key, Publisher};
use crate::utils::StepOutcome;
use anyhow::{bail, Context, Result};
use lambda_http::http::{header::ORIGIN, StatusCode};
use lambda_http::{Body, Error, Request, Response};
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Debug, Serialize)]
struct MessageBody<'a> {
    message: &'a str,
}

#[derive(Debug, Serialize)]
struct StoredBody<'a> {
    message: &'a str,
    s3_key: &'a str,
    bucket: &'a str,
}

/// Terminal states of a request that made it past the gatekeeper.
#[derive(Debug, PartialEq, Eq)]
enum Verdict {
    MissingFields,
    DownloadFailed,
    UploadFailed,
    Stored { key: String },
}

/// Downloads a caller-supplied video and stores it under a key derived from
/// the caller's email.
pub struct VideoHandler {
    gatekeeper: Gatekeeper,
    fetcher: MediaFetcher,
    publisher: Publisher,
    scratch_dir: Option<PathBuf>,
}

impl VideoHandler {
    pub fn new(
        gatekeeper: Gatekeeper,
        fetcher: MediaFetcher,
        publisher: Publisher,
        scratch_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            gatekeeper,
            fetcher,
            publisher,
            scratch_dir,
        }
    }

    pub async fn handle(&self, request: Request) -> Result<Response<Body>, Error> {
        let origin = request.headers().get(ORIGIN);
        info!(method = %request.method(), origin = ?origin, "Received request");

        let cors = match self.gatekeeper.admit(request.method(), origin) {
            Admission::Rejected(cors) => {
                info!(origin = ?origin, "Origin not allowed");
                return message_reply(StatusCode::FORBIDDEN, &cors, "Origin not allowed");
            }
            Admission::Preflight(cors) => {
                return reply(StatusCode::NO_CONTENT, &cors, Body::Empty);
            }
            Admission::Proceed(cors) => cors,
        };
        info!(allow_origin = cors.allow_origin(), "Request admitted");

        match self.process(request.body().as_ref()).await {
            Ok(Verdict::MissingFields) => message_reply(
                StatusCode::BAD_REQUEST,
                &cors,
                "Missing video_url or email in request body",
            ),
            Ok(Verdict::DownloadFailed) => message_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                &cors,
                "Failed to download video",
            ),
            Ok(Verdict::UploadFailed) => message_reply(
                StatusCode::INTERNAL_SERVER_ERROR,
                &cors,
                "Failed to upload video to S3",
            ),
            Ok(Verdict::Stored { key }) => json_reply(
                StatusCode::OK,
                &cors,
                &StoredBody {
                    message: "Success",
                    s3_key: &key,
                    bucket: self.publisher.bucket(),
                },
            ),
            Err(e) => {
                error!("Error processing request: {:#}", e);
                message_reply(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &cors,
                    &format!("Internal server error: {e:#}"),
                )
            }
        }
    }

    async fn process(&self, body: &[u8]) -> Result<Verdict> {
        let body: &[u8] = if body.is_empty() { b"{}" } else { body };
        let body: Value = serde_json::from_slice(body).context("Invalid JSON request body")?;
        let Value::Object(mut fields) = body else {
            bail!("Request body must be a JSON object");
        };

        let (Some(video_url), Some(email)) = (
            fields.remove("video_url").filter(is_truthy),
            fields.remove("email").filter(is_truthy),
        ) else {
            return Ok(Verdict::MissingFields);
        };
        let video_url = into_string("video_url", video_url)?;
        let email = into_string("email", email)?;

        // Dropping the scratch dir removes the download on every exit path
        let scratch = self.scratch_space()?;

        let filename = key::filename_from_url(&video_url);
        let s3_key = key::storage_key(&email, &filename);
        let local_path = scratch.path().join(&filename);

        let fetched = self.fetcher.fetch(&video_url, &local_path).await;
        if fetched != StepOutcome::Completed {
            error!(url = %video_url, outcome = %fetched, "Failed to download video");
            return Ok(Verdict::DownloadFailed);
        }

        let published = self.publisher.publish(&local_path, &s3_key).await;
        if published != StepOutcome::Completed {
            error!(key = %s3_key, outcome = %published, "Failed to upload video");
            return Ok(Verdict::UploadFailed);
        }

        info!(key = %s3_key, bucket = self.publisher.bucket(), "Video stored");
        Ok(Verdict::Stored { key: s3_key })
    }

    fn scratch_space(&self) -> Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("clipstash-");
        let dir = match &self.scratch_dir {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        };
        dir.context("Failed to create temporary directory")
    }
}

/// JSON truthiness: `null`, `false`, zero and empty strings, arrays or
/// objects all count as a missing field.
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn into_string(field: &str, value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => bail!("{} must be a string, got {}", field, other),
    }
}

fn reply(status: StatusCode, cors: &CorsHeaders, body: Body) -> Result<Response<Body>, Error> {
    let response = cors.apply(Response::builder().status(status)).body(body)?;
    Ok(response)
}

fn json_reply<T: Serialize>(
    status: StatusCode,
    cors: &CorsHeaders,
    body: &T,
) -> Result<Response<Body>, Error> {
    let json = serde_json::to_string(body)?;
    reply(status, cors, Body::Text(json))
}

fn message_reply(
    status: StatusCode,
    cors: &CorsHeaders,
    message: &str,
) -> Result<Response<Body>, Error> {
    json_reply(status, cors, &MessageBody { message })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::Downloader;
    use crate::storage::ObjectStore;
    use async_trait::async_trait;
    use lambda_http::http::Method;
    use lambda_http::http::HeaderValue;
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    const ALLOWED: &str = "http://localhost:5173";

    #[derive(Default)]
    struct Calls {
        downloads: Vec<(String, PathBuf)>,
        uploads: Vec<(String, String)>,
    }

    struct FakeDownloader {
        calls: Arc<Mutex<Calls>>,
        succeed: bool,
    }

    #[async_trait]
    impl Downloader for FakeDownloader {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn download(&self, url: &str, destination: &Path) -> anyhow::Result<()> {
            self.calls
                .lock()
                .unwrap()
                .downloads
                .push((url.to_string(), destination.to_path_buf()));
            if !self.succeed {
                return Err(anyhow::anyhow!("ERROR: Unsupported URL"));
            }
            tokio::fs::write(destination, b"video bytes").await?;
            Ok(())
        }

        async fn test_availability(&self) -> bool {
            true
        }
    }

    struct FakeStore {
        calls: Arc<Mutex<Calls>>,
        succeed: bool,
    }

    #[async_trait]
    impl ObjectStore for FakeStore {
        async fn put_file(&self, bucket: &str, key: &str, path: &Path) -> anyhow::Result<()> {
            // the file must still exist while the upload runs
            let data = tokio::fs::read(path).await?;
            assert_eq!(data, b"video bytes");
            self.calls
                .lock()
                .unwrap()
                .uploads
                .push((bucket.to_string(), key.to_string()));
            if self.succeed {
                Ok(())
            } else {
                Err(anyhow::anyhow!("AccessDenied"))
            }
        }
    }

    fn build_handler(download_ok: bool, upload_ok: bool) -> (VideoHandler, Arc<Mutex<Calls>>) {
        let calls = Arc::new(Mutex::new(Calls::default()));
        let gatekeeper = Gatekeeper::new(vec![
            ALLOWED.to_string(),
            "http://127.0.0.1:5173".to_string(),
        ])
        .unwrap();
        let fetcher = MediaFetcher::new(Box::new(FakeDownloader {
            calls: calls.clone(),
            succeed: download_ok,
        }));
        let publisher = Publisher::new(
            Box::new(FakeStore {
                calls: calls.clone(),
                succeed: upload_ok,
            }),
            Some("video-bucket".to_string()),
        );
        (
            VideoHandler::new(gatekeeper, fetcher, publisher, None),
            calls,
        )
    }

    fn request(method: Method, origin: Option<&str>, body: &str) -> Request {
        let mut builder = lambda_http::http::Request::builder().method(method);
        if let Some(origin) = origin {
            builder = builder.header("origin", origin);
        }
        let body = if body.is_empty() {
            Body::Empty
        } else {
            Body::from(body)
        };
        builder.body(body).unwrap()
    }

    fn post(body: &str) -> Request {
        request(Method::POST, Some(ALLOWED), body)
    }

    fn body_json(response: &Response<Body>) -> Value {
        serde_json::from_slice(response.body().as_ref()).unwrap()
    }

    fn allow_origin(response: &Response<Body>) -> &str {
        response.headers()["access-control-allow-origin"]
            .to_str()
            .unwrap()
    }

    const VALID: &str = r#"{"video_url": "https://example.com/media/clip.mp4", "email": "a@b.com"}"#;

    #[tokio::test]
    async fn test_preflight_ignores_body() {
        let (handler, calls) = build_handler(true, true);

        for body in ["", "not json", VALID] {
            let response = handler
                .handle(request(Method::OPTIONS, Some(ALLOWED), body))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::NO_CONTENT);
            assert!(response.body().as_ref().is_empty());
            assert_eq!(allow_origin(&response), ALLOWED);
            assert_eq!(
                response.headers()["access-control-allow-methods"],
                "GET, POST, PUT, DELETE, OPTIONS"
            );
        }

        assert!(calls.lock().unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn test_disallowed_origin() {
        let (handler, calls) = build_handler(true, true);

        for method in [Method::POST, Method::OPTIONS] {
            let response = handler
                .handle(request(method, Some("https://evil.example"), VALID))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(allow_origin(&response), ALLOWED);
            assert_eq!(body_json(&response)["message"], "Origin not allowed");
        }

        assert!(calls.lock().unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn test_allowed_origin_echoed() {
        let (handler, _) = build_handler(true, true);
        let response = handler
            .handle(request(Method::POST, Some("http://127.0.0.1:5173"), VALID))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(allow_origin(&response), "http://127.0.0.1:5173");
    }

    #[tokio::test]
    async fn test_missing_fields() {
        let (handler, calls) = build_handler(true, true);
        let bodies = [
            "",
            "{}",
            r#"{"video_url": "https://example.com/a.mp4"}"#,
            r#"{"email": "a@b.com"}"#,
            r#"{"video_url": "", "email": ""}"#,
            r#"{"video_url": null, "email": "a@b.com"}"#,
            r#"{"video_url": false, "email": "a@b.com"}"#,
            r#"{"video_url": 0, "email": "a@b.com"}"#,
            r#"{"video_url": 0.0, "email": "a@b.com"}"#,
            r#"{"video_url": [], "email": "a@b.com"}"#,
            r#"{"video_url": "https://example.com/a.mp4", "email": {}}"#,
            r#"{"videoUrl": "https://example.com/a.mp4", "email": "a@b.com"}"#,
        ];

        for body in bodies {
            let response = handler.handle(post(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {body}");
            assert_eq!(
                body_json(&response)["message"],
                "Missing video_url or email in request body"
            );
            assert_eq!(allow_origin(&response), ALLOWED);
        }

        assert!(calls.lock().unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_body_is_internal_error() {
        let (handler, calls) = build_handler(true, true);

        let bodies = [
            "not json",
            "null",
            "[]",
            r#"["https://example.com/a.mp4", "a@b.com"]"#,
            r#"{"video_url": 5, "email": "a@b.com"}"#,
            r#"{"video_url": "https://example.com/a.mp4", "email": true}"#,
        ];

        for body in bodies {
            let response = handler.handle(post(body)).await.unwrap();
            assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
            let message = body_json(&response)["message"].as_str().unwrap().to_string();
            assert!(message.starts_with("Internal server error: "), "{message}");
            assert_eq!(allow_origin(&response), ALLOWED);
        }

        assert!(calls.lock().unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn test_success() {
        let (handler, calls) = build_handler(true, true);
        let response = handler.handle(post(VALID)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(&response);
        assert_eq!(body["message"], "Success");
        assert_eq!(body["s3_key"], "a_at_b_dot_com/clip.mp4");
        assert_eq!(body["bucket"], "video-bucket");

        let calls = calls.lock().unwrap();
        assert_eq!(calls.downloads.len(), 1);
        assert_eq!(calls.downloads[0].0, "https://example.com/media/clip.mp4");
        assert!(calls.downloads[0].1.ends_with("clip.mp4"));
        assert_eq!(
            calls.uploads,
            vec![(
                "video-bucket".to_string(),
                "a_at_b_dot_com/clip.mp4".to_string()
            )]
        );
    }

    #[tokio::test]
    async fn test_camel_case_key_is_ignored() {
        let (handler, calls) = build_handler(true, true);
        let response = handler
            .handle(post(
                r#"{"video_url": "https://example.com/a.mp4", "videoUrl": "https://example.com/b.mp4", "email": "a@b.com"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(&response)["s3_key"], "a_at_b_dot_com/a.mp4");
        assert_eq!(
            calls.lock().unwrap().downloads[0].0,
            "https://example.com/a.mp4"
        );
    }

    #[tokio::test]
    async fn test_non_ascii_origin_rejected() {
        let (handler, calls) = build_handler(true, true);
        let mut request = post(VALID);
        request.headers_mut().insert(
            "origin",
            HeaderValue::from_bytes("https://évil.example".as_bytes()).unwrap(),
        );

        let response = handler.handle(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(allow_origin(&response), ALLOWED);
        assert_eq!(body_json(&response)["message"], "Origin not allowed");
        assert!(calls.lock().unwrap().downloads.is_empty());
    }

    #[tokio::test]
    async fn test_success_without_origin_and_default_filename() {
        let (handler, _) = build_handler(true, true);
        let response = handler
            .handle(request(
                Method::POST,
                None,
                r#"{"video_url": "https://example.com/", "email": "x.y@z.io"}"#,
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(allow_origin(&response), ALLOWED);
        assert_eq!(body_json(&response)["s3_key"], "x_dot_y_at_z_dot_io/video.mp4");
    }

    #[tokio::test]
    async fn test_download_failure_skips_upload() {
        let (handler, calls) = build_handler(false, true);
        let response = handler.handle(post(VALID)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&response)["message"], "Failed to download video");
        assert_eq!(allow_origin(&response), ALLOWED);

        let calls = calls.lock().unwrap();
        assert_eq!(calls.downloads.len(), 1);
        assert!(calls.uploads.is_empty());
    }

    #[tokio::test]
    async fn test_upload_failure() {
        let (handler, calls) = build_handler(true, false);
        let response = handler.handle(post(VALID)).await.unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_json(&response)["message"], "Failed to upload video to S3");
        assert_eq!(calls.lock().unwrap().uploads.len(), 1);
    }

    #[tokio::test]
    async fn test_scratch_file_removed_on_every_path() {
        for (download_ok, upload_ok) in [(true, true), (true, false), (false, true)] {
            let (handler, calls) = build_handler(download_ok, upload_ok);
            handler.handle(post(VALID)).await.unwrap();

            let calls = calls.lock().unwrap();
            let destination = &calls.downloads[0].1;
            assert!(!destination.exists());
            assert!(!destination.parent().unwrap().exists());
        }
    }

    #[tokio::test]
    async fn test_scratch_dir_setting() {
        let root = tempfile::tempdir().unwrap();
        let (handler, calls) = build_handler(true, true);
        let handler = VideoHandler {
            scratch_dir: Some(root.path().to_path_buf()),
            ..handler
        };

        let response = handler.handle(post(VALID)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let calls = calls.lock().unwrap();
        assert!(calls.downloads[0].1.starts_with(root.path()));
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unusable_scratch_dir_is_internal_error() {
        let (handler, calls) = build_handler(true, true);
        let handler = VideoHandler {
            scratch_dir: Some(PathBuf::from("/nonexistent/clipstash/scratch")),
            ..handler
        };

        let response = handler.handle(post(VALID)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let message = body_json(&response)["message"].as_str().unwrap().to_string();
        assert!(message.starts_with("Internal server error: Failed to create temporary directory"));
        assert!(calls.lock().unwrap().downloads.is_empty());
    }
}
