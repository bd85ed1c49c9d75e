use actix_multipart::Multipart;
use actix_web::dev::ServiceRequest;
use actix_web::web::{self, Data, Path};
use actix_web::{HttpResponse, ResponseError};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use futures_util::StreamExt;
use log::error;
use thiserror::Error;
use vanish_core::{FileContent, SecretContent};
use vanish_shared::{ErrorDetail, HealthStatus, SecretLink, SecretResponse, sanitize_filename};
use vanish_srv::{SecretStore, ServerError};

const DEFAULT_FILE_NAME: &str = "secret";
const DEFAULT_MIME: &str = "application/octet-stream";
const SECRETS_PREFIX: &str = "/api/secrets/";

/// Upload limits shared with every worker.
#[derive(Clone, Copy, Debug)]
pub struct UploadLimits {
    pub max_size: usize,
}

/// Everything but the rate limited create route, which `main` registers.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/api/secrets/{id}", web::get().to(get_secret))
        .route("/healthcheck", web::get().to(healthcheck));
}

/// Request path for the access log. A secret id in the path is a live
/// credential until it is read, so it is replaced with a placeholder.
pub fn access_log_path(req: &ServiceRequest) -> String {
    redact_secret_path(req.path())
}

fn redact_secret_path(path: &str) -> String {
    match path.strip_prefix(SECRETS_PREFIX) {
        Some(rest) if !rest.is_empty() => format!("{SECRETS_PREFIX}<id>"),
        _ => path.to_string(),
    }
}

pub async fn get_secret(id: Path<String>, store: Data<SecretStore>) -> HttpResponse {
    let id = id.into_inner();

    store
        .consume(&id)
        .await
        .map_or_else(server_error_to_response, |content| {
            HttpResponse::Ok().json(content_to_response(content))
        })
}

pub async fn create_secret(
    store: Data<SecretStore>,
    limits: Data<UploadLimits>,
    payload: Multipart,
) -> HttpResponse {
    let form = match read_secret_form(payload, limits.max_size).await {
        Ok(form) => form,
        Err(e) => return e.error_response(),
    };

    let Some(ttl) = form.ttl else {
        return bad_request("ttl is required");
    };

    store
        .create(form.message, form.file, ttl)
        .await
        .map_or_else(server_error_to_response, |id| {
            HttpResponse::Ok().json(SecretLink::for_id(&id.to_string()))
        })
}

pub async fn healthcheck(store: Data<SecretStore>) -> HttpResponse {
    match store.ping().await {
        Ok(()) => HttpResponse::Ok().json(HealthStatus::ok()),
        Err(_) => {
            HttpResponse::ServiceUnavailable().json(ErrorDetail::new("Backing store unavailable"))
        }
    }
}

fn content_to_response(content: SecretContent) -> SecretResponse {
    let (file_data, file_name, file_mime) = match content.file {
        Some(file) => (
            Some(STANDARD.encode(&file.bytes)),
            Some(file.file_name),
            Some(file.mime_type),
        ),
        None => (None, None, None),
    };

    SecretResponse {
        message: content.message,
        file_data,
        file_name,
        file_mime,
    }
}

fn bad_request(detail: &str) -> HttpResponse {
    HttpResponse::BadRequest().json(ErrorDetail::new(detail))
}

fn server_error_to_response(e: ServerError) -> HttpResponse {
    match e {
        ServerError::InvalidInput(detail) => bad_request(detail),
        ServerError::NotFound => HttpResponse::NotFound().json(ErrorDetail::new(e.to_string())),
        ServerError::CorruptRecord(_) | ServerError::Encryption(_) => {
            error!("Secret store error: {e}");
            HttpResponse::InternalServerError().json(ErrorDetail::new("internal server error"))
        }
        ServerError::BackendUnavailable(_) => {
            error!("Secret store error: {e}");
            HttpResponse::ServiceUnavailable().json(ErrorDetail::new("service unavailable"))
        }
    }
}

#[derive(Debug, Default)]
struct SecretForm {
    ttl: Option<u64>,
    message: Option<String>,
    file: Option<FileContent>,
}

#[derive(Error, Debug)]
enum FormError {
    #[error("Payload too large. Max size is {0} bytes")]
    TooLarge(usize),
    #[error("{0}")]
    Malformed(String),
}

impl ResponseError for FormError {
    fn error_response(&self) -> HttpResponse {
        match self {
            Self::TooLarge(_) => {
                HttpResponse::PayloadTooLarge().json(ErrorDetail::new(self.to_string()))
            }
            Self::Malformed(_) => bad_request(&self.to_string()),
        }
    }
}

/// Drains the multipart body, keeping `ttl`, `message` and `file` and
/// enforcing `max_size` over all parts together.
async fn read_secret_form(
    mut payload: Multipart,
    max_size: usize,
) -> Result<SecretForm, FormError> {
    let mut form = SecretForm::default();
    let mut total = 0usize;

    while let Some(field) = payload.next().await {
        let mut field = field.map_err(|e| FormError::Malformed(e.to_string()))?;

        let name = field.name().unwrap_or_default().to_string();
        let file_name = field
            .content_disposition()
            .and_then(|cd| cd.get_filename())
            .map(str::to_string);
        let mime = field.content_type().map(ToString::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| FormError::Malformed(e.to_string()))?;
            total += chunk.len();
            if total > max_size {
                return Err(FormError::TooLarge(max_size));
            }
            data.extend_from_slice(&chunk);
        }

        match name.as_str() {
            "ttl" => {
                let ttl = std::str::from_utf8(&data)
                    .ok()
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        FormError::Malformed("ttl must be a positive integer".to_string())
                    })?;
                form.ttl = Some(ttl);
            }
            "message" => {
                let message = String::from_utf8(data)
                    .map_err(|_| FormError::Malformed("message must be UTF-8 text".to_string()))?;
                form.message = Some(message);
            }
            "file" => {
                let file_name = file_name
                    .as_deref()
                    .and_then(|n| sanitize_filename(n).ok())
                    .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string());

                form.file = Some(FileContent {
                    bytes: data,
                    file_name,
                    mime_type: mime.unwrap_or_else(|| DEFAULT_MIME.to_string()),
                });
            }
            _ => {}
        }
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::{App, test};
    use std::sync::Arc;
    use vanish_core::Cipher;
    use vanish_core::crypto::KEY_LEN;
    use vanish_srv::{MemoryBackend, StoreSettings};

    const BOUNDARY: &str = "vanish-test-boundary";

    fn test_store() -> SecretStore {
        SecretStore::new(
            Arc::new(MemoryBackend::new()),
            Arc::new(Cipher::new(&[9u8; KEY_LEN])),
            StoreSettings::default(),
        )
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a str, &'a [u8]),
    }

    fn multipart_body(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n")
                            .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                Part::File(file_name, mime, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: {mime}\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn create_request(parts: &[Part<'_>]) -> test::TestRequest {
        test::TestRequest::post()
            .uri("/api/secrets/")
            .insert_header((
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            ))
            .set_payload(multipart_body(parts))
    }

    macro_rules! test_app {
        ($store:expr, $max_size:expr) => {
            test::init_service(
                App::new()
                    .app_data(Data::new($store))
                    .app_data(Data::new(UploadLimits {
                        max_size: $max_size,
                    }))
                    .route("/api/secrets/", web::post().to(create_secret))
                    .configure(configure),
            )
            .await
        };
    }

    #[actix_web::test]
    async fn test_create_then_read_once() {
        let app = test_app!(test_store(), 1024);

        let req = create_request(&[Part::Text("ttl", "60"), Part::Text("message", "hello")]);
        let link: SecretLink = test::call_and_read_body_json(&app, req.to_request()).await;
        let id = link.id().unwrap().to_string();
        assert_eq!(link.url, format!("/secrets/{id}"));

        let req = test::TestRequest::get()
            .uri(&format!("/api/secrets/{id}"))
            .to_request();
        let secret: SecretResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(secret.message.as_deref(), Some("hello"));
        assert!(secret.file_data.is_none());

        let req = test::TestRequest::get()
            .uri(&format!("/api/secrets/{id}"))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_file_upload_round_trip() {
        let app = test_app!(test_store(), 1024);
        let bytes: &[u8] = &[0, 1, 2, 250, 251];

        let req = create_request(&[
            Part::Text("ttl", "60"),
            Part::File("backup.bin", "application/octet-stream", bytes),
        ]);
        let link: SecretLink = test::call_and_read_body_json(&app, req.to_request()).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/secrets/{}", link.id().unwrap()))
            .to_request();
        let secret: SecretResponse = test::call_and_read_body_json(&app, req).await;

        assert_eq!(secret.file_name.as_deref(), Some("backup.bin"));
        assert_eq!(secret.file_mime.as_deref(), Some("application/octet-stream"));
        assert_eq!(STANDARD.decode(secret.file_data.unwrap()).unwrap(), bytes);
        assert!(secret.message.is_none());
    }

    #[actix_web::test]
    async fn test_empty_form_rejected() {
        let app = test_app!(test_store(), 1024);

        let req = create_request(&[Part::Text("ttl", "60")]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let body: ErrorDetail = test::read_body_json(resp).await;
        assert_eq!(body.detail, "Must provide message or file");
    }

    #[actix_web::test]
    async fn test_ttl_validation() {
        let app = test_app!(test_store(), 1024);

        for parts in [
            vec![Part::Text("message", "hi")],
            vec![Part::Text("ttl", "soon"), Part::Text("message", "hi")],
            vec![Part::Text("ttl", "-5"), Part::Text("message", "hi")],
            vec![Part::Text("ttl", "0"), Part::Text("message", "hi")],
        ] {
            let resp = test::call_service(&app, create_request(&parts).to_request()).await;
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[actix_web::test]
    async fn test_oversized_upload_rejected() {
        let app = test_app!(test_store(), 16);
        let bytes = [7u8; 64];

        let req = create_request(&[
            Part::Text("ttl", "60"),
            Part::File("big.bin", "application/octet-stream", &bytes),
        ]);
        let resp = test::call_service(&app, req.to_request()).await;
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[actix_web::test]
    async fn test_unsafe_file_name_replaced() {
        let app = test_app!(test_store(), 1024);

        let req = create_request(&[
            Part::Text("ttl", "60"),
            Part::File("../../etc/passwd", "text/plain", b"root"),
        ]);
        let link: SecretLink = test::call_and_read_body_json(&app, req.to_request()).await;

        let req = test::TestRequest::get()
            .uri(&format!("/api/secrets/{}", link.id().unwrap()))
            .to_request();
        let secret: SecretResponse = test::call_and_read_body_json(&app, req).await;
        assert_eq!(secret.file_name.as_deref(), Some(DEFAULT_FILE_NAME));
    }

    #[actix_web::test]
    async fn test_unknown_secret_not_found() {
        let app = test_app!(test_store(), 1024);

        let req = test::TestRequest::get()
            .uri("/api/secrets/does-not-exist")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[actix_web::test]
    async fn test_healthcheck_ok() {
        let app = test_app!(test_store(), 1024);

        let req = test::TestRequest::get().uri("/healthcheck").to_request();
        let status: HealthStatus = test::call_and_read_body_json(&app, req).await;
        assert_eq!(status, HealthStatus::ok());
    }

    #[::std::prelude::v1::test]
    fn test_secret_ids_redacted_from_access_log() {
        let id = "0b6f3c52-5a8e-4b1c-9d7a-2f4e1c3b9a10";
        let redacted = redact_secret_path(&format!("/api/secrets/{id}"));
        assert_eq!(redacted, "/api/secrets/<id>");
        assert!(!redacted.contains(id));

        assert_eq!(redact_secret_path("/api/secrets/"), "/api/secrets/");
        assert_eq!(redact_secret_path("/healthcheck"), "/healthcheck");

        let req = test::TestRequest::get()
            .uri(&format!("/api/secrets/{id}?x=1"))
            .to_srv_request();
        assert_eq!(access_log_path(&req), "/api/secrets/<id>");
    }
}
