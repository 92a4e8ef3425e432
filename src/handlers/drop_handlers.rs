//! HTTP handlers for the upload and download pipelines.
//! Every request funnels through `dispatch`, which routes on method alone:
//! POST uploads, anything else is treated as a token download. Payloads are
//! streamed out through `StorageService` rather than buffered.

use crate::{
    errors::AppError,
    services::storage_service::{StorageError, StorageService},
};
use axum::{
    body::Body,
    extract::{
        FromRequest, Multipart, Request, State,
        multipart::Field,
    },
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use futures::StreamExt;
use std::{io, io::SeekFrom, path::Path};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};
use tokio_util::io::ReaderStream;

const OCTET_STREAM: &str = "application/octet-stream";
const TEXT_PLAIN_UTF8: &str = "text/plain; charset=utf-8";

/// How much of the payload the download pipeline inspects when sniffing a
/// content type.
const SNIFF_LEN: usize = 512;

/// Entry point for every request: POST is an upload, any other method is a
/// download of whatever token the path names.
pub async fn dispatch(State(service): State<StorageService>, request: Request) -> Response {
    if request.method() == Method::POST {
        upload(service, request).await.into_response()
    } else {
        download(service, request).await.into_response()
    }
}

/// Upload pipeline: bounded multipart body with a required `file` part and
/// optional `auto_delete`/`header_download` flags. Replies with the bare
/// token string.
async fn upload(service: StorageService, request: Request) -> Result<Response, AppError> {
    let mut multipart = Multipart::from_request(request, &())
        .await
        .map_err(|err| AppError::internal(format!("unable to parse multipart form: {}", err)))?;

    let mut file_part: Option<(Bytes, String, String)> = None;
    let mut auto_delete = false;
    let mut header_download = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::internal(format!("unable to parse multipart form: {}", err)))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let filename = field.file_name().unwrap_or_default().to_string();
                let content_type = match field.content_type() {
                    Some(declared) if !declared.is_empty() => declared.to_string(),
                    _ => OCTET_STREAM.to_string(),
                };
                let payload = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::internal(format!("unable to read form file: {}", err)))?;
                file_part = Some((payload, filename, content_type));
            }
            "auto_delete" => auto_delete = flag_requested(field).await?,
            "header_download" => header_download = flag_requested(field).await?,
            _ => {}
        }
    }

    let Some((payload, filename, content_type)) = file_part else {
        return Err(AppError::bad_request("multipart form has no `file` part"));
    };

    let (token, dir) = service
        .allocate()
        .await
        .map_err(|err| AppError::internal(format!("unable to allocate token: {}", err)))?;

    service
        .write_object(
            &dir,
            &payload,
            &filename,
            &content_type,
            auto_delete,
            header_download,
        )
        .await
        .map_err(|err| {
            AppError::internal(format!("unable to write object {}: {}", dir.display(), err))
        })?;

    tracing::info!("{} {} {}", token, filename, content_type);

    Ok((StatusCode::OK, token).into_response())
}

/// Download pipeline: the request path, stripped of its leading `/`, is the
/// token. Serves the payload inline with a sniffed content type unless the
/// object forces an attachment, and tears down one-time objects after the
/// body has been sent.
async fn download(service: StorageService, request: Request) -> Result<Response, AppError> {
    let token = request.uri().path().trim_start_matches('/').to_string();

    tracing::debug!("download: {}", token);

    // Sole traversal defense: a token never contains a separator.
    if token.contains('/') {
        return Err(AppError::not_found(format!(
            "token `{}` contains a path separator",
            token
        )));
    }

    let meta = service.read_metadata(&token).await.map_err(|err| match err {
        StorageError::NotFound(_) => AppError::not_found(format!("download: not found: {}", token)),
        other => AppError::internal(format!("unable to read metadata of `{}`: {}", token, other)),
    })?;

    if meta.auto_delete && is_bot(&request) {
        // Bots must not consume one-time links: no payload, no deletion.
        return Ok(StatusCode::FOUND.into_response());
    }

    let (mut file, size) = service.open_payload(&token).await.map_err(|err| {
        AppError::internal(format!("unable to open payload of `{}`: {}", token, err))
    })?;

    let (content_type, disposition) = if meta.header_download {
        (OCTET_STREAM.to_string(), "attachment")
    } else {
        let sniffed = sniff_payload(&mut file).await.map_err(|err| {
            AppError::internal(format!("unable to sniff payload of `{}`: {}", token, err))
        })?;
        (sniffed, "inline")
    };

    // Headers may already be on the wire when a read fails mid-stream, so
    // copy errors can only be logged, not turned into a clean status.
    let log_token = token.clone();
    let stream = ReaderStream::new(file).map(move |chunk| {
        if let Err(err) = &chunk {
            tracing::error!("unable to stream payload of `{}`: {}", log_token, err);
        }
        chunk
    });
    let body = if meta.auto_delete {
        let cleanup = DeleteWhenSent::new(service.clone(), token);
        Body::from_stream(stream.map(move |chunk| {
            let _pending = &cleanup;
            chunk
        }))
    } else {
        Body::from_stream(stream)
    };

    let mut response = Response::new(body);
    let headers = response.headers_mut();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_str(&content_type)
            .unwrap_or_else(|_| HeaderValue::from_static(OCTET_STREAM)),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        disposition_value(disposition, &meta.filename),
    );
    headers.insert(
        header::CONTENT_LENGTH,
        HeaderValue::from_str(&size.to_string()).unwrap_or_else(|_| HeaderValue::from_static("0")),
    );

    Ok(response)
}

/// A boolean form field counts only when its value is exactly `"1"`.
async fn flag_requested(field: Field<'_>) -> Result<bool, AppError> {
    let value = field
        .text()
        .await
        .map_err(|err| AppError::internal(format!("unable to read form field: {}", err)))?;
    Ok(value == "1")
}

/// Removes a one-time object once the response body is done, whether the
/// transfer completed or the client went away mid-stream.
struct DeleteWhenSent {
    service: StorageService,
    token: String,
}

impl DeleteWhenSent {
    fn new(service: StorageService, token: String) -> Self {
        Self { service, token }
    }
}

impl Drop for DeleteWhenSent {
    fn drop(&mut self) {
        let service = self.service.clone();
        let token = std::mem::take(&mut self.token);
        tokio::spawn(async move {
            service.delete_object(&token).await;
        });
    }
}

/// User-agent heuristic for auto-delete links. An opt-out convenience, not
/// a security boundary.
fn is_bot(request: &Request) -> bool {
    request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|agent| agent.to_ascii_lowercase().contains("bot"))
}

/// Read up to the first 512 bytes, sniff a MIME type from them, and rewind
/// so the subsequent streamed response starts at byte zero.
async fn sniff_payload(file: &mut File) -> io::Result<String> {
    let mut prefix = vec![0u8; SNIFF_LEN];
    let mut filled = 0;
    while filled < prefix.len() {
        let read = file.read(&mut prefix[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
    }
    prefix.truncate(filled);

    file.seek(SeekFrom::Start(0)).await?;

    Ok(sniff_mime(&prefix).to_string())
}

/// Magic-byte detection first, then a UTF-8 text check, then the generic
/// binary type.
fn sniff_mime(prefix: &[u8]) -> &'static str {
    if let Some(kind) = infer::get(prefix) {
        return kind.mime_type();
    }
    if prefix.is_empty() {
        return OCTET_STREAM;
    }
    match std::str::from_utf8(prefix) {
        Ok(_) => TEXT_PLAIN_UTF8,
        // A multi-byte character cut off at the sniff boundary is still text.
        Err(err) if err.valid_up_to() > 0 && err.error_len().is_none() => TEXT_PLAIN_UTF8,
        Err(_) => OCTET_STREAM,
    }
}

/// Build the disposition header value, keeping only the basename of the
/// stored filename so path segments cannot smuggle anything into the header.
fn disposition_value(kind: &'static str, stored_filename: &str) -> HeaderValue {
    let base = Path::new(stored_filename)
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    HeaderValue::from_str(&format!("{}; filename=\"{}\"", kind, base))
        .unwrap_or_else(|_| HeaderValue::from_static(kind))
}
