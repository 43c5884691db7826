//! Upload session endpoints.

use crate::auth::get_trace_id;
use crate::error::{ApiError, ApiResult};
use crate::metrics::{
    BYTES_RECEIVED, CHUNK_APPEND_DURATION, CHUNKS_DUPLICATE, CHUNKS_RECEIVED, FINALIZE_DURATION,
    record_upload_error,
};
use crate::state::AppState;
use axum::Json;
use axum::body::Body;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::StatusCode;
use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use hopper_assembler::{
    AppendChunk, ChunkReceipt, FinalizedUpload, OpenSession, SessionSnapshot, UploadError,
};
use hopper_core::SessionId;
use percent_encoding::percent_decode_str;
use serde::Deserialize;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

/// Header naming the file the chunks belong to. Percent-encoded UTF-8, so
/// names outside visible ASCII can be sent.
pub const UPLOAD_NAME_HEADER: &str = "x-upload-name";

/// Header carrying the declared total size of the upload.
pub const UPLOAD_TOTAL_SIZE_HEADER: &str = "x-upload-total-size";

/// Maximum size of a create-session request body.
const MAX_CREATE_BODY_SIZE: usize = 64 * 1024;

/// Request body for `POST /v1/uploads`.
#[derive(Debug, Deserialize)]
pub struct CreateUploadRequest {
    pub session_id: String,
    pub file_name: String,
    pub total_size: u64,
    /// Falls back to the policy's default chunk size.
    #[serde(default)]
    pub chunk_size: Option<u64>,
}

/// Remote address of the connection, when the server was started with
/// connect info.
fn client_addr(req: &Request) -> Option<IpAddr> {
    req.extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
}

fn required_header<'a>(req: &'a Request, name: &str) -> ApiResult<&'a str> {
    req.headers()
        .get(name)
        .ok_or_else(|| ApiError::BadRequest(format!("missing {name} header")))?
        .to_str()
        .map_err(|_| ApiError::BadRequest(format!("{name} header is not valid ASCII")))
}

/// Decode the percent-encoded `x-upload-name` header.
fn declared_name(req: &Request) -> ApiResult<String> {
    let raw = required_header(req, UPLOAD_NAME_HEADER)?;
    percent_decode_str(raw)
        .decode_utf8()
        .map(|name| name.into_owned())
        .map_err(|_| {
            ApiError::BadRequest(format!("{UPLOAD_NAME_HEADER} is not percent-encoded UTF-8"))
        })
}

enum ChunkBody {
    Complete(Bytes),
    /// Reading stopped once the body passed the limit, after this many bytes.
    Oversized(u64),
}

/// Buffer a chunk body of at most `limit` bytes.
async fn read_chunk_body(body: Body, limit: usize) -> ApiResult<ChunkBody> {
    let mut stream = body.into_data_stream();
    let mut buf = BytesMut::new();
    while let Some(frame) = stream.next().await {
        let frame = frame
            .map_err(|e| ApiError::BadRequest(format!("failed to read chunk body: {e}")))?;
        let seen = buf.len().saturating_add(frame.len());
        if seen > limit {
            return Ok(ChunkBody::Oversized(seen as u64));
        }
        buf.extend_from_slice(&frame);
    }
    Ok(ChunkBody::Complete(buf.freeze()))
}

fn observe_error(err: UploadError) -> ApiError {
    record_upload_error(err.code());
    ApiError::Upload(err)
}

/// POST /v1/uploads - Open an upload session.
#[tracing::instrument(skip(state, req))]
pub async fn create_upload(
    State(state): State<AppState>,
    req: Request,
) -> ApiResult<(StatusCode, Json<SessionSnapshot>)> {
    let client_addr = client_addr(&req);
    let body = axum::body::to_bytes(req.into_body(), MAX_CREATE_BODY_SIZE)
        .await
        .map_err(|e| ApiError::BadRequest(format!("failed to read body: {e}")))?;
    let body: CreateUploadRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON: {e}")))?;

    let session_id = SessionId::parse(&body.session_id)?;
    let snapshot = state
        .assembler
        .open_session(OpenSession {
            session_id,
            declared_name: body.file_name,
            total_size: body.total_size,
            chunk_size: body.chunk_size,
            client_addr,
        })
        .await
        .map_err(observe_error)?;

    tracing::info!(
        session_id = %snapshot.session_id,
        total_size = snapshot.total_size,
        expected_chunks = snapshot.expected_chunks,
        "Upload session opened"
    );
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// PUT /v1/uploads/{session_id}/chunks/{index} - Upload one chunk.
///
/// The file name and total size travel in headers on every chunk so the
/// first chunk can open the session implicitly.
#[tracing::instrument(skip(state, req), fields(session_id = %session_id, index = %index))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    Path((session_id, index)): Path<(String, String)>,
    req: Request,
) -> ApiResult<Json<ChunkReceipt>> {
    let start_time = Instant::now();
    let trace_id = get_trace_id(&req).unwrap_or_default();

    let session_id = SessionId::parse(&session_id)?;
    let index: u32 = index
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid chunk index: {index}")))?;
    let declared_name = declared_name(&req)?;
    let total_size: u64 = required_header(&req, UPLOAD_TOTAL_SIZE_HEADER)?
        .trim()
        .parse()
        .map_err(|_| {
            ApiError::BadRequest(format!("{UPLOAD_TOTAL_SIZE_HEADER} must be an integer"))
        })?;
    let client_addr = client_addr(&req);

    let data = match read_chunk_body(req.into_body(), state.max_chunk_body()).await? {
        ChunkBody::Complete(data) => data,
        ChunkBody::Oversized(observed) => {
            let err = state
                .assembler
                .reject_oversized_chunk(&session_id, index, observed, client_addr)
                .await;
            return Err(observe_error(err));
        }
    };
    let len = data.len() as u64;

    let receipt = state
        .assembler
        .append_chunk(AppendChunk {
            session_id,
            index,
            data,
            declared_name,
            total_size,
            client_addr,
        })
        .await
        .map_err(observe_error)?;

    if receipt.duplicate {
        CHUNKS_DUPLICATE.inc();
    } else {
        CHUNKS_RECEIVED.inc();
        BYTES_RECEIVED.inc_by(len);
    }
    CHUNK_APPEND_DURATION.observe(start_time.elapsed().as_secs_f64());

    tracing::debug!(
        trace_id = %trace_id,
        duplicate = receipt.duplicate,
        missing = receipt.missing,
        "Chunk accepted"
    );
    Ok(Json(receipt))
}

/// POST /v1/uploads/{session_id}/finalize - Validate and promote.
#[tracing::instrument(skip(state, req), fields(session_id = %session_id))]
pub async fn finalize_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    req: Request,
) -> ApiResult<Json<FinalizedUpload>> {
    let start_time = Instant::now();
    let session_id = SessionId::parse(&session_id)?;
    let client_addr = client_addr(&req);

    let finalized = state
        .assembler
        .finalize(&session_id, client_addr)
        .await
        .map_err(observe_error)?;

    FINALIZE_DURATION.observe(start_time.elapsed().as_secs_f64());
    Ok(Json(finalized))
}

/// GET /v1/uploads/{session_id} - Session status.
#[tracing::instrument(skip(state), fields(session_id = %session_id))]
pub async fn get_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ApiResult<Json<SessionSnapshot>> {
    let session_id = SessionId::parse(&session_id)?;
    let snapshot = state
        .assembler
        .session(&session_id)
        .await
        .ok_or_else(|| UploadError::UnknownSession(session_id.to_string()))?;
    Ok(Json(snapshot))
}

/// DELETE /v1/uploads/{session_id} - Abort an open session.
#[tracing::instrument(skip(state, req), fields(session_id = %session_id))]
pub async fn abort_upload(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    req: Request,
) -> ApiResult<StatusCode> {
    let session_id = SessionId::parse(&session_id)?;
    let client_addr = client_addr(&req);

    state
        .assembler
        .abort(&session_id, client_addr)
        .await
        .map_err(observe_error)?;

    Ok(StatusCode::NO_CONTENT)
}
