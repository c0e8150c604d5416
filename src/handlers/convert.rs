use axum::{
    body::{Body, Bytes},
    extract::{Multipart, State, multipart::MultipartRejection},
    http::{StatusCode, header},
    response::Response,
};
use futures::stream;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::error::{ConvertError, InputRejection, Result};
use crate::state::AppState;
use crate::validation::Upload;

const UPLOAD_FIELD: &str = "file";
const STREAM_CHUNK: usize = 64 * 1024;

// POST /api/convert/ppt-to-pdf
pub async fn convert_handler(
    State(state): State<Arc<AppState>>,
    multipart: std::result::Result<Multipart, MultipartRejection>,
) -> Result<Response> {
    let mut multipart =
        multipart.map_err(|e| ConvertError::from(InputRejection::Malformed(e.body_text())))?;
    let upload = read_upload(&mut multipart, state.service.max_upload_bytes()).await?;

    let document = state.service.convert_upload(upload).await?;

    // The file handle stays valid after the workspace is unlinked
    let body = Body::from_stream(stream::try_unfold(document.file, next_chunk));

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/pdf")
        .header(header::CONTENT_LENGTH, document.size)
        .header(
            header::CONTENT_DISPOSITION,
            format!("attachment; filename=\"{}\"", document.download_name),
        )
        .body(body);

    // Schedule destruction whether or not the response could be built
    state.service.release(document.workspace);

    response.map_err(|e| ConvertError::Conversion(format!("failed to build response: {}", e)))
}

async fn next_chunk(mut file: File) -> std::io::Result<Option<(Bytes, File)>> {
    let mut buf = vec![0u8; STREAM_CHUNK];
    let n = file.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((Bytes::from(buf), file)))
}

// Pull the `file` field out of the multipart body, bailing out once it
// grows past the upload limit.
async fn read_upload(multipart: &mut Multipart, max_bytes: u64) -> Result<Upload> {
    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error(0, max_bytes))? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        let content_type = field.content_type().map(str::to_string);

        let mut data = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(multipart_error(data.len() as u64, max_bytes))?
        {
            data.extend_from_slice(&chunk);
            if data.len() as u64 > max_bytes {
                return Err(InputRejection::TooLarge {
                    size: data.len() as u64,
                    max: max_bytes,
                }
                .into());
            }
        }

        if filename.is_empty() {
            return Err(InputRejection::MissingFile.into());
        }
        return Ok(Upload {
            filename,
            content_type,
            data,
        });
    }

    Err(InputRejection::MissingFile.into())
}

fn multipart_error(
    received: u64,
    max_bytes: u64,
) -> impl Fn(axum::extract::multipart::MultipartError) -> ConvertError {
    move |e| {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            InputRejection::TooLarge {
                size: received,
                max: max_bytes,
            }
            .into()
        } else {
            InputRejection::Malformed(e.body_text()).into()
        }
    }
}
