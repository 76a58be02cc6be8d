use axum::{
    body::Body,
    extract::{Path, Query},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use bytes::Bytes;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{FileInfo, FsQuery, ListingResponse, MkdirRequest, RenameRequest};
use crate::vfs::{path, DirectoryListable, Driver, Handle};

fn requested(p: Option<Path<String>>) -> String {
    path::clean(&p.map(|Path(p)| p).unwrap_or_default())
}

/// Read a file or list a directory
/// GET /api/fs/*path?offset=0&limit=100
pub async fn read_path(
    Extension(driver): Extension<Driver>,
    p: Option<Path<String>>,
    Query(query): Query<FsQuery>,
) -> Result<Response> {
    let abs_path = requested(p);

    match driver.open(&abs_path).await? {
        Handle::Directory(mut dir) => {
            let offset = query.offset.unwrap_or(0);
            let total = dir.len();
            dir.seek_entries(offset);
            let entries = dir
                .list_entries(query.limit.unwrap_or(-1))
                .iter()
                .map(FileInfo::from)
                .collect();

            let listing = ListingResponse {
                path: abs_path,
                total,
                offset,
                entries,
            };
            Ok(Json(ApiResponse::success(listing)).into_response())
        }
        mut handle @ Handle::File(_) => {
            let mut data = Vec::new();
            handle.readable()?.read_to_end(&mut data).await?;
            handle.close().await?;

            Response::builder()
                .header(header::CONTENT_TYPE, "application/octet-stream")
                .header(header::CONTENT_LENGTH, data.len())
                .body(Body::from(data))
                .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))
        }
    }
}

/// Create or overwrite a file with the request body
/// PUT /api/fs/*path
pub async fn write_path(
    Extension(driver): Extension<Driver>,
    p: Option<Path<String>>,
    body: Bytes,
) -> Result<Json<ApiResponse<FileInfo>>> {
    let abs_path = requested(p);

    let mut handle = driver.create(&abs_path).await?;
    handle.writable()?.write_all(&body).await?;
    let record = handle.close().await?;

    Ok(Json(ApiResponse::success(FileInfo::from(record))))
}

/// Remove a file or directory
/// DELETE /api/fs/*path?recursive=true
pub async fn delete_path(
    Extension(driver): Extension<Driver>,
    p: Option<Path<String>>,
    Query(query): Query<FsQuery>,
) -> Result<Json<ApiResponse<()>>> {
    let abs_path = requested(p);

    if query.recursive {
        driver.remove_all(&abs_path).await?;
    } else {
        driver.remove(&abs_path).await?;
    }
    Ok(Json(ApiResponse::<()>::success_message("Removed")))
}

/// Create a directory
/// POST /api/mkdir
pub async fn mkdir(
    Extension(driver): Extension<Driver>,
    Json(req): Json<MkdirRequest>,
) -> Result<Json<ApiResponse<FileInfo>>> {
    if req.parents {
        driver.mkdir_all(&req.path, req.mode).await?;
    } else {
        driver.mkdir(&req.path, req.mode).await?;
    }

    let record = driver.stat(&req.path).await?;
    Ok(Json(ApiResponse::success(FileInfo::from(record))))
}

/// Move a file or empty directory
/// POST /api/rename
pub async fn rename(
    Extension(driver): Extension<Driver>,
    Json(req): Json<RenameRequest>,
) -> Result<Json<ApiResponse<FileInfo>>> {
    driver.rename(&req.from, &req.to).await?;

    let record = driver.stat(&req.to).await?;
    Ok(Json(ApiResponse::success(FileInfo::from(record))))
}

/// GET /api/stat/*path
pub async fn stat(
    Extension(driver): Extension<Driver>,
    p: Option<Path<String>>,
) -> Result<Json<ApiResponse<FileInfo>>> {
    let record = driver.stat(&requested(p)).await?;
    Ok(Json(ApiResponse::success(FileInfo::from(record))))
}
