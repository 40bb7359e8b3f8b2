//! Product-image upload and serving. Uploads are validated, normalized to an
//! RGB encoding when needed, and written to the object-storage bucket under a
//! tenant-scoped key; serving is a redirect to the public object URL.

use std::io::Cursor;
use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use image::{DynamicImage, ImageFormat};
use log::{error, info};
use serde_json::Value;
use uuid::Uuid;

use crate::security::Tenant;
use crate::shared::state::AppState;
use crate::storage;

pub const MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

const ALLOWED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

type ApiResult = Result<Json<Value>, (StatusCode, Json<Value>)>;

pub fn file_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| !ext.is_empty())
}

pub fn is_allowed_extension(ext: &str) -> bool {
    ALLOWED_EXTENSIONS.contains(&ext)
}

pub fn exceeds_size_limit(len: usize) -> bool {
    len > MAX_UPLOAD_BYTES
}

/// Decode-validates the upload and re-encodes non-RGB images. WebP input that
/// needs conversion comes back as PNG, so the returned extension may differ
/// from the submitted one.
pub fn prepare_image(data: &[u8], ext: &str) -> Result<(Vec<u8>, String), String> {
    let img = image::load_from_memory(data).map_err(|_| "Invalid image file".to_string())?;

    if matches!(img, DynamicImage::ImageRgb8(_)) {
        return Ok((data.to_vec(), ext.to_string()));
    }

    let (format, out_ext) = match ext {
        "jpg" | "jpeg" => (ImageFormat::Jpeg, ext.to_string()),
        "png" => (ImageFormat::Png, "png".to_string()),
        _ => (ImageFormat::Png, "png".to_string()),
    };

    let rgb = img.to_rgb8();
    let mut buf = Cursor::new(Vec::new());
    rgb.write_to(&mut buf, format)
        .map_err(|e| format!("Invalid image file: {}", e))?;
    Ok((buf.into_inner(), out_ext))
}

pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    Tenant(tenant_id): Tenant,
    mut multipart: Multipart,
) -> ApiResult {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|_| upload_error(StatusCode::BAD_REQUEST, "No file uploaded"))?
    {
        if field.name() != Some("image") {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_string();
        let ext = match file_extension(&original_name) {
            Some(ext) if is_allowed_extension(&ext) => ext,
            _ => {
                return Err(upload_error(
                    StatusCode::BAD_REQUEST,
                    "Invalid file type. Only PNG, JPEG, JPG are allowed",
                ))
            }
        };

        let data = field.bytes().await.map_err(|_| {
            upload_error(StatusCode::PAYLOAD_TOO_LARGE, "File size exceeds 5MB limit")
        })?;
        if exceeds_size_limit(data.len()) {
            return Err(upload_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                "File size exceeds 5MB limit",
            ));
        }

        let (encoded, final_ext) = prepare_image(&data, &ext)
            .map_err(|msg| upload_error(StatusCode::BAD_REQUEST, &msg))?;

        let filename = format!("{}.{}", Uuid::new_v4().simple(), final_ext);
        let key = storage::image_object_key(&tenant_id, &filename);
        let content_type = mime_guess::from_path(&filename)
            .first()
            .map(|m| m.to_string())
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let Some(s3) = state.drive.as_ref() else {
            return Err(upload_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Storage not configured",
            ));
        };

        storage::upload_object(s3, &state.config.drive.bucket, &key, encoded, &content_type)
            .await
            .map_err(|e| {
                error!("Image upload error: {}", e);
                upload_error(StatusCode::INTERNAL_SERVER_ERROR, "Failed to upload image")
            })?;

        let url = storage::public_object_url(&state.config.drive, &key);
        info!("Image uploaded successfully: {}", url);

        return Ok(Json(serde_json::json!({
            "success": true,
            "path": url,
            "message": "Image uploaded successfully",
        })));
    }

    Err(upload_error(StatusCode::BAD_REQUEST, "No file uploaded"))
}

pub async fn serve_image(
    State(state): State<Arc<AppState>>,
    Path((tenant_id, filename)): Path<(String, String)>,
) -> Result<Redirect, StatusCode> {
    let key = storage::image_object_key(&tenant_id, &filename);

    let Some(s3) = state.drive.as_ref() else {
        return Err(StatusCode::NOT_FOUND);
    };
    if !storage::object_exists(s3, &state.config.drive.bucket, &key).await {
        return Err(StatusCode::NOT_FOUND);
    }

    Ok(Redirect::temporary(&storage::public_object_url(
        &state.config.drive,
        &key,
    )))
}

fn upload_error(status: StatusCode, message: &str) -> (StatusCode, Json<Value>) {
    (
        status,
        Json(serde_json::json!({"success": false, "error": message})),
    )
}

pub fn configure() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/upload", post(upload_image))
        .route(
            "/:tenant_id/Inventory/product_images/:filename",
            get(serve_image),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};

    fn png_rgba_bytes() -> Vec<u8> {
        let img: ImageBuffer<Rgba<u8>, Vec<u8>> =
            ImageBuffer::from_pixel(2, 2, Rgba([10, 20, 30, 128]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn jpeg_rgb_bytes() -> Vec<u8> {
        let img: ImageBuffer<Rgb<u8>, Vec<u8>> = ImageBuffer::from_pixel(2, 2, Rgb([10, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Jpeg).unwrap();
        buf.into_inner()
    }

    #[test]
    fn extension_parsing_is_case_insensitive() {
        assert_eq!(file_extension("photo.PNG").as_deref(), Some("png"));
        assert_eq!(file_extension("a.b.jpeg").as_deref(), Some("jpeg"));
        assert_eq!(file_extension("noext"), None);
        assert_eq!(file_extension("trailing."), None);
    }

    #[test]
    fn only_the_image_allow_list_passes() {
        for ext in ["png", "jpg", "jpeg", "webp"] {
            assert!(is_allowed_extension(ext));
        }
        assert!(!is_allowed_extension("gif"));
        assert!(!is_allowed_extension("svg"));
        assert!(!is_allowed_extension("exe"));
    }

    #[test]
    fn size_limit_is_five_megabytes() {
        assert!(!exceeds_size_limit(5 * 1024 * 1024));
        assert!(exceeds_size_limit(5 * 1024 * 1024 + 1));
        assert!(exceeds_size_limit(6 * 1024 * 1024));
    }

    #[test]
    fn rgb_images_pass_through_untouched() {
        let data = jpeg_rgb_bytes();
        let (out, ext) = prepare_image(&data, "jpg").unwrap();
        assert_eq!(out, data);
        assert_eq!(ext, "jpg");
    }

    #[test]
    fn rgba_images_are_re_encoded_to_rgb() {
        let data = png_rgba_bytes();
        let (out, ext) = prepare_image(&data, "png").unwrap();
        assert_eq!(ext, "png");
        let decoded = image::load_from_memory(&out).unwrap();
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn garbage_bytes_are_rejected() {
        let err = prepare_image(b"definitely not an image", "png").unwrap_err();
        assert_eq!(err, "Invalid image file");
    }
}
