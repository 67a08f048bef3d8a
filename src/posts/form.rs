use axum::extract::multipart::{Field, Multipart};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::db::models::Location;
use crate::error::{AppError, AppResult};

/// A validated post submission with its image spooled to disk.
#[derive(Debug)]
pub struct NewPost {
    pub heading: String,
    pub reviews: String,
    pub location: Option<Location>,
    pub image: NamedTempFile,
}

/// Text fields collected from the multipart body, before validation.
#[derive(Debug, Default)]
struct PostFields {
    heading: Option<String>,
    reviews: Option<String>,
    address: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
}

impl PostFields {
    fn set(&mut self, name: &str, value: String) {
        // First occurrence wins for repeated fields.
        let slot = match name {
            "heading" => &mut self.heading,
            "reviews" => &mut self.reviews,
            "address" => &mut self.address,
            "latitude" => &mut self.latitude,
            "longitude" => &mut self.longitude,
            _ => return,
        };
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    fn into_post(self, image: Option<NamedTempFile>) -> AppResult<NewPost> {
        let heading = required_text(self.heading, "heading")?;
        let reviews = required_text(self.reviews, "reviews")?;
        let location = build_location(
            self.address.as_deref(),
            self.latitude.as_deref(),
            self.longitude.as_deref(),
        )?;
        let image = image.ok_or_else(|| AppError::BadRequest("An image file is required".into()))?;

        Ok(NewPost {
            heading,
            reviews,
            location,
            image,
        })
    }
}

fn required_text(value: Option<String>, field: &str) -> AppResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest(format!("{} is required", field)))
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn parse_coordinate(raw: Option<&str>, field: &str, limit: f64) -> AppResult<Option<f64>> {
    let Some(raw) = non_blank(raw) else {
        return Ok(None);
    };
    let value: f64 = raw
        .parse()
        .map_err(|_| AppError::BadRequest(format!("{} must be a number", field)))?;
    if !value.is_finite() || value.abs() > limit {
        return Err(AppError::BadRequest(format!(
            "{} must be between -{} and {}",
            field, limit, limit
        )));
    }
    Ok(Some(value))
}

/// A location is recorded when an address or at least one coordinate is given.
fn build_location(
    address: Option<&str>,
    latitude: Option<&str>,
    longitude: Option<&str>,
) -> AppResult<Option<Location>> {
    let address = non_blank(address).map(str::to_string);
    let latitude = parse_coordinate(latitude, "latitude", 90.0)?;
    let longitude = parse_coordinate(longitude, "longitude", 180.0)?;

    if address.is_none() && latitude.is_none() && longitude.is_none() {
        return Ok(None);
    }
    Ok(Some(Location {
        address,
        latitude,
        longitude,
    }))
}

fn is_image(content_type: Option<&str>, file_name: Option<&str>) -> bool {
    match content_type {
        Some(ct) if ct != "application/octet-stream" => ct.starts_with("image/"),
        _ => file_name
            .and_then(|name| mime_guess::from_path(name).first())
            .map(|mime| mime.type_() == mime_guess::mime::IMAGE)
            .unwrap_or(false),
    }
}

fn extension_of(file_name: Option<&str>) -> Option<String> {
    let ext = std::path::Path::new(file_name?).extension()?.to_str()?;
    ext.chars()
        .all(|c| c.is_ascii_alphanumeric())
        .then(|| ext.to_ascii_lowercase())
}

/// Stream an upload field into a temp file, keeping the original extension.
async fn spool(mut field: Field<'_>) -> AppResult<NamedTempFile> {
    let suffix = extension_of(field.file_name())
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    let tmp = tempfile::Builder::new()
        .prefix("upload-")
        .suffix(&suffix)
        .tempfile()
        .map_err(|e| AppError::Internal(format!("Failed to create temp file: {}", e)))?;

    let handle = tmp
        .reopen()
        .map_err(|e| AppError::Internal(format!("Failed to open temp file: {}", e)))?;
    let mut out = tokio::fs::File::from_std(handle);
    let mut written = 0usize;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        written += chunk.len();
        out.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write upload: {}", e)))?;
    }
    out.flush()
        .await
        .map_err(|e| AppError::Internal(format!("Failed to write upload: {}", e)))?;

    if written == 0 {
        return Err(AppError::BadRequest("The uploaded image is empty".into()));
    }
    Ok(tmp)
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::BadRequest(format!("Invalid form data: {}", e.body_text()))
}

/// Decode a `multipart/form-data` post submission.
pub async fn decode(mut multipart: Multipart) -> AppResult<NewPost> {
    let mut fields = PostFields::default();
    let mut image = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "file" {
            if image.is_some() {
                continue;
            }
            if !is_image(field.content_type(), field.file_name()) {
                return Err(AppError::BadRequest("The uploaded file must be an image".into()));
            }
            image = Some(spool(field).await?);
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            fields.set(&name, value);
        }
    }

    fields.into_post(image)
}
