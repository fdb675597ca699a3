//! Profile photos: fetch an image by URL, crop it, store it as JPEG.

use std::io::Cursor;

use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};

use crate::error::{ApiError, ApiResult};

/// Pixel rectangle to keep, `[x_start, x_end) x [y_start, y_end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBox {
    pub x_start: i64,
    pub y_start: i64,
    pub x_end: i64,
    pub y_end: i64,
}

/// Where profile photos are downloaded from.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> ApiResult<Vec<u8>>;
}

/// Downloads over HTTP(S).
#[derive(Debug, Clone, Default)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> ApiResult<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::invalid(format!("Could not fetch image: {e}")))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(ApiError::invalid(
                "Image URL returned a HTTP status other than 200.",
            ));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ApiError::invalid(format!("Could not fetch image: {e}")))?;
        Ok(bytes.to_vec())
    }
}

/// Decodes `bytes`, crops to `crop` and re-encodes as JPEG.
pub fn crop_to_jpeg(bytes: &[u8], crop: CropBox) -> ApiResult<Vec<u8>> {
    let img = image::load_from_memory(bytes)
        .map_err(|_| ApiError::invalid("Image uploaded is not a valid image."))?;
    let (width, height) = (i64::from(img.width()), i64::from(img.height()));

    if crop.x_start < 0 || crop.y_start < 0 || crop.x_end > width || crop.y_end > height {
        return Err(ApiError::invalid(
            "The new dimensions are not within the bounds of the image at the URL.",
        ));
    }
    if crop.x_end <= crop.x_start || crop.y_end <= crop.y_start {
        return Err(ApiError::invalid("The crop region is empty."));
    }

    let cropped = img.crop_imm(
        crop.x_start as u32,
        crop.y_start as u32,
        (crop.x_end - crop.x_start) as u32,
        (crop.y_end - crop.y_start) as u32,
    );
    // JPEG has no alpha channel.
    let rgb = DynamicImage::ImageRgb8(cropped.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| ApiError::Internal(format!("JPEG encoding failed: {e}")))?;
    Ok(out.into_inner())
}
