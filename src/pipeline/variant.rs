//! Variant rendering: one decoded page → one lossy WebP buffer per spec.
//!
//! ## Sizing rules
//!
//! * The effective width is `min(spec.width, natural width)`: a variant is
//!   never upscaled past the rasterised page.
//! * With `spec.height` the page is cover-fitted: scaled until it fills
//!   `width × height`, then the overflow is cropped (centre). Thumbnails use
//!   this to get a fixed aspect ratio whatever the page shape. When the width
//!   is capped the height shrinks by the same factor.
//! * Without `spec.height` the page is scaled proportionally to the
//!   effective width.
//!
//! ## Why the `webp` crate?
//!
//! `image`'s built-in WebP encoder is lossless only. Page scans at three
//! resolutions need a quality knob, which means libwebp's lossy encoder.

use crate::config::VariantSpec;
use crate::error::ConversionError;
use crate::pipeline::rasterize::RasterPage;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use std::borrow::Cow;
use tracing::debug;

/// MIME type of every page asset.
pub const WEBP_CONTENT_TYPE: &str = "image/webp";

/// One encoded variant of a page.
#[derive(Debug, Clone)]
pub struct RenderedVariant {
    pub key: String,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// All variants of one page plus the page's natural size.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_number: usize,
    pub width: u32,
    pub height: u32,
    pub variants: Vec<RenderedVariant>,
}

/// Output size for `spec` given the page's natural size.
pub fn target_dimensions(natural_width: u32, natural_height: u32, spec: &VariantSpec) -> (u32, u32) {
    let width = spec.width.min(natural_width).max(1);
    match spec.height {
        // A capped width shrinks the box by the same factor so the crop
        // keeps the requested aspect ratio.
        Some(height) => {
            let spec_width = u64::from(spec.width.max(1));
            let scaled = (u64::from(height) * u64::from(width) + spec_width / 2) / spec_width;
            (width, scaled.clamp(1, u64::from(u32::MAX)) as u32)
        }
        None => {
            let scaled = (u64::from(natural_height) * u64::from(width)
                + u64::from(natural_width) / 2)
                / u64::from(natural_width.max(1));
            (width, scaled.clamp(1, u64::from(u32::MAX)) as u32)
        }
    }
}

/// Resize `image` for `spec` and encode it as lossy WebP.
pub fn render_variant(
    image: &DynamicImage,
    spec: &VariantSpec,
) -> Result<RenderedVariant, String> {
    let (natural_width, natural_height) = image.dimensions();
    let (width, height) = target_dimensions(natural_width, natural_height, spec);

    let resized: Cow<'_, DynamicImage> = match spec.height {
        Some(_) => Cow::Owned(image.resize_to_fill(width, height, FilterType::Lanczos3)),
        None if width == natural_width => Cow::Borrowed(image),
        None => Cow::Owned(image.resize_exact(width, height, FilterType::Lanczos3)),
    };

    let bytes = encode_webp(&resized, spec.quality)?;
    debug!(
        "Variant '{}': {}x{} → {}x{}, q{}, {} bytes",
        spec.key,
        natural_width,
        natural_height,
        width,
        height,
        spec.quality,
        bytes.len()
    );

    Ok(RenderedVariant {
        key: spec.key.clone(),
        width,
        height,
        bytes,
    })
}

/// Lossy WebP at `quality` (clamped to 0–100).
///
/// libwebp only takes 8-bit RGB/RGBA, so other layouts (grey, 16-bit) are
/// converted first.
pub fn encode_webp(image: &DynamicImage, quality: u8) -> Result<Vec<u8>, String> {
    let converted;
    let source = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let encoder = webp::Encoder::from_image(source).map_err(|e| e.to_string())?;
    let memory = encoder
        .encode_simple(false, f32::from(quality.min(100)))
        .map_err(|e| format!("libwebp: {e:?}"))?;
    Ok(memory.to_vec())
}

/// Decode a rasterised page once and render every spec from it.
///
/// CPU-bound; call from `spawn_blocking`.
pub fn render_page(
    page: &RasterPage,
    specs: &[VariantSpec],
) -> Result<RenderedPage, ConversionError> {
    let image = image::open(&page.path).map_err(|e| ConversionError::Render {
        page: page.page_number,
        variant: "source".to_string(),
        detail: format!("decoding {}: {e}", page.path.display()),
    })?;
    let (width, height) = image.dimensions();

    let variants = specs
        .iter()
        .map(|spec| {
            render_variant(&image, spec).map_err(|detail| ConversionError::Render {
                page: page.page_number,
                variant: spec.key.clone(),
                detail,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(RenderedPage {
        page_number: page.page_number,
        width,
        height,
        variants,
    })
}
