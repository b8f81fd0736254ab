//! Page geometry normalization: whitespace cropping and wide-page splitting.
//!
//! All functions here are pure: they take decoded images and return new ones.

use image::{DynamicImage, ImageResult};

use crate::config::{GeometryConfig, ReadingDirection, WidePolicy};
use crate::error::{Error, Result};

/// A pixel rectangle inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Decode an encoded page (JPEG, PNG, WebP).
pub fn decode_page(data: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(data)
}

/// Normalize one page into the images that represent it in reading order.
///
/// Returns one image for an unsplit page and two or three for a wide page,
/// depending on [`WidePolicy`].
pub fn normalize(page: DynamicImage, config: &GeometryConfig) -> Result<Vec<DynamicImage>> {
    check_geometry(&page)?;

    let page = if config.crop {
        crop_whitespace(page, config.whitespace_luma)?
    } else {
        page
    };

    // A 1 px wide page has no two non-empty halves.
    if config.policy == WidePolicy::Preserve
        || page.width() < 2
        || !is_wide(page.width(), page.height(), config.wide_ratio)
    {
        return Ok(vec![page]);
    }

    let (first, second) = split_halves(&page, config.direction);
    Ok(match config.policy {
        WidePolicy::Preserve => vec![page],
        WidePolicy::Split => vec![first, second],
        WidePolicy::PreserveAndSplit => vec![page, first, second],
        WidePolicy::SplitAndPreserve => vec![first, second, page],
    })
}

fn check_geometry(image: &DynamicImage) -> Result<()> {
    if image.width() == 0 || image.height() == 0 {
        return Err(Error::InvalidGeometry {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(())
}

/// Whether a page of this size is wide enough to split.
pub fn is_wide(width: u32, height: u32, ratio: f32) -> bool {
    height > 0 && width as f32 / height as f32 > ratio
}

/// Tightest rectangle containing every pixel darker than `whitespace_luma`.
///
/// A page without any such pixel yields its full extent.
pub fn content_bounds(image: &DynamicImage, whitespace_luma: u8) -> Result<Rect> {
    check_geometry(image)?;
    let gray = image.to_luma8();

    let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
    let (mut max_x, mut max_y) = (0u32, 0u32);
    for (x, y, pixel) in gray.enumerate_pixels() {
        if pixel.0[0] < whitespace_luma {
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    if min_x == u32::MAX {
        return Ok(Rect {
            x: 0,
            y: 0,
            width: gray.width(),
            height: gray.height(),
        });
    }

    Ok(Rect {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Crop away surrounding whitespace. Never grows the image.
pub fn crop_whitespace(image: DynamicImage, whitespace_luma: u8) -> Result<DynamicImage> {
    let bounds = content_bounds(&image, whitespace_luma)?;
    if bounds.width == 0 || bounds.height == 0 {
        return Err(Error::InvalidGeometry {
            width: bounds.width,
            height: bounds.height,
        });
    }
    if bounds.width == image.width() && bounds.height == image.height() {
        return Ok(image);
    }
    Ok(image.crop_imm(bounds.x, bounds.y, bounds.width, bounds.height))
}

/// Split a page into halves, returned in reading order.
///
/// The left half is `width / 2` wide and the right half takes the remainder.
pub fn split_halves(
    image: &DynamicImage,
    direction: ReadingDirection,
) -> (DynamicImage, DynamicImage) {
    let (width, height) = (image.width(), image.height());
    let left_width = width / 2;
    let left = image.crop_imm(0, 0, left_width, height);
    let right = image.crop_imm(left_width, 0, width - left_width, height);

    match direction {
        ReadingDirection::Rtl => (right, left),
        ReadingDirection::Ltr => (left, right),
    }
}
