//! PNG encoding and multi-window stitching.

use idelens_common::error::{IdelensError, IdelensResult};
use idelens_platform_core::{PixelBuffer, Rect};
use image::codecs::png::PngEncoder;
use image::imageops::{self, FilterType};
use image::{ExtendedColorType, ImageEncoder, RgbaImage};

/// Output dimensions for `width x height` at `scale`, never below 1x1.
pub fn scaled_dimensions(width: u32, height: u32, scale: f32) -> (u32, u32) {
    if scale >= 1.0 {
        return (width, height);
    }
    let w = ((width as f32) * scale).round().max(1.0) as u32;
    let h = ((height as f32) * scale).round().max(1.0) as u32;
    (w, h)
}

fn to_image(pixels: &PixelBuffer) -> IdelensResult<RgbaImage> {
    if pixels.is_empty() {
        return Err(IdelensError::capture("cannot encode an empty pixel buffer"));
    }
    let len = pixels.width as usize * pixels.height as usize * 4;
    RgbaImage::from_raw(pixels.width, pixels.height, pixels.rgba[..len].to_vec()).ok_or_else(
        || {
            IdelensError::capture(format!(
                "pixel buffer does not match {}x{}",
                pixels.width, pixels.height
            ))
        },
    )
}

/// Encode `pixels` as PNG into `out`, downscaled by `scale` when below 1.0.
///
/// `out` is cleared first. Returns the encoded dimensions.
pub fn encode_png(pixels: &PixelBuffer, scale: f32, out: &mut Vec<u8>) -> IdelensResult<(u32, u32)> {
    let mut img = to_image(pixels)?;
    let (width, height) = scaled_dimensions(pixels.width, pixels.height, scale);
    if (width, height) != (pixels.width, pixels.height) {
        img = imageops::resize(&img, width, height, FilterType::Triangle);
    }
    out.clear();
    PngEncoder::new(&mut *out)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgba8)
        .map_err(|e| IdelensError::capture(format!("PNG encoding failed: {e}")))?;
    Ok((width, height))
}

/// Draw every part onto one canvas covering `bounds`.
///
/// Parts are given in screen coordinates. Larger parts are drawn first so
/// that panes hosted inside a frame stay visible on top of it.
pub fn stitch(parts: &[(Rect, &PixelBuffer)], bounds: Rect) -> IdelensResult<PixelBuffer> {
    if bounds.is_empty() {
        return Err(IdelensError::invalid_argument("stitch bounds must not be empty"));
    }
    let mut canvas = RgbaImage::new(bounds.width as u32, bounds.height as u32);
    let mut order: Vec<&(Rect, &PixelBuffer)> = parts.iter().collect();
    order.sort_by_key(|(rect, _)| std::cmp::Reverse(rect.area()));
    for (rect, pixels) in order {
        let part = to_image(pixels)?;
        let at = rect.relative_to(bounds.x, bounds.y);
        imageops::overlay(&mut canvas, &part, at.x as i64, at.y as i64);
    }
    Ok(PixelBuffer {
        width: canvas.width(),
        height: canvas.height(),
        rgba: canvas.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid(width: u32, height: u32, px: [u8; 4]) -> PixelBuffer {
        PixelBuffer {
            width,
            height,
            rgba: px.repeat((width * height) as usize),
        }
    }

    fn pixel_at(buffer: &PixelBuffer, x: u32, y: u32) -> [u8; 4] {
        let i = ((y * buffer.width + x) * 4) as usize;
        [
            buffer.rgba[i],
            buffer.rgba[i + 1],
            buffer.rgba[i + 2],
            buffer.rgba[i + 3],
        ]
    }

    #[test]
    fn encodes_a_decodable_png() {
        let mut out = Vec::new();
        let dims = encode_png(&solid(8, 4, [10, 20, 30, 255]), 1.0, &mut out).unwrap();
        assert_eq!(dims, (8, 4));
        assert_eq!(&out[..4], b"\x89PNG");

        let decoded = image::load_from_memory(&out).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (8, 4));
        assert_eq!(decoded.get_pixel(3, 2).0, [10, 20, 30, 255]);
    }

    #[test]
    fn downscales_by_half() {
        let mut out = Vec::new();
        let dims = encode_png(&solid(101, 40, [0, 0, 0, 255]), 0.5, &mut out).unwrap();
        assert_eq!(dims, (51, 20));
        assert_eq!(scaled_dimensions(1, 1, 0.5), (1, 1));
    }

    #[test]
    fn empty_buffer_is_an_error() {
        let mut out = Vec::new();
        assert!(encode_png(&PixelBuffer::empty(), 1.0, &mut out).is_err());
    }

    #[test]
    fn stitch_places_parts_relative_to_bounds() {
        let frame = solid(10, 10, [1, 1, 1, 255]);
        let pane = solid(4, 4, [9, 9, 9, 255]);
        let bounds = Rect::new(100, 100, 12, 10);
        let stitched = stitch(
            &[
                (Rect::new(104, 102, 4, 4), &pane),
                (Rect::new(100, 100, 10, 10), &frame),
            ],
            bounds,
        )
        .unwrap();

        assert_eq!((stitched.width, stitched.height), (12, 10));
        assert_eq!(pixel_at(&stitched, 0, 0), [1, 1, 1, 255]);
        assert_eq!(pixel_at(&stitched, 5, 3), [9, 9, 9, 255]);
        // Outside every part the canvas stays transparent.
        assert_eq!(pixel_at(&stitched, 11, 0), [0, 0, 0, 0]);
    }
}
