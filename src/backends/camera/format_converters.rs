// SPDX-License-Identifier: GPL-3.0-only
//! Pixel format conversion for raw frame-grabber buffers

use image::RgbImage;

/// Convert YUYV (YUV 4:2:2) to RGB
///
/// YUYV format: Y0 U0 Y1 V0 - each 4-byte group encodes 2 pixels.
/// Uses BT.601 coefficients. Returns `None` when the buffer is too short
/// for the given dimensions.
pub fn yuyv_to_rgb(data: &[u8], width: u32, height: u32) -> Option<RgbImage> {
    let pixel_count = width as usize * height as usize;
    if width == 0 || height == 0 || data.len() < pixel_count * 2 {
        return None;
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for chunk in data[..pixel_count * 2].chunks_exact(4) {
        let y0 = chunk[0] as f32;
        let u = chunk[1] as f32 - 128.0;
        let y1 = chunk[2] as f32;
        let v = chunk[3] as f32 - 128.0;

        for y in [y0, y1] {
            rgb.push((y + 1.402 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y - 0.344 * u - 0.714 * v).clamp(0.0, 255.0) as u8);
            rgb.push((y + 1.772 * u).clamp(0.0, 255.0) as u8);
        }
    }
    // Odd pixel count leaves one trailing pixel without a chroma pair
    rgb.resize(pixel_count * 3, 0);

    RgbImage::from_raw(width, height, rgb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_neutral_chroma_is_gray() {
        // Y=128, U=V=128 -> mid gray
        let data = [128u8, 128, 128, 128].repeat(2);
        let image = yuyv_to_rgb(&data, 2, 2).unwrap();
        for pixel in image.pixels() {
            assert_eq!(pixel.0, [128, 128, 128]);
        }
    }

    #[test]
    fn test_short_buffer_rejected() {
        assert!(yuyv_to_rgb(&[0u8; 6], 2, 2).is_none());
        assert!(yuyv_to_rgb(&[], 0, 0).is_none());
    }

    #[test]
    fn test_red_from_high_v() {
        let data = [82u8, 90, 82, 240];
        let image = yuyv_to_rgb(&data, 2, 1).unwrap();
        let [r, g, b] = image.get_pixel(0, 0).0;
        assert!(r > 200 && g < 60 && b < 60, "{:?}", (r, g, b));
    }
}
