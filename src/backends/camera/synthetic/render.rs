// SPDX-License-Identifier: GPL-3.0-only

//! Placeholder frame rendering
//!
//! Frames carry a border, a timestamp line, a frame counter, a center
//! crosshair and a fake exposure caption. Text uses a built-in 5x7 bitmap
//! font covering:
//!
//! - digits `0`-`9`
//! - letters `A`-`Z` (lowercase renders as uppercase)
//! - `:` `-` `/` `.` `|` and space
//!
//! Anything else draws as a question mark.

use image::{Rgb, RgbImage};

const BACKGROUND: Rgb<u8> = Rgb([50, 50, 50]);
const FOREGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const CROSSHAIR: Rgb<u8> = Rgb([255, 0, 0]);
const CAPTION: Rgb<u8> = Rgb([255, 255, 0]);

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Render one synthetic frame
pub fn render_frame(
    width: u32,
    height: u32,
    counter: u64,
    timestamp: &str,
    caption: &str,
) -> RgbImage {
    let mut image = RgbImage::from_pixel(width, height, BACKGROUND);

    // Layout scales with a 640x480 reference frame
    let margin = (width.min(height) / 10).max(2);
    let stroke = (width / 320).max(1);
    let scale = (width / 320).max(1);
    let line_height = (GLYPH_HEIGHT + 3) * scale;

    draw_rect_outline(
        &mut image,
        (margin, margin),
        (width.saturating_sub(margin), height.saturating_sub(margin)),
        stroke,
        FOREGROUND,
    );

    let text_x = margin + 10 * scale;
    let text_y = margin + 10 * scale;
    let header = format!("SYNTHETIC CAMERA - {}", timestamp);
    draw_text(&mut image, text_x, text_y, scale, FOREGROUND, &header);
    let counter_y = text_y + line_height + 5 * scale;
    let counter_line = format!("FRAME: {}", counter);
    draw_text(&mut image, text_x, counter_y, scale, FOREGROUND, &counter_line);

    let arm = 20 * scale;
    let (cx, cy) = (width / 2, height / 2);
    let (x0, y0) = (cx.saturating_sub(arm), cy.saturating_sub(stroke));
    fill_rect(&mut image, x0, y0, cx + arm, cy + stroke, CROSSHAIR);
    let (x0, y0) = (cx.saturating_sub(stroke), cy.saturating_sub(arm));
    fill_rect(&mut image, x0, y0, cx + stroke, cy + arm, CROSSHAIR);

    let caption_y = height.saturating_sub(margin + 10 * scale + GLYPH_HEIGHT * scale);
    draw_text(&mut image, text_x, caption_y, scale, CAPTION, caption);

    image
}

/// Fill `[x0, x1) x [y0, y1)`, clipped to the image
fn fill_rect(image: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    let x1 = x1.min(image.width());
    let y1 = y1.min(image.height());
    for y in y0..y1 {
        for x in x0..x1 {
            image.put_pixel(x, y, color);
        }
    }
}

/// Outline the rectangle between two corners
fn draw_rect_outline(
    image: &mut RgbImage,
    (x0, y0): (u32, u32),
    (x1, y1): (u32, u32),
    stroke: u32,
    color: Rgb<u8>,
) {
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    fill_rect(image, x0, y0, x1, y0 + stroke, color);
    fill_rect(image, x0, y1.saturating_sub(stroke), x1, y1, color);
    fill_rect(image, x0, y0, x0 + stroke, y1, color);
    fill_rect(image, x1.saturating_sub(stroke), y0, x1, y1, color);
}

/// Draw `text` with its top-left corner at (x, y)
pub fn draw_text(image: &mut RgbImage, x: u32, y: u32, scale: u32, color: Rgb<u8>, text: &str) {
    let advance = (GLYPH_WIDTH + 1) * scale;
    for (i, ch) in text.chars().enumerate() {
        let origin_x = x + i as u32 * advance;
        if origin_x >= image.width() {
            break;
        }
        for (row, bits) in glyph(ch).iter().enumerate() {
            for col in 0..GLYPH_WIDTH {
                if bits & (1 << (GLYPH_WIDTH - 1 - col)) == 0 {
                    continue;
                }
                let px = origin_x + col * scale;
                let py = y + row as u32 * scale;
                fill_rect(image, px, py, px + scale, py + scale, color);
            }
        }
    }
}

/// Row bitmaps, most significant of the low five bits is the leftmost column
fn glyph(ch: char) -> [u8; 7] {
    match ch.to_ascii_uppercase() {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1C, 0x12, 0x11, 0x11, 0x11, 0x12, 0x1C],
        'E' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x1F],
        'F' => [0x1F, 0x10, 0x10, 0x1E, 0x10, 0x10, 0x10],
        'G' => [0x0E, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0F],
        'H' => [0x11, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'I' => [0x0E, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0E],
        'J' => [0x07, 0x02, 0x02, 0x02, 0x02, 0x12, 0x0C],
        'K' => [0x11, 0x12, 0x14, 0x18, 0x14, 0x12, 0x11],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1F],
        'M' => [0x11, 0x1B, 0x15, 0x15, 0x11, 0x11, 0x11],
        'N' => [0x11, 0x11, 0x19, 0x15, 0x13, 0x11, 0x11],
        'O' => [0x0E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'P' => [0x1E, 0x11, 0x11, 0x1E, 0x10, 0x10, 0x10],
        'Q' => [0x0E, 0x11, 0x11, 0x11, 0x15, 0x12, 0x0D],
        'R' => [0x1E, 0x11, 0x11, 0x1E, 0x14, 0x12, 0x11],
        'S' => [0x0F, 0x10, 0x10, 0x0E, 0x01, 0x01, 0x1E],
        'T' => [0x1F, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        'U' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0E],
        'V' => [0x11, 0x11, 0x11, 0x11, 0x11, 0x0A, 0x04],
        'W' => [0x11, 0x11, 0x11, 0x15, 0x15, 0x15, 0x0A],
        'X' => [0x11, 0x11, 0x0A, 0x04, 0x0A, 0x11, 0x11],
        'Y' => [0x11, 0x11, 0x11, 0x0A, 0x04, 0x04, 0x04],
        'Z' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x10, 0x1F],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '/' => [0x01, 0x01, 0x02, 0x04, 0x08, 0x10, 0x10],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '|' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x04, 0x04],
        ' ' => [0x00; 7],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}
