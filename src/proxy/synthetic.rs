// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/emberlink

//! Synthetic test-pattern pictures

use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use crate::error::Result;

const BARS: [[u8; 3]; 7] = [
    [191, 191, 191],
    [191, 191, 0],
    [0, 191, 191],
    [0, 191, 0],
    [191, 0, 191],
    [191, 0, 0],
    [0, 0, 191],
];

const BAND: Rgb<u8> = Rgb([32, 32, 32]);
const BLOCK: Rgb<u8> = Rgb([255, 128, 0]);
const TEXT: Rgb<u8> = Rgb([235, 235, 235]);
const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
const BLINK: Rgb<u8> = Rgb([220, 20, 20]);

const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;

/// 5x7 bitmap, one row per byte, bit 4 is the leftmost column
fn glyph(c: char) -> [u8; 7] {
    match c.to_ascii_uppercase() {
        'A' => [0x0E, 0x11, 0x11, 0x1F, 0x11, 0x11, 0x11],
        'B' => [0x1E, 0x11, 0x11, 0x1E, 0x11, 0x11, 0x1E],
        'C' => [0x0E, 0x11, 0x10, 0x10, 0x10, 0x11, 0x0E],
        'D' => [0x1E, 0x11, 0x11, 0x11, 0x11, 0x11, 0x1E],
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
        ' ' => [0x00; 7],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        '/' => [0x00, 0x01, 0x02, 0x04, 0x08, 0x10, 0x00],
        '(' => [0x02, 0x04, 0x08, 0x08, 0x08, 0x04, 0x02],
        ')' => [0x08, 0x04, 0x02, 0x02, 0x02, 0x04, 0x08],
        '!' => [0x04, 0x04, 0x04, 0x04, 0x04, 0x00, 0x04],
        '#' => [0x0A, 0x0A, 0x1F, 0x0A, 0x1F, 0x0A, 0x0A],
        '_' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x1F],
        _ => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x00, 0x04],
    }
}

fn fill_rect(img: &mut RgbImage, x: u32, y: u32, w: u32, h: u32, color: Rgb<u8>) {
    let x_end = x.saturating_add(w).min(img.width());
    let y_end = y.saturating_add(h).min(img.height());
    for py in y.min(y_end)..y_end {
        for px in x.min(x_end)..x_end {
            img.put_pixel(px, py, color);
        }
    }
}

fn draw_text(img: &mut RgbImage, x: u32, y: u32, scale: u32, text: &str, color: Rgb<u8>) {
    let advance = (GLYPH_W + 1) * scale;
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * advance;
        if gx >= img.width() {
            break;
        }
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) != 0 {
                    fill_rect(img, gx + col * scale, y + row as u32 * scale, scale, scale, color);
                }
            }
        }
    }
}

/// Test pattern shown when no real camera picture is available
#[derive(Debug, Clone)]
pub struct SyntheticPattern {
    pub width: u32,
    pub height: u32,
    pub quality: u8,
    pub caption: String,
}

impl SyntheticPattern {
    pub fn new(width: u32, height: u32, quality: u8, caption: impl Into<String>) -> Self {
        Self {
            width: width.max(64),
            height: height.max(48),
            quality: quality.clamp(1, 100),
            caption: caption.into(),
        }
    }

    /// Draw frame `frame` of the pattern as raw pixels
    pub fn draw(&self, frame: u64, status: &str) -> RgbImage {
        let (w, h) = (self.width, self.height);
        let mut img = RgbImage::from_pixel(w, h, BLACK);

        let bars_h = h * 3 / 5;
        let bar_w = w / BARS.len() as u32;
        for (i, color) in BARS.iter().enumerate() {
            let x = i as u32 * bar_w;
            let bw = if i == BARS.len() - 1 { w - x } else { bar_w };
            fill_rect(&mut img, x, 0, bw, bars_h, Rgb(*color));
        }

        // moving block proves the picture is live
        let band_y = bars_h;
        let band_h = h / 10;
        fill_rect(&mut img, 0, band_y, w, band_h, BAND);
        let block = band_h.max(4);
        let travel = w.saturating_sub(block).max(1) as u64;
        let block_x = ((frame * 8) % travel) as u32;
        fill_rect(&mut img, block_x, band_y, block, band_h, BLOCK);

        let scale = (w / 320).min(h / 240).max(1);
        let line_h = (GLYPH_H + 3) * scale;
        let text_y = band_y + band_h + scale * 4;
        draw_text(&mut img, scale * 6, text_y, scale * 2, &self.caption, TEXT);
        draw_text(&mut img, scale * 6, text_y + line_h * 2, scale, status, TEXT);
        draw_text(
            &mut img,
            scale * 6,
            text_y + line_h * 3,
            scale,
            &format!("FRAME {:06}", frame),
            TEXT,
        );

        if (frame / 8) % 2 == 0 {
            // Corner square, kept inside odd aspect ratios
            let size = (6 * scale).min(w.min(h) / 6).max(1);
            fill_rect(
                &mut img,
                w.saturating_sub(size * 3),
                h.saturating_sub(size * 3),
                size * 2,
                size * 2,
                BLINK,
            );
        }

        img
    }

    /// Render frame `frame` as a JPEG picture
    pub fn render(&self, frame: u64, status: &str) -> Result<Vec<u8>> {
        let img = self.draw(frame, status);
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, self.quality).encode_image(&img)?;
        Ok(out)
    }
}
