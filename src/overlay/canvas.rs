//! Detection overlay canvas
//!
//! An RGBA surface laid over the camera preview. Boxes are rasterized into the
//! pixel buffer; every drawing call is also kept in a display list so that a
//! front end can re-render labels with its own fonts.

use crate::detection::{BoundingBox, Detection};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Overlay errors
#[derive(Error, Debug)]
pub enum OverlayError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PNG encoding error: {0}")]
    Encoding(#[from] png::EncodingError),

    #[error("Canvas has no pixels")]
    Empty,
}

pub type Rgba = [u8; 4];

/// Emerald green used for face boxes and labels
pub const DETECTION_COLOR: Rgba = [0x10, 0xb9, 0x81, 0xff];

/// Parse `#rrggbb` or `#rrggbbaa`
pub fn parse_hex_color(value: &str) -> Option<Rgba> {
    let hex = value.strip_prefix('#')?;
    if !matches!(hex.len(), 6 | 8) || !hex.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
    let alpha = if hex.len() == 8 { channel(6)? } else { 0xff };
    Some([channel(0)?, channel(2)?, channel(4)?, alpha])
}

/// How detections are drawn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OverlayStyle {
    /// Box and label colour as `#rrggbb`
    pub color: String,
    /// Box stroke width in pixels
    pub line_width: u32,
    /// Label baseline distance above the box
    pub label_offset: f32,
    /// CSS font for front ends rendering the labels
    pub font: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            color: "#10b981".to_string(),
            line_width: 3,
            label_offset: 10.0,
            font: "16px Inter".to_string(),
        }
    }
}

/// One recorded drawing call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum OverlayShape {
    Rect {
        bounding_box: BoundingBox,
        color: Rgba,
        line_width: u32,
    },
    Label {
        text: String,
        x: f32,
        y: f32,
        color: Rgba,
    },
}

pub struct OverlayCanvas {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    shapes: Vec<OverlayShape>,
    style: OverlayStyle,
    color: Rgba,
}

impl OverlayCanvas {
    pub fn new(style: OverlayStyle) -> Self {
        let color = parse_hex_color(&style.color).unwrap_or_else(|| {
            tracing::warn!("Invalid overlay colour {:?}, using default", style.color);
            DETECTION_COLOR
        });
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            shapes: Vec::new(),
            style,
            color,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Resize to `width` x `height`. Contents are discarded.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.pixels = vec![0; (width as usize) * (height as usize) * 4];
        self.shapes.clear();
    }

    /// Erase every pixel and forget the display list. Size is kept.
    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.shapes.clear();
    }

    pub fn is_blank(&self) -> bool {
        self.shapes.is_empty() && self.pixels.iter().all(|&p| p == 0)
    }

    pub fn shapes(&self) -> &[OverlayShape] {
        &self.shapes
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Number of boxes currently drawn
    pub fn box_count(&self) -> usize {
        self.shapes
            .iter()
            .filter(|s| matches!(s, OverlayShape::Rect { .. }))
            .count()
    }

    /// Draw a face box and its confidence label
    pub fn draw_detection(&mut self, detection: &Detection) {
        let bbox = detection.bounding_box;
        self.stroke_rect(bbox);
        self.shapes.push(OverlayShape::Rect {
            bounding_box: bbox,
            color: self.color,
            line_width: self.style.line_width,
        });
        self.shapes.push(OverlayShape::Label {
            text: format!("{}%", detection.confidence_percent()),
            x: bbox.x,
            y: bbox.y - self.style.label_offset,
            color: self.color,
        });
    }

    /// Replace the current contents with `detections`
    pub fn render(&mut self, detections: &[Detection]) {
        self.clear();
        for detection in detections {
            self.draw_detection(detection);
        }
    }

    /// Stroke centred on the box edge, as a 2D canvas would.
    fn stroke_rect(&mut self, bbox: BoundingBox) {
        let lw = self.style.line_width.max(1) as f32;
        let half = lw / 2.0;
        let x0 = (bbox.x - half).floor() as i64;
        let y0 = (bbox.y - half).floor() as i64;
        let x1 = (bbox.x + bbox.width + half).ceil() as i64;
        let y1 = (bbox.y + bbox.height + half).ceil() as i64;
        let lw = lw as i64;

        self.fill_span(x0, x1, y0, y0 + lw);
        self.fill_span(x0, x1, y1 - lw, y1);
        self.fill_span(x0, x0 + lw, y0, y1);
        self.fill_span(x1 - lw, x1, y0, y1);
    }

    fn fill_span(&mut self, x0: i64, x1: i64, y0: i64, y1: i64) {
        let (w, h) = (self.width as i64, self.height as i64);
        let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
        let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));
        for y in y0..y1 {
            let row = (y * w) as usize * 4;
            for x in x0..x1 {
                let i = row + x as usize * 4;
                self.pixels[i..i + 4].copy_from_slice(&self.color);
            }
        }
    }

    /// Encode the current pixels as PNG
    pub fn to_png(&self) -> Result<Vec<u8>, OverlayError> {
        if self.width == 0 || self.height == 0 {
            return Err(OverlayError::Empty);
        }

        let mut buf = Vec::new();
        {
            let mut encoder = png::Encoder::new(&mut buf, self.width, self.height);
            encoder.set_color(png::ColorType::Rgba);
            encoder.set_depth(png::BitDepth::Eight);
            let mut writer = encoder.write_header()?;
            writer.write_image_data(&self.pixels)?;
            writer.finish()?;
        }
        Ok(buf)
    }

    /// Write a PNG snapshot to `path`
    pub fn save_png(&self, path: &Path) -> Result<(), OverlayError> {
        let data = self.to_png()?;
        std::fs::write(path, data)?;
        tracing::debug!("Saved overlay snapshot to {:?}", path);
        Ok(())
    }
}

impl Default for OverlayCanvas {
    fn default() -> Self {
        Self::new(OverlayStyle::default())
    }
}
