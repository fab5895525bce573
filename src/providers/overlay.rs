use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::{Rgb, RgbImage};

use super::{CollaboratorResult, ImageCompositor};
use crate::CollaboratorError;

/// Marker geometry in its own coordinate space (150 x 100 units)
const MARKER_WIDTH: f32 = 150.0;
const MARKER_HEIGHT: f32 = 100.0;
const MARKER_RADIUS: f32 = 25.0;
const MARKER_OPACITY: f32 = 0.8;
const TRIANGLE: [(f32, f32); 3] = [(55.0, 25.0), (95.0, 50.0), (55.0, 75.0)];

/// Accepted marker scale factors
pub const SCALE_RANGE: std::ops::RangeInclusive<f32> = 0.1..=10.0;

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Draws a video play button in the middle of a cover image
#[derive(Debug, Clone, Copy)]
pub struct PlayButtonCompositor {
    /// Pixels per marker unit
    pub scale: f32,

    /// JPEG quality of the composed image
    pub quality: u8,
}

impl Default for PlayButtonCompositor {
    fn default() -> Self {
        Self {
            scale: 1.0,
            quality: 90,
        }
    }
}

impl PlayButtonCompositor {
    pub fn new(scale: f32, quality: u8) -> Self {
        Self {
            scale: scale.clamp(*SCALE_RANGE.start(), *SCALE_RANGE.end()),
            quality: quality.clamp(1, 100),
        }
    }

    /// Decode, draw the marker and re-encode as JPEG
    pub fn compose(&self, base: &[u8]) -> CollaboratorResult<Vec<u8>> {
        let mut canvas = image::load_from_memory(base)
            .map_err(|e| CollaboratorError::Image(format!("cannot decode cover image: {}", e)))?
            .to_rgb8();

        self.draw_marker(&mut canvas);

        let mut encoded = Vec::new();
        canvas
            .write_with_encoder(JpegEncoder::new_with_quality(&mut encoded, self.quality))
            .map_err(|e| CollaboratorError::Image(format!("cannot encode composed image: {}", e)))?;

        Ok(encoded)
    }

    fn draw_marker(&self, canvas: &mut RgbImage) {
        let width = (MARKER_WIDTH * self.scale).round() as i64;
        let height = (MARKER_HEIGHT * self.scale).round() as i64;
        let origin_x = (canvas.width() as i64 - width) / 2;
        let origin_y = (canvas.height() as i64 - height) / 2;

        // Only visit marker pixels that land on the canvas
        let rows = (-origin_y).max(0)..height.min(canvas.height() as i64 - origin_y);
        let columns = (-origin_x).max(0)..width.min(canvas.width() as i64 - origin_x);

        for py in rows {
            for px in columns.clone() {
                let x = origin_x + px;
                let y = origin_y + py;

                // Sample at the pixel centre, in marker units
                let ux = (px as f32 + 0.5) / self.scale;
                let uy = (py as f32 + 0.5) / self.scale;

                let pixel = canvas.get_pixel_mut(x as u32, y as u32);
                if in_triangle(ux, uy) {
                    *pixel = WHITE;
                } else if in_rounded_rect(ux, uy) {
                    *pixel = blend(*pixel, RED, MARKER_OPACITY);
                }
            }
        }
    }
}

#[async_trait]
impl ImageCompositor for PlayButtonCompositor {
    async fn composite(&self, base: &[u8]) -> CollaboratorResult<Vec<u8>> {
        let compositor = *self;
        let base = base.to_vec();

        tokio::task::spawn_blocking(move || compositor.compose(&base))
            .await
            .map_err(|e| CollaboratorError::Image(format!("compositing task failed: {}", e)))?
    }
}

fn in_rounded_rect(x: f32, y: f32) -> bool {
    if !(0.0..=MARKER_WIDTH).contains(&x) || !(0.0..=MARKER_HEIGHT).contains(&y) {
        return false;
    }
    let cx = x.clamp(MARKER_RADIUS, MARKER_WIDTH - MARKER_RADIUS);
    let cy = y.clamp(MARKER_RADIUS, MARKER_HEIGHT - MARKER_RADIUS);
    (x - cx).powi(2) + (y - cy).powi(2) <= MARKER_RADIUS.powi(2)
}

fn in_triangle(x: f32, y: f32) -> bool {
    let [a, b, c] = TRIANGLE;
    let d1 = edge(x, y, a, b);
    let d2 = edge(x, y, b, c);
    let d3 = edge(x, y, c, a);
    let has_neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let has_pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(has_neg && has_pos)
}

fn edge(x: f32, y: f32, (x1, y1): (f32, f32), (x2, y2): (f32, f32)) -> f32 {
    (x - x2) * (y1 - y2) - (x1 - x2) * (y - y2)
}

fn blend(under: Rgb<u8>, over: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let mix = |u: u8, o: u8| (o as f32 * alpha + u as f32 * (1.0 - alpha)).round() as u8;
    Rgb([
        mix(under[0], over[0]),
        mix(under[1], over[1]),
        mix(under[2], over[2]),
    ])
}
