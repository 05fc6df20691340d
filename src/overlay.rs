//! Detection overlay drawn onto a frame copy for display.
//!
//! Every rectangle is clipped to the image before it is walked, so boxes that
//! extend past the edges (however far) are cut off rather than pinned to the
//! border. Annotated frames are handed to a `FrameSink`.

use image::{Rgb, RgbImage};

use crate::detect::Detection;
use crate::frame::Frame;

const CORNER_LENGTH: i32 = 15;
const LABEL_CHAR_WIDTH: i32 = 8;
const LABEL_HEIGHT: i32 = 16;
const CENTER_RADIUS: i32 = 4;
const STATUS_WIDTH: i32 = 400;
const STATUS_HEIGHT: i32 = 80;
const STATUS_MARGIN: i32 = 10;
const HEARTBEAT_CELLS: i32 = 10;
const HEARTBEAT_CELL_WIDTH: i32 = 12;
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
const GRAY: Rgb<u8> = Rgb([90, 90, 90]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);

/// Draw every detection: outline, corner markers, label tab, center dot.
pub fn draw_detections(image: &mut RgbImage, detections: &[Detection]) {
    for det in detections {
        let bbox = det.bbox();
        let color = Rgb(det.color().rgb());
        let thickness = det.thickness() as i32;

        stroke_rect(image, bbox.x1, bbox.y1, bbox.x2, bbox.y2, thickness, color);
        draw_corners(image, bbox.x1, bbox.y1, bbox.x2, bbox.y2, thickness + 1, color);

        // Label tab sits just above the box, outlined in white.
        let label_chars = i32::try_from(det.label().chars().count()).unwrap_or(i32::MAX);
        let tab_width = label_chars.saturating_mul(LABEL_CHAR_WIDTH).saturating_add(10);
        let tab_right = bbox.x1.saturating_add(tab_width);
        let tab_top = bbox.y1.saturating_sub(LABEL_HEIGHT + 15);
        let tab_bottom = bbox.y1.saturating_sub(5);
        fill_rect(image, bbox.x1, tab_top, tab_right, tab_bottom, color);
        stroke_rect(image, bbox.x1, tab_top, tab_right, tab_bottom, 1, WHITE);

        let (cx, cy) = det.center();
        fill_circle(image, cx, cy, CENTER_RADIUS, color);
    }
}

/// Consumer of annotated frames (a window, an encoder, a log).
pub trait FrameSink {
    fn show(&mut self, sequence: u64, image: &RgbImage, detections: &[Detection]);
}

/// Sink that reports what would be displayed. Logs at `info` whenever the
/// drawn label set changes and at `trace` for every frame.
#[derive(Debug, Default)]
pub struct LogSink {
    shown: u64,
    last_labels: Vec<String>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames handed to the sink so far.
    pub fn shown(&self) -> u64 {
        self.shown
    }

    pub fn last_labels(&self) -> &[String] {
        &self.last_labels
    }
}

impl FrameSink for LogSink {
    fn show(&mut self, sequence: u64, image: &RgbImage, detections: &[Detection]) {
        self.shown += 1;
        let labels: Vec<String> = detections.iter().map(Detection::label).collect();
        if labels != self.last_labels {
            log::info!(
                "frame #{} ({}x{}) overlay: [{}]",
                sequence,
                image.width(),
                image.height(),
                labels.join(", ")
            );
            self.last_labels = labels;
        }
        log::trace!(
            "frame #{} shown ({}x{}, {} detection(s))",
            sequence,
            image.width(),
            image.height(),
            detections.len()
        );
    }
}

/// Draw detections and the status strip onto the frame's pixels.
pub fn annotate(frame: Frame, detections: &[Detection]) -> RgbImage {
    let sequence = frame.sequence;
    let mut image = frame.into_image();
    draw_detections(&mut image, detections);
    draw_status(&mut image, sequence, detections.len());
    image
}

/// Darkened status strip in the top-left corner.
///
/// The top row is a heartbeat whose lit cell advances with `frame_count`, so a
/// frozen stream is visible at a glance. The marker below it turns green when
/// detections are present.
pub fn draw_status(image: &mut RgbImage, frame_count: u64, detection_count: usize) {
    let (left, top) = (STATUS_MARGIN, STATUS_MARGIN);
    let right = left + STATUS_WIDTH - 1;
    let bottom = top + STATUS_HEIGHT - 1;
    for y in top..=bottom {
        for x in left..=right {
            if let Some(pixel) = pixel_mut(image, x, y) {
                for channel in pixel.0.iter_mut() {
                    *channel = (*channel as u16 * 3 / 10) as u8;
                }
            }
        }
    }
    let lit = (frame_count % HEARTBEAT_CELLS as u64) as i32;
    for cell in 0..HEARTBEAT_CELLS {
        let cell_left = left + 10 + cell * HEARTBEAT_CELL_WIDTH;
        let color = if cell == lit { WHITE } else { GRAY };
        fill_rect(image, cell_left, top + 15, cell_left + HEARTBEAT_CELL_WIDTH - 3, top + 25, color);
    }

    let marker = if detection_count > 0 { GREEN } else { WHITE };
    fill_rect(image, left + 10, top + 40, left + 20, top + 50, marker);
}

fn pixel_mut(image: &mut RgbImage, x: i32, y: i32) -> Option<&mut Rgb<u8>> {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return None;
    }
    Some(image.get_pixel_mut(x as u32, y as u32))
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if let Some(pixel) = pixel_mut(image, x, y) {
        *pixel = color;
    }
}

/// Fill the inclusive rectangle, clipped to the image before iterating.
fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let max_x = i32::try_from(image.width()).unwrap_or(i32::MAX) - 1;
    let max_y = i32::try_from(image.height()).unwrap_or(i32::MAX) - 1;
    let (x0, x1) = (left.min(right), left.max(right));
    let (y0, y1) = (top.min(bottom), top.max(bottom));
    if x1 < 0 || y1 < 0 || x0 > max_x || y0 > max_y {
        return;
    }
    for y in y0.max(0)..=y1.min(max_y) {
        for x in x0.max(0)..=x1.min(max_x) {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

/// Outline grown inward by `thickness` pixels.
fn stroke_rect(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let t = thickness.max(1) - 1;
    fill_rect(image, left, top, right, top.saturating_add(t), color);
    fill_rect(image, left, bottom.saturating_sub(t), right, bottom, color);
    fill_rect(image, left, top, left.saturating_add(t), bottom, color);
    fill_rect(image, right.saturating_sub(t), top, right, bottom, color);
}

fn draw_corners(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    let t = thickness.max(1) - 1;
    let len = CORNER_LENGTH;
    let (left_in, right_in) = (left.saturating_add(len), right.saturating_sub(len));
    let (top_in, bottom_in) = (top.saturating_add(len), bottom.saturating_sub(len));
    let (left_t, right_t) = (left.saturating_add(t), right.saturating_sub(t));
    let (top_t, bottom_t) = (top.saturating_add(t), bottom.saturating_sub(t));
    // Horizontal arms.
    fill_rect(image, left, top, left_in, top_t, color);
    fill_rect(image, right_in, top, right, top_t, color);
    fill_rect(image, left, bottom_t, left_in, bottom, color);
    fill_rect(image, right_in, bottom_t, right, bottom, color);
    // Vertical arms.
    fill_rect(image, left, top, left_t, top_in, color);
    fill_rect(image, right_t, top, right, top_in, color);
    fill_rect(image, left, bottom_in, left_t, bottom, color);
    fill_rect(image, right_t, bottom_in, right, bottom, color);
}

fn fill_circle(image: &mut RgbImage, cx: i32, cy: i32, radius: i32, color: Rgb<u8>) {
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= radius * radius {
                put(image, cx.saturating_add(dx), cy.saturating_add(dy), color);
            }
        }
    }
}
