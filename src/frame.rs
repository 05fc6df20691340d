//! Decoded frames and the latest-frame slot.
//!
//! - `Frame`: one decoded RGB image, tagged with its decode sequence number.
//! - `FrameSlot`: the single most recent frame, shared between the stream
//!   reader (sole writer) and any number of consumers.
//!
//! Consumers always receive an owned copy. The reader keeps decoding into its
//! own buffers while a consumer works on a previously retrieved copy.

use image::RgbImage;
use std::sync::{PoisonError, RwLock};
use std::time::Instant;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A fully decoded frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    /// Monotonic decode counter assigned by the slot (1 for the first frame).
    pub sequence: u64,
    /// When the frame was published.
    pub captured_at: Instant,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            sequence: 0,
            captured_at: Instant::now(),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    /// Consume the frame, keeping only the pixels.
    pub fn into_image(self) -> RgbImage {
        self.image
    }

    /// Seconds since the frame was published.
    pub fn age_secs(&self) -> f64 {
        self.captured_at.elapsed().as_secs_f64()
    }
}

// ----------------------------------------------------------------------------
// FrameSlot
// ----------------------------------------------------------------------------

/// Last-write-wins holder for the most recent frame.
///
/// Writes and reads are short critical sections; a reader never observes a
/// half-written frame. Readers share the lock, so concurrent consumers do not
/// serialize against each other.
#[derive(Debug, Default)]
pub struct FrameSlot {
    inner: RwLock<SlotState>,
}

#[derive(Debug, Default)]
struct SlotState {
    latest: Option<Frame>,
    published: u64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the slot contents. Returns the sequence number assigned.
    pub fn publish(&self, mut frame: Frame) -> u64 {
        let mut state = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        state.published += 1;
        frame.sequence = state.published;
        state.latest = Some(frame);
        state.published
    }

    /// Copy of the most recent frame, or `None` before the first publish.
    pub fn latest(&self) -> Option<Frame> {
        let state = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        state.latest.clone()
    }

    /// Number of frames published so far.
    pub fn published(&self) -> u64 {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .published
    }

    pub fn is_empty(&self) -> bool {
        self.published() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::sync::Arc;
    use std::thread;

    fn solid(shade: u8) -> Frame {
        Frame::new(RgbImage::from_pixel(4, 3, Rgb([shade, shade, shade])))
    }

    #[test]
    fn empty_slot_returns_none() {
        let slot = FrameSlot::new();
        assert!(slot.latest().is_none());
        assert!(slot.is_empty());
    }

    #[test]
    fn latest_returns_last_published_frame() {
        let slot = FrameSlot::new();
        for shade in 1..=5u8 {
            slot.publish(solid(shade));
        }
        let frame = slot.latest().expect("frame");
        assert_eq!(frame.sequence, 5);
        assert_eq!(frame.image().get_pixel(0, 0), &Rgb([5, 5, 5]));
        assert_eq!((frame.width(), frame.height()), (4, 3));
    }

    #[test]
    fn consumers_get_independent_copies() {
        let slot = FrameSlot::new();
        slot.publish(solid(10));
        let mut copy = slot.latest().expect("frame").into_image();
        copy.put_pixel(0, 0, Rgb([200, 0, 0]));
        let again = slot.latest().expect("frame");
        assert_eq!(again.image().get_pixel(0, 0), &Rgb([10, 10, 10]));
    }

    #[test]
    fn concurrent_readers_never_see_older_frames() {
        let slot = Arc::new(FrameSlot::new());
        let writer = {
            let slot = slot.clone();
            thread::spawn(move || {
                for shade in 1..=200u8 {
                    slot.publish(solid(shade));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let slot = slot.clone();
                thread::spawn(move || {
                    let mut last_seen = 0;
                    for _ in 0..500 {
                        if let Some(frame) = slot.latest() {
                            assert!(frame.sequence >= last_seen);
                            assert_eq!(frame.sequence as u8, frame.image().get_pixel(0, 0)[0]);
                            last_seen = frame.sequence;
                        }
                    }
                })
            })
            .collect();
        writer.join().expect("writer");
        for reader in readers {
            reader.join().expect("reader");
        }
        assert_eq!(slot.latest().expect("frame").sequence, 200);
    }
}
