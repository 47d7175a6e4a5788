//! QR decode capability.
//!
//! The controller treats decoding as a black box: a frame or an encoded image
//! goes in, text or "no match" comes out. [`RqrrDecoder`] is the stock
//! implementation.

use crate::errors::DecodeError;
use crate::types::{Frame, ScanRegion};
use async_trait::async_trait;
use bytes::Bytes;

#[async_trait]
pub trait DecodeCapability: Send + Sync {
    /// Decode one live RGB8 frame. Called from capture threads.
    fn decode_frame(&self, frame: &Frame) -> Result<Option<String>, DecodeError>;

    /// Decode an encoded image (PNG, JPEG, ...) once.
    async fn decode_image(&self, buffer: Bytes) -> Result<Option<String>, DecodeError>;
}

/// Decoder backed by `rqrr`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RqrrDecoder;

impl RqrrDecoder {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DecodeCapability for RqrrDecoder {
    fn decode_frame(&self, frame: &Frame) -> Result<Option<String>, DecodeError> {
        let width = frame.width as usize;
        let height = frame.height as usize;
        if frame.data.len() != width * height * 3 {
            return Err(DecodeError::FrameSize {
                width: frame.width,
                height: frame.height,
            });
        }

        let data = &frame.data;
        Ok(decode_greyscale(width, height, |x, y| {
            let i = (y * width + x) * 3;
            luma(data[i], data[i + 1], data[i + 2])
        }))
    }

    async fn decode_image(&self, buffer: Bytes) -> Result<Option<String>, DecodeError> {
        tokio::task::spawn_blocking(move || {
            let image = image::load_from_memory(&buffer)
                .map_err(|e| DecodeError::InvalidImage(e.to_string()))?;
            let grey = image.to_luma8();
            let (width, height) = grey.dimensions();
            Ok(decode_greyscale(width as usize, height as usize, |x, y| {
                grey.get_pixel(x as u32, y as u32).0[0]
            }))
        })
        .await
        .map_err(|e| DecodeError::Task(e.to_string()))?
    }
}

fn decode_greyscale<F>(width: usize, height: usize, fill: F) -> Option<String>
where
    F: FnMut(usize, usize) -> u8,
{
    if width == 0 || height == 0 {
        return None;
    }

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, fill);
    for grid in prepared.detect_grids() {
        match grid.decode() {
            Ok((_meta, content)) => return Some(content),
            Err(e) => log::trace!("QR grid found but not decodable: {:?}", e),
        }
    }
    None
}

// ITU-R BT.601 weights, integer form.
fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114) / 1000) as u8
}

/// Cut the centred scan region out of a frame. Regions larger than the frame
/// are clamped to it.
pub fn crop_center(frame: &Frame, region: ScanRegion) -> Frame {
    let width = region.width.min(frame.width);
    let height = region.height.min(frame.height);
    if width == frame.width && height == frame.height {
        return frame.clone();
    }

    let left = ((frame.width - width) / 2) as usize;
    let top = ((frame.height - height) / 2) as usize;
    let stride = frame.width as usize * 3;
    let row_len = width as usize * 3;

    let mut data = Vec::with_capacity(row_len * height as usize);
    for row in top..top + height as usize {
        let start = row * stride + left * 3;
        match frame.data.get(start..start + row_len) {
            Some(slice) => data.extend_from_slice(slice),
            None => break,
        }
    }

    Frame {
        width,
        height,
        data,
        device_id: frame.device_id.clone(),
    }
}

/// Cut the widest centred window with the requested width/height ratio.
/// Non-positive or non-finite ratios leave the frame as is.
pub fn crop_aspect(frame: &Frame, aspect_ratio: f32) -> Frame {
    if !aspect_ratio.is_finite() || aspect_ratio <= 0.0 || frame.height == 0 {
        return frame.clone();
    }

    let ratio = f64::from(aspect_ratio);
    let current = f64::from(frame.width) / f64::from(frame.height);
    let region = if current > ratio {
        ScanRegion {
            width: (f64::from(frame.height) * ratio).round().max(1.0) as u32,
            height: frame.height,
        }
    } else {
        ScanRegion {
            width: frame.width,
            height: (f64::from(frame.width) / ratio).round().max(1.0) as u32,
        }
    };
    crop_center(frame, region)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_frame(width: u32, height: u32) -> Frame {
        Frame {
            width,
            height,
            data: vec![255u8; (width * height * 3) as usize],
            device_id: "test".to_string(),
        }
    }

    #[test]
    fn test_blank_frame_has_no_match() {
        let decoder = RqrrDecoder::new();
        let result = decoder.decode_frame(&blank_frame(64, 48));
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_truncated_frame_is_rejected() {
        let decoder = RqrrDecoder::new();
        let mut frame = blank_frame(10, 10);
        frame.data.truncate(50);
        assert!(matches!(
            decoder.decode_frame(&frame),
            Err(DecodeError::FrameSize { width: 10, height: 10 })
        ));
    }

    #[tokio::test]
    async fn test_garbage_image_is_invalid() {
        let decoder = RqrrDecoder::new();
        let result = decoder
            .decode_image(Bytes::from_static(b"definitely not an image"))
            .await;
        assert!(matches!(result, Err(DecodeError::InvalidImage(_))));
    }

    #[tokio::test]
    async fn test_blank_png_has_no_match() {
        let image = image::GrayImage::from_pixel(32, 32, image::Luma([255u8]));
        let mut encoded = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut encoded, image::ImageFormat::Png)
            .unwrap();

        let decoder = RqrrDecoder::new();
        let result = decoder.decode_image(Bytes::from(encoded.into_inner())).await;
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_crop_center_takes_middle() {
        let mut frame = blank_frame(4, 4);
        // mark pixel (1,1) and (2,2)
        for (x, y) in [(1usize, 1usize), (2, 2)] {
            let i = (y * 4 + x) * 3;
            frame.data[i] = 0;
        }
        let cropped = crop_center(&frame, ScanRegion { width: 2, height: 2 });
        assert_eq!((cropped.width, cropped.height), (2, 2));
        assert_eq!(cropped.data.len(), 12);
        assert_eq!(cropped.data[0], 0);
        assert_eq!(cropped.data[9], 0);
        assert_eq!(cropped.data[3], 255);
    }

    #[test]
    fn test_crop_larger_than_frame_is_identity() {
        let frame = blank_frame(8, 6);
        let cropped = crop_center(&frame, ScanRegion { width: 260, height: 260 });
        assert_eq!((cropped.width, cropped.height), (8, 6));
        assert_eq!(cropped.data.len(), frame.data.len());
    }

    #[test]
    fn test_crop_aspect_trims_wide_and_tall_frames() {
        let wide = crop_aspect(&blank_frame(640, 480), 1.7778);
        assert_eq!((wide.width, wide.height), (640, 360));
        assert_eq!(wide.data.len(), 640 * 360 * 3);

        let square = crop_aspect(&blank_frame(1280, 720), 1.0);
        assert_eq!((square.width, square.height), (720, 720));
    }

    #[test]
    fn test_crop_aspect_ignores_bad_ratio() {
        let frame = blank_frame(40, 30);
        for ratio in [0.0, -1.0, f32::NAN, f32::INFINITY] {
            let cropped = crop_aspect(&frame, ratio);
            assert_eq!((cropped.width, cropped.height), (40, 30));
        }
    }

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(0, 0, 0), 0);
        assert_eq!(luma(255, 255, 255), 255);
    }
}
