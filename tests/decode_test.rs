//! rqrr decoding of rendered QR codes, on its own and through a scan session
//!
//! Run with: cargo test --test decode_test

use bytes::Bytes;
use crabscan::decode::{crop_aspect, crop_center};
use crabscan::testing::{MockCamera, RecordingDispatcher};
use crabscan::types::{Frame, ScanRegion};
use crabscan::{DecodeCapability, RqrrDecoder, ScanController, StaticScanOutcome};
use image::{GrayImage, Luma};
use qrcode::{Color, QrCode};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

const ADDRESS: &str = "hello@example.com";
const MODULE_PX: u32 = 6;
const QUIET_MODULES: u32 = 4;

/// Render `text` as a black-on-white QR code with a quiet zone.
fn render(text: &str) -> GrayImage {
    let code = QrCode::new(text.as_bytes()).unwrap();
    let modules = code.width() as u32;
    let colors = code.to_colors();
    let side = (modules + 2 * QUIET_MODULES) * MODULE_PX;

    GrayImage::from_fn(side, side, |x, y| {
        let mx = (x / MODULE_PX) as i64 - QUIET_MODULES as i64;
        let my = (y / MODULE_PX) as i64 - QUIET_MODULES as i64;
        let inside = (0..modules as i64).contains(&mx) && (0..modules as i64).contains(&my);
        if inside && colors[(my as u32 * modules + mx as u32) as usize] == Color::Dark {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    })
}

fn png(image: &GrayImage) -> Bytes {
    let mut encoded = Cursor::new(Vec::new());
    image.write_to(&mut encoded, image::ImageFormat::Png).unwrap();
    Bytes::from(encoded.into_inner())
}

/// White RGB frame with `code` pasted at its centre.
fn frame_with(code: &GrayImage, width: u32, height: u32) -> Frame {
    let mut data = vec![255u8; (width * height * 3) as usize];
    let left = (width - code.width()) / 2;
    let top = (height - code.height()) / 2;
    for (x, y, pixel) in code.enumerate_pixels() {
        let i = (((top + y) * width + left + x) * 3) as usize;
        data[i..i + 3].copy_from_slice(&[pixel.0[0]; 3]);
    }
    Frame {
        width,
        height,
        data,
        device_id: "0".to_string(),
    }
}

#[cfg(test)]
mod rqrr_tests {
    use super::*;

    #[tokio::test]
    async fn test_rendered_png_decodes() {
        let decoded = RqrrDecoder::new().decode_image(png(&render(ADDRESS))).await;
        assert_eq!(decoded, Ok(Some(ADDRESS.to_string())));
    }

    #[test]
    fn test_code_in_scan_region_decodes() {
        let code = render(ADDRESS);
        assert!(code.width() <= 260);
        let frame = frame_with(&code, 640, 480);

        let framed = crop_aspect(&frame, 1.7778);
        let region = crop_center(&framed, ScanRegion { width: 260, height: 260 });
        assert_eq!((region.width, region.height), (260, 260));

        let decoded = RqrrDecoder::new().decode_frame(&region);
        assert_eq!(decoded, Ok(Some(ADDRESS.to_string())));
    }

    #[test]
    fn test_full_frame_decodes_without_crop() {
        let frame = frame_with(&render("STUDENT-42"), 320, 240);
        let decoded = RqrrDecoder::new().decode_frame(&frame);
        assert_eq!(decoded, Ok(Some("STUDENT-42".to_string())));
    }

    #[test]
    fn test_region_missing_the_code_finds_nothing() {
        let frame = frame_with(&render(ADDRESS), 640, 480);
        let region = crop_center(&frame, ScanRegion { width: 40, height: 40 });
        assert_eq!(RqrrDecoder::new().decode_frame(&region), Ok(None));
    }
}

#[cfg(test)]
mod static_scan_tests {
    use super::*;

    #[tokio::test]
    async fn test_uploaded_code_notifies_its_address() {
        let dispatcher = Arc::new(RecordingDispatcher::new());
        let controller = ScanController::builder(
            Arc::new(MockCamera::new()),
            Arc::new(RqrrDecoder::new()),
            dispatcher.clone(),
        )
        .build();

        let outcome = controller.scan_static_image(png(&render(ADDRESS))).await;

        assert_eq!(outcome, StaticScanOutcome::Decoded(ADDRESS.to_string()));
        assert_eq!(controller.last_result().as_deref(), Some(ADDRESS));
        assert!(dispatcher.wait_for(1, Duration::from_secs(2)).await);

        let requests = dispatcher.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].payload, ADDRESS);
        assert_eq!(requests[0].recipient, ADDRESS);
    }
}
