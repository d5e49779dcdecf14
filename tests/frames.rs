use deskdup_capture::config::capture::BYTES_PER_PIXEL;
use deskdup_capture::{CaptureOutcome, CapturedFrame, PixelFormat};

fn padded_frame(width: u32, height: u32, padding: u32) -> CapturedFrame {
    let stride = width * BYTES_PER_PIXEL + padding;
    let mapped: Vec<u8> = (0..stride * height).map(|i| (i % 251) as u8).collect();
    CapturedFrame::from_mapped(width, height, stride, &mapped).unwrap()
}

#[test]
fn full_hd_frame_buffer_matches_stride() {
    let frame = padded_frame(1920, 1080, 0);

    assert_eq!(frame.stride, 7680);
    assert_eq!(frame.pixels.len(), 1080 * 7680);
    assert_eq!(frame.format, PixelFormat::Bgra8);
    assert_eq!(frame.format.to_string(), "BGRA");
    assert!(!frame.is_padded());
}

#[test]
fn rows_are_addressed_by_stride() {
    let frame = padded_frame(3, 4, 20);
    let stride = frame.stride as usize;

    assert!(frame.is_padded());
    assert_eq!(frame.packed_len(), 3 * 4 * 4);
    for y in 0..4u32 {
        let start = y as usize * stride;
        assert_eq!(frame.row(y).unwrap(), &frame.pixels[start..start + 12]);
    }
    assert!(frame.row(4).is_none());
}

#[test]
fn packed_copy_drops_only_padding() {
    let frame = padded_frame(5, 3, 12);
    let packed = frame.to_packed();

    assert_eq!(packed.len(), frame.packed_len());
    assert_eq!(&packed[20..40], frame.row(1).unwrap());
}

#[test]
fn unpadded_frame_packs_to_itself() {
    let frame = padded_frame(4, 2, 0);
    assert_eq!(frame.to_packed(), frame.pixels);
}

#[test]
fn mapping_shorter_than_rows_is_rejected() {
    let mapped = vec![0u8; 7680 * 1079];
    assert!(CapturedFrame::from_mapped(1920, 1080, 7680, &mapped).is_none());
}

#[test]
fn outcome_helpers() {
    assert!(CaptureOutcome::Frame(padded_frame(1, 1, 0)).is_frame());
    assert!(!CaptureOutcome::NoNewFrame.is_frame());
    assert!(CaptureOutcome::NoNewFrame.into_frame().is_none());
}
