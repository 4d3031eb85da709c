use super::*;
use crate::assets::decode::SourceImage;
use crate::depth::ingest::DepthMap;
use crate::layers::decompose::{DecomposeOpts, decompose};

fn ramp(w: u32, h: u32, n: usize) -> (SourceImage, LayerStack) {
    let mut rgba = Vec::with_capacity((w * h * 4) as usize);
    let mut depth = Vec::with_capacity((w * h) as usize);
    for y in 0..h {
        for x in 0..w {
            rgba.extend_from_slice(&[(x * 7 % 256) as u8, (y * 5 % 256) as u8, 40, 255]);
            depth.push(x as f32 / (w - 1) as f32);
        }
    }
    let img = SourceImage::from_rgba8(w, h, rgba).unwrap();
    let depth = DepthMap::new(w, h, depth).unwrap();
    let stack = decompose(&img, &depth, n, &DecomposeOpts::default()).unwrap();
    (img, stack)
}

fn rest(n: usize) -> Vec<LayerOffset> {
    (0..n)
        .map(|rank| LayerOffset {
            rank,
            dx: 0.0,
            dy: 0.0,
            scale: 1.0,
        })
        .collect()
}

fn px(frame: &RenderFrame, x: u32, y: u32) -> [u8; 4] {
    let i = ((y * frame.width + x) * 4) as usize;
    [frame.data[i], frame.data[i + 1], frame.data[i + 2], frame.data[i + 3]]
}

fn solid_overlay(origin: (i32, i32), size: u32, color: [u8; 4]) -> Overlay {
    Overlay {
        width: size,
        height: size,
        origin,
        rgba8_premul: color.repeat((size * size) as usize),
    }
}

#[test]
fn rest_offsets_reproduce_source() {
    let (img, stack) = ramp(40, 20, 3);
    let frame = composite(&stack, &rest(3), None, img.canvas()).unwrap();
    assert_eq!(frame.data, img.rgba8());
    assert!(frame.is_opaque());
}

#[test]
fn translation_samples_shifted_source_with_edge_clamp() {
    let (img, stack) = ramp(40, 20, 1);
    let mut offsets = rest(1);
    offsets[0].dx = 3.0;
    let frame = composite(&stack, &offsets, None, img.canvas()).unwrap();
    assert_eq!(px(&frame, 10, 4), img.pixel(7, 4));
    assert_eq!(px(&frame, 1, 4), img.pixel(0, 4));
    assert!(frame.is_opaque());
}

#[test]
fn cover_fit_fills_wider_canvas() {
    let (img, stack) = ramp(10, 10, 1);
    let canvas = Canvas::new(20, 10).unwrap();
    let frame = composite(&stack, &rest(1), None, canvas).unwrap();
    assert_eq!((frame.width, frame.height), (20, 10));
    assert_eq!(px(&frame, 0, 0), img.pixel(0, 2));
    assert_eq!(px(&frame, 19, 9), img.pixel(9, 7));
}

#[test]
fn large_offsets_never_leave_transparent_pixels() {
    let (img, stack) = ramp(30, 30, 4);
    let offsets: Vec<LayerOffset> = (0..4)
        .map(|rank| LayerOffset {
            rank,
            dx: 12.0 - rank as f64 * 5.0,
            dy: -7.5,
            scale: 1.0 + rank as f64 * 0.01,
        })
        .collect();
    let frame = composite(&stack, &offsets, None, img.canvas()).unwrap();
    assert!(frame.is_opaque());
}

#[test]
fn top_overlay_covers_layers() {
    let (img, stack) = ramp(100, 100, 2);
    let ov = solid_overlay((5, 5), 10, [200, 0, 0, 255]);
    let draw = OverlayDraw {
        overlay: &ov,
        offset: rest(1)[0],
        placement: OverlayPlacement::Top,
        depth: 0.9,
    };
    let frame = composite(&stack, &rest(2), Some(draw), img.canvas()).unwrap();
    assert_eq!(px(&frame, 7, 7), [200, 0, 0, 255]);
    assert_eq!(px(&frame, 20, 20), img.pixel(20, 20));
    assert_eq!(frame.overlay_offset, Some(rest(1)[0]));
}

#[test]
fn in_depth_overlay_is_hidden_by_nearer_layer() {
    let (img, stack) = ramp(100, 100, 2);
    // Left half is the near layer; the overlay sits in the far band.
    let ov = solid_overlay((5, 5), 10, [200, 0, 0, 255]);
    let behind = OverlayDraw {
        overlay: &ov,
        offset: rest(1)[0],
        placement: OverlayPlacement::InDepth,
        depth: 0.9,
    };
    let frame = composite(&stack, &rest(2), Some(behind), img.canvas()).unwrap();
    assert_eq!(px(&frame, 7, 7), img.pixel(7, 7));

    let front = OverlayDraw { depth: 0.1, ..behind };
    let frame = composite(&stack, &rest(2), Some(front), img.canvas()).unwrap();
    assert_eq!(px(&frame, 7, 7), [200, 0, 0, 255]);
}

#[test]
fn overlay_offset_is_rounded_and_clipped() {
    let (img, stack) = ramp(20, 20, 1);
    let ov = solid_overlay((15, 15), 10, [0, 0, 255, 255]);
    let draw = OverlayDraw {
        overlay: &ov,
        offset: LayerOffset {
            rank: 0,
            dx: -2.6,
            dy: 0.4,
            scale: 1.0,
        },
        placement: OverlayPlacement::Top,
        depth: 0.5,
    };
    let frame = composite(&stack, &rest(1), Some(draw), img.canvas()).unwrap();
    assert_eq!(px(&frame, 12, 15), [0, 0, 255, 255]);
    assert_eq!(px(&frame, 11, 15), img.pixel(11, 15));
    assert_eq!(px(&frame, 19, 19), [0, 0, 255, 255]);
}

#[test]
fn mismatched_offsets_are_rejected() {
    let (img, stack) = ramp(10, 10, 2);
    assert!(composite(&stack, &rest(1), None, img.canvas()).is_err());
    let mut swapped = rest(2);
    swapped.swap(0, 1);
    assert!(composite(&stack, &swapped, None, img.canvas()).is_err());
    let mut bad_scale = rest(2);
    bad_scale[1].scale = 0.0;
    assert!(composite(&stack, &bad_scale, None, img.canvas()).is_err());
}
