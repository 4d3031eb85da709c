use super::*;
use crate::depth::ingest::DepthMap;
use crate::layers::decompose::{DecomposeOpts, decompose};

fn image_with_distinct_pixels(w: u32, h: u32) -> SourceImage {
    let mut rgba = Vec::with_capacity((w * h * 4) as usize);
    for i in 0..(w * h) {
        rgba.extend_from_slice(&[(i * 7 % 256) as u8, (i * 13 % 256) as u8, i as u8, 255]);
    }
    SourceImage::from_rgba8(w, h, rgba).unwrap()
}

fn opts(extension: ExtensionStrategy, bias: ShiftBias, margin_px: u32) -> DecomposeOpts {
    DecomposeOpts {
        extension,
        shift_bias: bias,
        margin_px,
        ..DecomposeOpts::default()
    }
}

#[test]
fn row_tie_follows_shift_bias() {
    let img = image_with_distinct_pixels(5, 1);
    let depth = DepthMap::new(5, 1, vec![0.9, 0.9, 0.1, 0.9, 0.9]).unwrap();

    let left = decompose(&img, &depth, 2, &opts(ExtensionStrategy::RowExtrapolate, ShiftBias::Left, 8))
        .unwrap();
    assert_eq!(left.layers()[1].pixel(2, 0), img.pixel(1, 0));

    let right = decompose(&img, &depth, 2, &opts(ExtensionStrategy::RowExtrapolate, ShiftBias::Right, 8))
        .unwrap();
    assert_eq!(right.layers()[1].pixel(2, 0), img.pixel(3, 0));
}

#[test]
fn farther_owned_pixels_stay_transparent() {
    let img = image_with_distinct_pixels(6, 1);
    let depth = DepthMap::new(6, 1, vec![0.1, 0.5, 0.5, 0.9, 0.5, 0.1]).unwrap();
    for strategy in [ExtensionStrategy::RowExtrapolate, ExtensionStrategy::Dilate] {
        let stack = decompose(&img, &depth, 3, &opts(strategy, ShiftBias::Left, 8)).unwrap();
        let mid = &stack.layers()[1];
        assert_eq!(mid.pixel(0, 0), img.pixel(1, 0));
        assert_eq!(mid.pixel(5, 0), img.pixel(4, 0));
        assert_eq!(mid.pixel(3, 0)[3], 0, "{strategy:?}");

        let near = &stack.layers()[0];
        for x in 1..5 {
            assert_eq!(near.pixel(x, 0)[3], 0);
        }
    }
}

#[test]
fn margin_bounds_fill_distance() {
    let w = 40u32;
    let img = image_with_distinct_pixels(w, 1);
    let depth = DepthMap::new(
        w,
        1,
        (0..w).map(|x| if x < 35 { 0.1 } else { 0.5 }).collect(),
    )
    .unwrap();
    for strategy in [ExtensionStrategy::RowExtrapolate, ExtensionStrategy::Dilate] {
        let stack = decompose(&img, &depth, 3, &opts(strategy, ShiftBias::Left, 3)).unwrap();
        let mid = &stack.layers()[1];
        for x in 32..35 {
            assert_eq!(mid.pixel(x, 0), img.pixel(35, 0), "{strategy:?} x={x}");
        }
        assert_eq!(mid.pixel(31, 0)[3], 0, "{strategy:?}");
    }
}

#[test]
fn rows_without_band_pixels_fall_back_to_column() {
    let img = image_with_distinct_pixels(3, 3);
    let depth = DepthMap::new(
        3,
        3,
        vec![0.1, 0.1, 0.1, 0.5, 0.5, 0.5, 0.1, 0.1, 0.1],
    )
    .unwrap();
    let stack = decompose(
        &img,
        &depth,
        3,
        &opts(ExtensionStrategy::RowExtrapolate, ShiftBias::Left, 4),
    )
    .unwrap();
    let mid = &stack.layers()[1];
    for x in 0..3 {
        assert_eq!(mid.pixel(x, 0), img.pixel(x, 1));
        assert_eq!(mid.pixel(x, 2), img.pixel(x, 1));
    }
}

#[test]
fn zero_margin_leaves_holes_transparent() {
    let img = image_with_distinct_pixels(4, 1);
    let depth = DepthMap::new(4, 1, vec![0.1, 0.5, 0.1, 0.9]).unwrap();
    let stack = decompose(
        &img,
        &depth,
        3,
        &opts(ExtensionStrategy::RowExtrapolate, ShiftBias::Left, 0),
    )
    .unwrap();
    let mid = &stack.layers()[1];
    assert_eq!(mid.pixel(0, 0)[3], 0);
    assert_eq!(mid.pixel(2, 0)[3], 0);
    assert_eq!(mid.pixel(1, 0), img.pixel(1, 0));
}

#[test]
fn cancelled_extension_stops() {
    let img = image_with_distinct_pixels(4, 4);
    let depth = DepthMap::new(4, 4, vec![0.2; 16]).unwrap();
    let stack = decompose(&img, &depth, 1, &DecomposeOpts::default()).unwrap();
    let layer = stack.layers()[0].clone();
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(
        RowExtrapolate::default()
            .extend(layer, Some(4), &cancel)
            .unwrap_err()
            .is_cancelled()
    );
}
