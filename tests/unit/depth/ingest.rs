use super::*;

fn canvas(w: u32, h: u32) -> Canvas {
    Canvas::new(w, h).unwrap()
}

#[test]
fn u8_depth_is_rescaled_to_unit_range() {
    let raw = RawDepth::from_u8(3, 1, vec![10, 20, 30]);
    let map = ingest(&raw, canvas(3, 1), &IngestOpts::default()).unwrap();
    assert_eq!(map.values(), &[0.0, 0.5, 1.0]);
}

#[test]
fn near_is_high_inverts_after_normalization() {
    let raw = RawDepth::from_u16(3, 1, vec![1000, 500, 0]);
    let opts = IngestOpts {
        convention: DepthConvention::NearIsHigh,
        ..IngestOpts::default()
    };
    let map = ingest(&raw, canvas(3, 1), &opts).unwrap();
    assert_eq!(map.values(), &[0.0, 0.5, 1.0]);
}

#[test]
fn constant_map_becomes_uniform_half() {
    let raw = RawDepth::from_f32(2, 2, vec![3.0; 4]);
    let map = ingest(&raw, canvas(4, 4), &IngestOpts::default()).unwrap();
    assert_eq!(map.canvas(), canvas(4, 4));
    assert!(map.values().iter().all(|&v| v == 0.5));
}

#[test]
fn non_finite_samples_take_the_farthest_value() {
    let raw = RawDepth::from_f32(4, 1, vec![0.0, f32::NAN, 2.0, f32::INFINITY]);
    let map = ingest(&raw, canvas(4, 1), &IngestOpts::default()).unwrap();
    assert_eq!(map.values(), &[0.0, 1.0, 1.0, 1.0]);

    let opts = IngestOpts {
        convention: DepthConvention::NearIsHigh,
        ..IngestOpts::default()
    };
    let map = ingest(&raw, canvas(4, 1), &opts).unwrap();
    assert_eq!(map.values(), &[1.0, 1.0, 0.0, 1.0]);
}

#[test]
fn invalid_inputs_are_rejected() {
    let zero = RawDepth::from_u8(0, 1, vec![]);
    assert!(matches!(
        ingest(&zero, canvas(1, 1), &IngestOpts::default()),
        Err(DepthwallError::InvalidDepthMap(_))
    ));

    let short = RawDepth::from_u8(2, 2, vec![1, 2, 3]);
    assert!(matches!(
        ingest(&short, canvas(2, 2), &IngestOpts::default()),
        Err(DepthwallError::InvalidDepthMap(_))
    ));

    let nan = RawDepth::from_f32(2, 1, vec![f32::NAN, f32::NAN]);
    assert!(matches!(
        ingest(&nan, canvas(2, 1), &IngestOpts::default()),
        Err(DepthwallError::InvalidDepthMap(_))
    ));
}

#[test]
fn resize_reaches_target_and_keeps_extremes() {
    let raw = RawDepth::from_u8(2, 1, vec![0, 255]);
    for resample in [Resample::Nearest, Resample::Bilinear] {
        let opts = IngestOpts {
            resample,
            ..IngestOpts::default()
        };
        let map = ingest(&raw, canvas(8, 3), &opts).unwrap();
        assert_eq!(map.values().len(), 24);
        let min = map.values().iter().copied().fold(f32::MAX, f32::min);
        let max = map.values().iter().copied().fold(f32::MIN, f32::max);
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
        // Row is monotonic left to right.
        let row = &map.values()[0..8];
        assert!(row.windows(2).all(|w| w[0] <= w[1]));
    }
}

#[test]
fn from_image_keeps_bit_depth() {
    let img = image::DynamicImage::ImageLuma16(
        image::ImageBuffer::from_raw(2, 1, vec![0u16, 40_000]).unwrap(),
    );
    let raw = RawDepth::from_image(&img);
    assert_eq!(raw.samples, RawDepthSamples::U16(vec![0, 40_000]));

    let img = image::DynamicImage::ImageLuma8(
        image::ImageBuffer::from_raw(2, 1, vec![7u8, 9]).unwrap(),
    );
    assert_eq!(RawDepth::from_image(&img).samples, RawDepthSamples::U8(vec![7, 9]));
}

#[test]
fn depth_map_new_clamps_and_fingerprints() {
    let a = DepthMap::new(2, 1, vec![-1.0, 2.0]).unwrap();
    assert_eq!(a.values(), &[0.0, 1.0]);
    let b = DepthMap::new(2, 1, vec![0.0, 1.0]).unwrap();
    assert_eq!(a.fingerprint(), b.fingerprint());
    let c = DepthMap::new(2, 1, vec![0.0, 0.5]).unwrap();
    assert_ne!(a.fingerprint(), c.fingerprint());
    assert!(DepthMap::new(2, 1, vec![0.0]).is_err());
}
