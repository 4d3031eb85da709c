use super::*;

#[test]
fn fingerprint_is_stable_and_domain_separated() {
    let mut a = Fingerprint::new("depth");
    a.write_u32(3);
    a.write_bytes(b"abc");
    let mut b = Fingerprint::new("depth");
    b.write_u32(3);
    b.write_bytes(b"abc");
    assert_eq!(a.finish(), b.finish());

    let mut c = Fingerprint::new("image");
    c.write_u32(3);
    c.write_bytes(b"abc");
    let mut d = Fingerprint::new("depth");
    d.write_u32(3);
    d.write_bytes(b"abc");
    assert_ne!(c.finish(), d.finish());
}

#[test]
fn mul_div255_variants_align() {
    for x in [0u16, 1, 127, 255] {
        for y in [0u16, 1, 127, 255] {
            assert_eq!(u16::from(mul_div255_u8(x, y)), mul_div255_u16(x, y));
        }
    }
}

#[test]
fn clamp01_maps_nan_to_zero() {
    assert_eq!(clamp01(f32::NAN), 0.0);
    assert_eq!(clamp01(-1.0), 0.0);
    assert_eq!(clamp01(2.0), 1.0);
    assert_eq!(clamp01(0.25), 0.25);
}
