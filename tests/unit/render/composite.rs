use super::*;

#[test]
fn over_src_alpha_0_is_noop() {
    let dst = [10, 20, 30, 40];
    let src = [0, 0, 0, 0];
    assert_eq!(over(dst, src), dst);
}

#[test]
fn over_src_opaque_replaces_dst() {
    let dst = [0, 0, 0, 255];
    let src = [255, 0, 0, 255];
    assert_eq!(over(dst, src), src);
}

#[test]
fn over_dst_transparent_returns_src() {
    let dst = [0, 0, 0, 0];
    let src = [100, 110, 120, 200];
    assert_eq!(over(dst, src), src);
}

#[test]
fn over_half_alpha_on_opaque_stays_opaque() {
    let out = over([200, 200, 200, 255], [64, 0, 0, 128]);
    assert_eq!(out[3], 255);
    assert_eq!(out[0], 64 + mul_div255_u8(200, 127));
}

#[test]
fn row_blend_applies_per_pixel() {
    let mut dst = vec![0u8, 0, 0, 255, 0, 0, 0, 255];
    over_row_in_place(&mut dst, &[9, 9, 9, 255, 0, 0, 0, 0]);
    assert_eq!(dst, vec![9, 9, 9, 255, 0, 0, 0, 255]);
}
