use crate::foundation::math::mul_div255_u8;

/// Premultiplied `[r, g, b, a]`.
pub type PremulRgba8 = [u8; 4];

/// Source-over for premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    match src[3] {
        0 => dst,
        255 => src,
        sa => {
            let inv = 255u16 - u16::from(sa);
            [
                add_sat_u8(src[0], mul_div255_u8(u16::from(dst[0]), inv)),
                add_sat_u8(src[1], mul_div255_u8(u16::from(dst[1]), inv)),
                add_sat_u8(src[2], mul_div255_u8(u16::from(dst[2]), inv)),
                add_sat_u8(sa, mul_div255_u8(u16::from(dst[3]), inv)),
            ]
        }
    }
}

/// Draw `row` (premultiplied RGBA8) over `dst` in place.
pub(crate) fn over_row_in_place(dst: &mut [u8], row: &[u8]) {
    for (d, s) in dst.chunks_exact_mut(4).zip(row.chunks_exact(4)) {
        let out = over([d[0], d[1], d[2], d[3]], [s[0], s[1], s[2], s[3]]);
        d.copy_from_slice(&out);
    }
}

fn add_sat_u8(a: u8, b: u8) -> u8 {
    a.saturating_add(b)
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
