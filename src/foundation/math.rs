use xxhash_rust::xxh3::Xxh3;

/// Streaming content hash used for cache identities.
pub(crate) struct Fingerprint(Xxh3);

impl Fingerprint {
    pub(crate) fn new(domain: &str) -> Self {
        let mut h = Xxh3::new();
        h.update(domain.as_bytes());
        Self(h)
    }

    pub(crate) fn write_u32(&mut self, v: u32) {
        self.0.update(&v.to_le_bytes());
    }

    pub(crate) fn write_bytes(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    pub(crate) fn write_f32s(&mut self, values: &[f32]) {
        for v in values {
            self.0.update(&v.to_bits().to_le_bytes());
        }
    }

    pub(crate) fn finish(self) -> u64 {
        self.0.digest()
    }
}

pub(crate) fn mul_div255_u16(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}

pub(crate) fn mul_div255_u8(x: u16, y: u16) -> u8 {
    mul_div255_u16(x, y) as u8
}

pub(crate) fn clamp01(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/math.rs"]
mod tests;
