use super::*;

#[test]
fn garbage_font_bytes_are_rejected() {
    assert!(TextLayoutEngine::new(b"definitely not a font").is_err());
}

#[test]
fn empty_mask_reports_empty() {
    assert!(CoverageMask::empty().is_empty());
}
