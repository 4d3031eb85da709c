use super::*;

#[test]
fn canvas_rejects_zero_dimensions() {
    assert!(Canvas::new(0, 10).is_err());
    assert!(Canvas::new(10, 0).is_err());
    let c = Canvas::new(4, 3).unwrap();
    assert_eq!(c.pixel_count(), 12);
    assert_eq!(c.rgba_len().unwrap(), 48);
    assert_eq!(c.center(), Point::new(2.0, 1.5));
}

#[test]
fn cancel_token_is_shared_between_clones() {
    let a = CancelToken::new();
    let b = a.clone();
    assert!(a.check().is_ok());
    b.cancel();
    assert!(a.is_cancelled());
    assert!(matches!(a.check(), Err(DepthwallError::Cancelled)));
}

#[test]
fn cover_scale_fills_both_axes() {
    let source = Canvas::new(10, 10).unwrap();
    assert_eq!(source.cover_scale(Canvas::new(20, 10).unwrap()), 2.0);
    assert_eq!(Canvas::new(240, 240).unwrap().cover_scale(Canvas::new(60, 60).unwrap()), 0.25);
}
