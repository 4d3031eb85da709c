use super::*;

#[test]
fn parses_hex_object_and_array_forms() {
    let c: Rgba8 = serde_json::from_str("\"#FF000080\"").unwrap();
    assert_eq!(c, Rgba8::new(255, 0, 0, 128));

    let c: Rgba8 = serde_json::from_str("\"00ff00\"").unwrap();
    assert_eq!(c, Rgba8::new(0, 255, 0, 255));

    let c: Rgba8 = serde_json::from_str(r#"{"r":1,"g":2,"b":3}"#).unwrap();
    assert_eq!(c, Rgba8::new(1, 2, 3, 255));

    let c: Rgba8 = serde_json::from_str("[0,0,0,120]").unwrap();
    assert_eq!(c, Rgba8::new(0, 0, 0, 120));
}

#[test]
fn rejects_malformed_colors() {
    assert!(serde_json::from_str::<Rgba8>("\"#fff\"").is_err());
    assert!(serde_json::from_str::<Rgba8>("\"#gg0000\"").is_err());
    assert!(serde_json::from_str::<Rgba8>("[1,2]").is_err());
}

#[test]
fn serializes_as_hex_and_premultiplies() {
    let c = Rgba8::new(255, 255, 255, 200);
    assert_eq!(serde_json::to_string(&c).unwrap(), "\"#ffffffc8\"");
    assert_eq!(c.to_premul(), [200, 200, 200, 200]);
}
