use super::*;

#[test]
fn display_prefixes_are_stable() {
    assert!(
        DepthwallError::invalid_depth("x")
            .to_string()
            .contains("invalid depth map:")
    );
    assert!(
        DepthwallError::decomposition("x")
            .to_string()
            .contains("decomposition failed:")
    );
    assert!(
        DepthwallError::apply("x")
            .to_string()
            .contains("wallpaper apply failed:")
    );
    assert!(
        DepthwallError::validation("x")
            .to_string()
            .contains("validation error:")
    );
    assert!(
        DepthwallError::serde("x")
            .to_string()
            .contains("serialization error:")
    );
}

#[test]
fn other_preserves_source() {
    let base = std::io::Error::other("boom");
    let err = DepthwallError::Other(anyhow::Error::new(base));
    assert!(err.to_string().contains("boom"));
}

#[test]
fn provider_errors_fold_into_decomposition_failed() {
    let err = DepthwallError::depth_estimation("model offline").into_decomposition_failure();
    assert!(matches!(err, DepthwallError::DecompositionFailed(_)));
    assert!(err.to_string().contains("model offline"));

    let err = DepthwallError::segmentation("no mask").into_decomposition_failure();
    assert!(matches!(err, DepthwallError::DecompositionFailed(_)));
}

#[test]
fn cancellation_and_timeout_keep_identity() {
    assert!(
        DepthwallError::Cancelled
            .into_decomposition_failure()
            .is_cancelled()
    );
    let t = DepthwallError::RenderTimeout(Duration::from_millis(5)).into_decomposition_failure();
    assert!(matches!(t, DepthwallError::RenderTimeout(_)));
}
