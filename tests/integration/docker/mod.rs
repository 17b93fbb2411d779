//! Docker integration tests
//!
//! Flattens real images with the local Docker daemon. Needs network access to
//! pull the test images, so it only builds with `--features docker`.

#[cfg(all(test, feature = "docker"))]
mod tests {
    use crate::integration::common::*;
    use flatten_image::{
        CliEngine, ContainerEngine, EngineKind, FlattenError, FlattenRequest, Flattener, Notifier,
    };
    use std::process::Command;

    fn pull(image: &str) {
        let status = Command::new("docker")
            .args(["pull", "--quiet", image])
            .status()
            .expect("docker should be installed");
        assert!(status.success(), "failed to pull {image}");
    }

    fn remove_image(image: &str) {
        let _ = Command::new("docker")
            .args(["image", "rm", "--force", image])
            .status();
    }

    #[test]
    fn test_flatten_alpine() {
        pull("alpine:latest");
        let flattener = Flattener::new(CliEngine::new(EngineKind::Docker), Notifier::quiet());
        let request = FlattenRequest::new("alpine:latest").with_tag("flatten-image-test:alpine");

        let outcome = flattener.flatten(&request).expect("flatten should succeed");

        let flattened = flattener
            .engine()
            .inspect_image("flatten-image-test:alpine")
            .expect("flattened image should exist");
        assert_eq!(flattened.id, outcome.image_id);
        assert_eq!(flattened.layer_count(), 1);
        assert_eq!(flattened.config.cmd, Some(vec!["/bin/sh".to_string()]));

        remove_image("flatten-image-test:alpine");
    }

    #[test]
    fn test_flatten_nonexistent_image() {
        let flattener = Flattener::new(CliEngine::new(EngineKind::Docker), Notifier::quiet());

        let err = flattener
            .flatten(&FlattenRequest::new(NONEXISTENT_IMAGE))
            .unwrap_err();

        assert!(matches!(err, FlattenError::ImageNotFound { .. }), "{err}");
    }
}
