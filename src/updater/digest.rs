//! Content digests of local images.

use crate::runtime::{ContainerRuntime, Result, RuntimeError};

/// Returns the content digest of `image` as the daemon knows it locally.
///
/// A tag can carry several registry digests; the first one is used.  Images that
/// were built locally or never pulled have none, so their image id stands in.
pub async fn image_digest(runtime: &dyn ContainerRuntime, image: &str) -> Result<String> {
    let inspect = runtime.inspect_image(image).await?;
    if let Some(digest) = inspect
        .repo_digests
        .as_ref()
        .and_then(|d| d.first())
        .filter(|d| !d.is_empty())
    {
        return Ok(digest.clone());
    }
    inspect
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| RuntimeError::Api(format!("image {} has neither digest nor id", image)))
}

/// Plain inequality: an empty old digest differs from any real new one.
pub fn has_changed(old: &str, new: &str) -> bool {
    old != new
}

/// Shortens a digest for display, e.g. `sha256:abc123def4567...`.
pub fn truncate_digest(digest: &str) -> String {
    const MAX: usize = 19;
    match digest.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &digest[..idx]),
        None => digest.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::fake::FakeRuntime;
    use crate::types::DigestPair;
    use pretty_assertions::assert_eq;

    #[test]
    fn changed_is_inequality() {
        let cases = [
            ("sha256:abc123", "sha256:abc123", false),
            ("sha256:abc123", "sha256:def456", true),
            ("", "sha256:abc123", true),
            ("sha256:abc123", "", true),
            ("", "", false),
        ];
        for (old, new, want) in cases {
            assert_eq!(has_changed(old, new), want, "{:?} -> {:?}", old, new);
            let pair = DigestPair {
                old: old.to_string(),
                new: new.to_string(),
            };
            assert_eq!(pair.changed(), want);
        }
    }

    #[tokio::test]
    async fn prefers_registry_digest() {
        let rt = FakeRuntime::new();
        rt.set_image("nginx:latest", "sha256:aaa", "sha256:bbb");
        let digest = image_digest(&rt, "nginx:latest").await.unwrap();
        assert_eq!(digest, "repo@sha256:aaa");
    }

    #[tokio::test]
    async fn local_build_falls_back_to_image_id() {
        let rt = FakeRuntime::new();
        rt.set_local_image("myapp:dev", "sha256:localbuild");
        let digest = image_digest(&rt, "myapp:dev").await.unwrap();
        assert_eq!(digest, "sha256:localbuild");
    }

    #[tokio::test]
    async fn missing_image_is_an_error() {
        let rt = FakeRuntime::new();
        let err = image_digest(&rt, "ghost:latest").await.unwrap_err();
        assert!(matches!(err, RuntimeError::NotFound(_)));
    }

    #[test]
    fn truncates_long_digests() {
        assert_eq!(
            truncate_digest("sha256:0123456789abcdef0123"),
            "sha256:0123456789ab..."
        );
        assert_eq!(truncate_digest("sha256:abc"), "sha256:abc");
    }
}
