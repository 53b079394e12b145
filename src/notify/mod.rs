use anyhow::Result;
use async_trait::async_trait;

pub mod discord;
pub use discord::DiscordNotifier;

/// Receives the outcome of each updated group.
///
/// Callers sanitize every string before handing it over.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_update(
        &self,
        group: &str,
        image: &str,
        old_digest: &str,
        new_digest: &str,
    ) -> Result<()>;

    async fn send_error(&self, group: &str, message: &str) -> Result<()>;
}

/// Used when no notification target is configured.
pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn send_update(&self, _: &str, _: &str, _: &str, _: &str) -> Result<()> {
        Ok(())
    }

    async fn send_error(&self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }
}
