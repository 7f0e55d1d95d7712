use anyhow::Result;
use async_trait::async_trait;

pub mod telegram;

/// Delivers an alert message somewhere a person will read it.
#[async_trait]
pub trait Notifier {
    async fn send(&self, message: &str) -> Result<()>;
}
