use async_trait::async_trait;

use crate::error::AgentError;

/// A chat model: one system instruction plus one user prompt in, text out.
/// Mockable for testing.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, system_prompt: &str, user_prompt: &str) -> Result<String, AgentError>;
}
