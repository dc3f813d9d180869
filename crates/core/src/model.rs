//! The model-call boundary.
//!
//! The framework treats the language model as an opaque function from a
//! [`Prompt`] to text. Backends that use native tool calling must re-encode
//! the chosen call as `{"tool_name": ..., "args": {...}}` JSON text before
//! returning.

use async_trait::async_trait;
use crate::error::ProviderError;
use crate::prompt::Prompt;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// A human-readable name for this backend (e.g., "openai", "scripted").
    fn name(&self) -> &str;

    /// Generate a text response for the prompt.
    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError>;
}
