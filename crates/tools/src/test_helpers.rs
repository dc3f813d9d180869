//! Shared test helpers for tool tests.

use async_trait::async_trait;
use gamekit_core::context::ActionContext;
use gamekit_core::error::ProviderError;
use gamekit_core::memory::Memory;
use gamekit_core::model::LanguageModel;
use gamekit_core::prompt::Prompt;
use std::sync::{Arc, Mutex};

/// A model that replays scripted responses and records every prompt.
///
/// With `repeat_last`, the final response is returned forever; otherwise
/// running past the script panics.
pub struct ScriptedModel {
    responses: Vec<String>,
    repeat_last: bool,
    prompts: Mutex<Vec<Prompt>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.into_iter().map(String::from).collect(),
            repeat_last: false,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn always(response: &str) -> Arc<Self> {
        Arc::new(Self {
            responses: vec![response.to_string()],
            repeat_last: true,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<Prompt> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String, ProviderError> {
        let mut prompts = self.prompts.lock().unwrap();
        let index = prompts.len();
        prompts.push(prompt.clone());

        match self.responses.get(index) {
            Some(text) => Ok(text.clone()),
            None if self.repeat_last => Ok(self.responses.last().cloned().unwrap_or_default()),
            None => panic!(
                "ScriptedModel: no more responses (call #{index}, have {})",
                self.responses.len()
            ),
        }
    }
}

/// A top-level context over `model` and `memory`.
pub fn context_with(model: Arc<dyn LanguageModel>, memory: Memory) -> ActionContext {
    ActionContext::builder(model, memory).build()
}
