//! Model backends for GameKit.
//!
//! Every backend implements `gamekit_core::LanguageModel`.

pub mod openai_compat;

pub use openai_compat::OpenAiCompatModel;
