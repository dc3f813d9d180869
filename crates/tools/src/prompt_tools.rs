//! Prompting tools: ask the run's model to act as an expert or emit JSON.

use async_trait::async_trait;
use gamekit_core::action::{
    Action, ActionCall, ActionHandler, Dependencies, ParamType, ParameterSchema,
};
use gamekit_core::error::ToolError;
use gamekit_core::model::LanguageModel;
use gamekit_core::prompt::Prompt;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Attempts made by [`prompt_for_json`] before giving up.
pub const JSON_ATTEMPTS: usize = 3;

/// Ask `model` to answer `prompt` in the persona described.
pub async fn prompt_expert(
    model: &dyn LanguageModel,
    description_of_expert: &str,
    prompt: &str,
) -> Result<String, ToolError> {
    let request = Prompt::system_and_user(
        format!("Act as the following expert and respond accordingly: {description_of_expert}"),
        prompt,
    );
    Ok(model.generate(&request).await?)
}

/// The body of the first ```` ```json ```` block, or the whole text trimmed.
pub fn extract_json_block(text: &str) -> &str {
    const FENCE: &str = "```json";
    match text.find(FENCE) {
        Some(idx) => {
            let start = idx + FENCE.len();
            match text.rfind("```") {
                Some(end) if end > start => text[start..end].trim(),
                _ => text[start..].trim(),
            }
        }
        None => text.trim(),
    }
}

/// Have the model produce JSON matching `schema`.
///
/// Unparseable output is retried up to [`JSON_ATTEMPTS`] times; model call
/// failures are returned immediately.
pub async fn prompt_for_json(
    model: &dyn LanguageModel,
    schema: &Value,
    prompt: &str,
) -> Result<Value, ToolError> {
    let schema_text = serde_json::to_string_pretty(schema)
        .map_err(|e| ToolError::InvalidArguments(format!("schema is not serializable: {e}")))?;
    let request = Prompt::system_and_user(
        format!(
            "You MUST produce output that adheres to the following JSON schema:\n\n\
             {schema_text}\n\nOutput your JSON in a ```json markdown block."
        ),
        prompt,
    );

    let mut last_error = String::new();
    for attempt in 1..=JSON_ATTEMPTS {
        let response = model.generate(&request).await?;
        match serde_json::from_str::<Value>(extract_json_block(&response)) {
            Ok(value) => return Ok(value),
            Err(e) => {
                warn!(attempt, error = %e, "Model output was not valid JSON");
                last_error = e.to_string();
            }
        }
    }

    Err(ToolError::ExecutionFailed {
        tool_name: "prompt_llm_for_json".into(),
        reason: format!("no valid JSON after {JSON_ATTEMPTS} attempts: {last_error}"),
    })
}

// ── prompt_expert ───────────────────────────────────────────────────────

pub struct PromptExpertTool;

impl PromptExpertTool {
    pub fn action() -> Action {
        Action::new(
            "prompt_expert",
            "Ask an expert, described in your own words, to answer a prompt.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("description_of_expert", ParamType::String, "Who the expert is")
                .required("prompt", ParamType::String, "What to ask the expert"),
        )
        .with_tags(["expert", "consultation", "general"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for PromptExpertTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("prompt_expert")?;
        let description = call.str_arg("description_of_expert")?;
        let prompt = call.str_arg("prompt")?;

        let answer = prompt_expert(context.model().as_ref(), description, prompt).await?;
        Ok(Value::String(answer))
    }
}

// ── consult_senior_developer ────────────────────────────────────────────

pub struct ConsultSeniorDeveloperTool;

impl ConsultSeniorDeveloperTool {
    pub fn action() -> Action {
        Action::new(
            "consult_senior_developer",
            "Get implementation guidance from a senior developer in the target language.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required(
                    "technical_requirements",
                    ParamType::String,
                    "What needs to be implemented",
                )
                .optional(
                    "language",
                    ParamType::String,
                    "Programming language (defaults to the run's target language)",
                ),
        )
        .with_tags(["expert", "coding", "general"])
        .with_dependencies(Dependencies::context().with_property("target_language"))
    }

    fn persona(language: &str) -> String {
        format!(
            "You are a senior software developer with 10+ years of experience in {language} development.\n\
             You are expert in:\n\
             - Writing clean, maintainable, and efficient code.\n\
             - Software architecture and design patterns.\n\
             - Best practices for testing, debugging and deployment.\n\
             - Performance optimization and scalability considerations.\n\
             - Code reviews and mentoring junior developers."
        )
    }
}

#[async_trait]
impl ActionHandler for ConsultSeniorDeveloperTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("consult_senior_developer")?;
        let requirements = call.str_arg("technical_requirements")?;
        let language = call
            .opt_str("language")
            .or_else(|| call.injected("target_language").and_then(Value::as_str))
            .unwrap_or("python");

        debug!(language, "Consulting senior developer");
        let answer = prompt_expert(
            context.model().as_ref(),
            &Self::persona(language),
            &format!("Provide technical implementation guidance for: {requirements}"),
        )
        .await?;
        Ok(Value::String(answer))
    }
}

// ── consult_code_reviewer ───────────────────────────────────────────────

pub struct ConsultCodeReviewerTool;

impl ConsultCodeReviewerTool {
    const PERSONA: &'static str =
        "You are a senior code reviewer and technical lead with expertise in:\n\
        - Code quality assessment and best practices enforcement\n\
        - Security vulnerability identification\n\
        - Performance optimization recommendations\n\
        - Maintainability and readability improvements\n\
        - Testing strategies and coverage analysis";

    pub fn action() -> Action {
        Action::new(
            "consult_code_reviewer",
            "Get a detailed review of a piece of code.",
            Arc::new(Self),
        )
        .with_parameters(ParameterSchema::new().required(
            "code",
            ParamType::String,
            "The code to review",
        ))
        .with_tags(["expert", "review", "code_review", "general"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for ConsultCodeReviewerTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("consult_code_reviewer")?;
        let code = call.str_arg("code")?;

        let answer = prompt_expert(
            context.model().as_ref(),
            Self::PERSONA,
            &format!("Please review this code and provide detailed feedback:\n\n{code}"),
        )
        .await?;
        Ok(Value::String(answer))
    }
}

// ── prompt_llm_for_json ─────────────────────────────────────────────────

pub struct PromptLlmForJsonTool;

impl PromptLlmForJsonTool {
    pub fn action() -> Action {
        Action::new(
            "prompt_llm_for_json",
            "Have the model generate JSON that follows a JSON schema.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("schema", ParamType::Object, "JSON schema the output must follow")
                .required("prompt", ParamType::String, "What to generate"),
        )
        .with_tags(["json", "llm"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for PromptLlmForJsonTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("prompt_llm_for_json")?;
        let prompt = call.str_arg("prompt")?;
        let schema = match call.args.get("schema") {
            Some(Value::String(text)) => serde_json::from_str(text)
                .map_err(|e| ToolError::InvalidArguments(format!("'schema' is not JSON: {e}")))?,
            Some(value @ Value::Object(_)) => value.clone(),
            _ => return Err(ToolError::InvalidArguments("Missing 'schema' argument".into())),
        };

        prompt_for_json(context.model().as_ref(), &schema, prompt).await
    }
}

/// Every prompting tool.
pub fn prompt_actions() -> Vec<Action> {
    vec![
        PromptExpertTool::action(),
        ConsultSeniorDeveloperTool::action(),
        ConsultCodeReviewerTool::action(),
        PromptLlmForJsonTool::action(),
    ]
}
