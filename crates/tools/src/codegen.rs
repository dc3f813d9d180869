//! Function-level code generation: analyze a task, generate the function and
//! its BDD scenarios, review the result, and extract a clean function body.
//!
//! Generators honour the `previous_attempt` and `review_feedback` arguments
//! that a reviewing environment adds when it asks for another attempt.

use async_trait::async_trait;
use gamekit_core::action::{
    Action, ActionCall, ActionHandler, Dependencies, ParamType, ParameterSchema,
};
use gamekit_core::error::ToolError;
use gamekit_core::prompt::Prompt;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use crate::prompt_tools::prompt_for_json;

/// Returned by [`extract_function_body`] when no body could be recovered.
pub const EMPTY_BODY: &str = "    pass  # No implementation extracted";

fn context_section(call: &ActionCall) -> String {
    call.opt_str("context")
        .map(|context| format!("\nRepository Context:\n{context}"))
        .unwrap_or_default()
}

/// Instructions for a retry after a rejected attempt, empty on the first try.
fn revision_section(call: &ActionCall) -> String {
    let Some(feedback) = call.opt_str("review_feedback") else {
        return String::new();
    };
    let previous = match call.args.get("previous_attempt") {
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => return String::new(),
    };
    format!(
        "\n\nA reviewer rejected this previous attempt:\n{previous}\n\n\
         Reviewer feedback: {feedback}\n\
         Address every point of the feedback in the new version."
    )
}

// ── analyze_deveval_requirements ────────────────────────────────────────

pub struct AnalyzeRequirementsTool;

impl AnalyzeRequirementsTool {
    pub fn action() -> Action {
        Action::new(
            "analyze_deveval_requirements",
            "Analyze a function implementation task and plan the simplest implementation.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("namespace", ParamType::String, "Dotted path of the function")
                .required("requirements", ParamType::String, "What the function must do")
                .optional("context", ParamType::String, "Surrounding repository code"),
        )
        .with_tags(["deveval", "analysis"])
        .with_dependencies(Dependencies::context())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "function_name": {"type": "string"},
                "function_purpose": {"type": "string"},
                "input_parameters": {"type": "array", "items": {"type": "string"}},
                "return_value": {"type": "string"},
                "dependencies": {"type": "array", "items": {"type": "string"}},
                "error_handling": {"type": "string"},
                "implementation_strategy": {"type": "string"},
                "reusable_code": {"type": "string"}
            },
            "required": ["function_name", "function_purpose", "implementation_strategy"]
        })
    }
}

#[async_trait]
impl ActionHandler for AnalyzeRequirementsTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("analyze_deveval_requirements")?;
        let namespace = call.str_arg("namespace")?;
        let requirements = call.str_arg("requirements")?;

        let prompt = format!(
            "Analyze this function implementation task:\n\n\
             Namespace: {namespace}\n\
             Requirements: {requirements}{}\n\n\
             Provide a detailed analysis:\n\
             1. Function name (the last segment of the namespace)\n\
             2. What the function needs to do\n\
             3. Input parameters and their types\n\
             4. Expected return value and type\n\
             5. Required imports or dependencies from the context\n\
             6. Edge cases and error handling needed\n\
             7. Implementation strategy, step by step\n\n\
             If context is provided, point out helper functions, classes and import \
             patterns that can be reused.\n\n\
             Focus on the SIMPLEST approach using existing code patterns.",
            context_section(&call)
        );
        prompt_for_json(context.model().as_ref(), &Self::schema(), &prompt).await
    }
}

// ── generate_complete_function ──────────────────────────────────────────

pub struct GenerateFunctionTool;

impl GenerateFunctionTool {
    const SYSTEM: &'static str = "You are a Python developer. Generate complete, working functions \
        with proper signatures and implementations.";

    pub fn action() -> Action {
        Action::new(
            "generate_complete_function",
            "Generate a complete, working Python function from an analysis.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("analysis", ParamType::String, "Analysis of the task")
                .required("requirements", ParamType::String, "What the function must do")
                .optional("context", ParamType::String, "Surrounding repository code"),
        )
        .with_tags(["deveval", "coding"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for GenerateFunctionTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("generate_complete_function")?;
        let analysis = call.str_arg("analysis")?;
        let requirements = call.str_arg("requirements")?;

        let prompt = format!(
            "Generate a complete, working Python function based on this analysis.\n\n\
             Analysis: {analysis}\n\
             Requirements: {requirements}{}\n\n\
             CRITICAL RULES:\n\
             1. Include the complete definition starting with 'def function_name(...):'\n\
             2. Use exactly 4 spaces for indentation throughout\n\
             3. Put any imports INSIDE the function, at the top\n\
             4. Handle every edge case mentioned in the analysis\n\
             5. Reuse patterns and helper functions from the context if provided\n\n\
             Generate ONLY the function code: no markdown fences, no explanations, \
             no comments, no docstrings.{}",
            context_section(&call),
            revision_section(&call)
        );

        debug!(revision = call.args.contains_key("review_feedback"), "Generating function");
        let code = context
            .model()
            .generate(&Prompt::system_and_user(Self::SYSTEM, prompt))
            .await?;
        Ok(Value::String(code))
    }
}

// ── generate_bdd_tests ──────────────────────────────────────────────────

pub struct GenerateBddTestsTool;

impl GenerateBddTestsTool {
    pub fn action() -> Action {
        Action::new(
            "generate_bdd_tests",
            "Generate Gherkin scenarios that cover a function's behaviour.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("namespace", ParamType::String, "Dotted path of the function under test")
                .required("analysis", ParamType::String, "Analysis of the function"),
        )
        .with_tags(["deveval", "bdd"])
        .with_dependencies(Dependencies::context())
    }
}

#[async_trait]
impl ActionHandler for GenerateBddTestsTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("generate_bdd_tests")?;
        let namespace = call.str_arg("namespace")?;
        let analysis = call.str_arg("analysis")?;

        let prompt = format!(
            "Generate BDD scenarios for testing this function.\n\n\
             Namespace: {namespace}\n\
             Analysis: {analysis}\n\n\
             Use Gherkin syntax with Given, When, Then. Cover normal cases, edge cases \
             and error handling. Output only the scenarios.\n\n\
             Example format:\n\
             Feature: Functionality of {namespace}\n\n\
             \x20 Scenario: Description of scenario\n\
             \x20   Given some initial context\n\
             \x20   When an action is performed\n\
             \x20   Then expect a specific outcome{}",
            revision_section(&call)
        );

        let scenarios = context
            .model()
            .generate(&Prompt::system_and_user(
                "You are a BDD test case generator. Produce clear Gherkin scenarios.",
                prompt,
            ))
            .await?;
        Ok(Value::String(scenarios))
    }
}

// ── review_deveval_code ─────────────────────────────────────────────────

pub struct ReviewGeneratedCodeTool;

impl ReviewGeneratedCodeTool {
    pub fn action() -> Action {
        Action::new(
            "review_deveval_code",
            "Check generated function code against its requirements and suggest a fix.",
            Arc::new(Self),
        )
        .with_parameters(
            ParameterSchema::new()
                .required("code", ParamType::String, "The generated code")
                .required("requirements", ParamType::String, "What the function must do")
                .required("namespace", ParamType::String, "Dotted path of the function"),
        )
        .with_tags(["deveval", "review"])
        .with_dependencies(Dependencies::context())
    }

    fn schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "is_correct": {"type": "boolean"},
                "indentation_ok": {"type": "boolean"},
                "meets_requirements": {"type": "boolean"},
                "issues": {"type": "array", "items": {"type": "string"}},
                "improved_code": {"type": "string"},
                "confidence": {"type": "number"}
            }
        })
    }
}

#[async_trait]
impl ActionHandler for ReviewGeneratedCodeTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let context = call.context("review_deveval_code")?;
        let code = call.str_arg("code")?;
        let requirements = call.str_arg("requirements")?;
        let namespace = call.str_arg("namespace")?;

        let prompt = format!(
            "Review this function implementation:\n\n\
             Namespace: {namespace}\n\
             Requirements: {requirements}\n\
             Generated Code:\n{code}\n\n\
             Check:\n\
             1. Does it meet all requirements?\n\
             2. Do parameter names, types and the return type match the requirements?\n\
             3. Is indentation exactly 4 spaces?\n\
             4. Are there syntax errors?\n\
             5. Are edge cases handled?\n\n\
             If issues are found, provide improved_code with the fixes."
        );
        prompt_for_json(context.model().as_ref(), &Self::schema(), &prompt).await
    }
}

// ── extract_clean_code ──────────────────────────────────────────────────

/// Pull the body of the first `def` out of raw model output.
///
/// Markdown fences, the `def` line and docstrings are dropped. The body ends
/// at the first non-comment line indented no deeper than the `def`, and is
/// re-indented in 4-space steps starting at four spaces.
pub fn extract_function_body(raw_output: &str) -> String {
    let mut body: Vec<String> = Vec::new();
    let mut function_indent: Option<usize> = None;
    let mut docstring: Option<&str> = None;

    let lines = raw_output
        .lines()
        .filter(|line| !line.trim_start().starts_with("```"));
    for line in lines {
        let stripped = line.trim();
        let indent = line.len() - line.trim_start().len();

        let Some(base) = function_indent else {
            if stripped.starts_with("def ") && stripped.contains('(') && stripped.contains(':') {
                function_indent = Some(indent);
            }
            continue;
        };

        if let Some(quote) = docstring {
            if line.contains(quote) {
                docstring = None;
            }
            continue;
        }
        if let Some(quote) = ["\"\"\"", "'''"].into_iter().find(|q| stripped.starts_with(q)) {
            if stripped.matches(quote).count() < 2 {
                docstring = Some(quote);
            }
            continue;
        }

        if stripped.is_empty() {
            body.push(String::new());
            continue;
        }
        if indent <= base && !stripped.starts_with('#') {
            break;
        }
        let width = (indent.saturating_sub(base) / 4 * 4).max(4);
        body.push(format!("{}{stripped}", " ".repeat(width)));
    }

    while body.last().is_some_and(|line| line.is_empty()) {
        body.pop();
    }
    let result = body.join("\n");
    if result.trim().len() < 5 {
        return EMPTY_BODY.to_string();
    }
    result
}

pub struct ExtractCleanCodeTool;

impl ExtractCleanCodeTool {
    pub fn action() -> Action {
        Action::new(
            "extract_clean_code",
            "Extract a clean, 4-space-indented function body from raw model output.",
            Arc::new(Self),
        )
        .with_parameters(ParameterSchema::new().required(
            "raw_output",
            ParamType::String,
            "Model output containing a function definition",
        ))
        .with_tags(["deveval", "extraction"])
    }
}

#[async_trait]
impl ActionHandler for ExtractCleanCodeTool {
    async fn invoke(&self, call: ActionCall) -> Result<Value, ToolError> {
        let raw_output = call.str_arg("raw_output")?;
        Ok(Value::String(extract_function_body(raw_output)))
    }
}

/// Every code generation tool.
pub fn codegen_actions() -> Vec<Action> {
    vec![
        AnalyzeRequirementsTool::action(),
        GenerateFunctionTool::action(),
        GenerateBddTestsTool::action(),
        ReviewGeneratedCodeTool::action(),
        ExtractCleanCodeTool::action(),
    ]
}
