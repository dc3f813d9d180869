//! Model-reviewed execution.
//!
//! Actions in the review set are executed, judged by the run's model, and
//! re-executed with the reviewer's feedback until approved or out of
//! attempts. Everything else runs once through [`InjectingEnvironment`].

use async_trait::async_trait;
use gamekit_config::ReviewSettings;
use gamekit_core::action::Action;
use gamekit_core::context::ActionContext;
use gamekit_core::prompt::Prompt;
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, info};

use super::{ActionOutcome, Environment, InjectingEnvironment};
use crate::error::EnvironmentError;

/// A reviewer's decision on one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewVerdict {
    pub approved: bool,
    pub feedback: String,
}

impl ReviewVerdict {
    /// Read a `DECISION: ... / FEEDBACK: ...` answer.
    ///
    /// Approved iff the upper-cased text contains `APPROVE`. Feedback is the
    /// text after the first `FEEDBACK:`, or the whole answer without one.
    pub fn parse(response: &str) -> Self {
        const MARKER: &str = "FEEDBACK:";
        let feedback = match response.find(MARKER) {
            Some(idx) => response[idx + MARKER.len()..].trim().to_string(),
            None => response.to_string(),
        };
        Self {
            approved: response.to_uppercase().contains("APPROVE"),
            feedback,
        }
    }
}

pub struct AiReviewEnvironment {
    inner: InjectingEnvironment,
    immediate: BTreeSet<String>,
    review: BTreeSet<String>,
    max_review_iterations: usize,
}

impl Default for AiReviewEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl AiReviewEnvironment {
    pub fn new() -> Self {
        Self::from_settings(&ReviewSettings::default())
    }

    pub fn from_settings(settings: &ReviewSettings) -> Self {
        Self {
            inner: InjectingEnvironment,
            immediate: settings.immediate_actions.iter().cloned().collect(),
            review: settings.review_actions.iter().cloned().collect(),
            max_review_iterations: settings.max_review_iterations.max(1),
        }
    }

    pub fn with_review_actions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.immediate.remove(&name);
            self.review.insert(name);
        }
        self
    }

    pub fn with_immediate_actions<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for name in names {
            let name = name.into();
            self.review.remove(&name);
            self.immediate.insert(name);
        }
        self
    }

    pub fn with_max_review_iterations(mut self, attempts: usize) -> Self {
        self.max_review_iterations = attempts.max(1);
        self
    }

    pub fn max_review_iterations(&self) -> usize {
        self.max_review_iterations
    }

    /// Unknown actions run immediately, like the immediate set.
    pub fn needs_review(&self, action_name: &str) -> bool {
        self.review.contains(action_name) && !self.immediate.contains(action_name)
    }

    async fn review(
        &self,
        context: &ActionContext,
        action_name: &str,
        content: &Value,
        args: &Map<String, Value>,
    ) -> Result<ReviewVerdict, EnvironmentError> {
        let content = match content {
            Value::String(text) => text.clone(),
            other => serde_json::to_string_pretty(other).unwrap_or_else(|_| other.to_string()),
        };
        let prompt = Prompt::system_and_user(
            "You are a meticulous reviewer of generated code and tests.",
            review_prompt(action_name, &content, args),
        );

        let response = context
            .model()
            .generate(&prompt)
            .await
            .map_err(|source| EnvironmentError::Review {
                action: action_name.to_string(),
                source,
            })?;
        Ok(ReviewVerdict::parse(&response))
    }

    async fn execute_with_review(
        &self,
        context: &ActionContext,
        action: &Action,
        mut args: Map<String, Value>,
    ) -> Result<ActionOutcome, EnvironmentError> {
        let mut last_attempt = Value::Null;
        let mut last_feedback = String::new();

        for attempt in 1..=self.max_review_iterations {
            debug!(action = action.name(), attempt, "Review attempt");
            let outcome = self.inner.execute(context, action, args.clone()).await?;
            if !outcome.tool_executed {
                return Ok(outcome);
            }

            let generated = outcome.result.unwrap_or(Value::Null);
            let verdict = self.review(context, action.name(), &generated, &args).await?;
            if verdict.approved {
                info!(action = action.name(), attempts = attempt, "Approved by review");
                return Ok(ActionOutcome::success(generated)
                    .with_field("review_iterations", attempt)
                    .with_field("review_feedback", verdict.feedback));
            }

            info!(
                action = action.name(),
                attempt,
                feedback = %verdict.feedback,
                "Rejected by review"
            );
            args.insert("previous_attempt".into(), generated.clone());
            args.insert("review_feedback".into(), Value::String(verdict.feedback.clone()));
            last_attempt = generated;
            last_feedback = verdict.feedback;
        }

        Ok(ActionOutcome::failure(format!(
            "Failed AI review after {} attempts",
            self.max_review_iterations
        ))
        .with_field("last_attempt", last_attempt)
        .with_field("final_feedback", last_feedback))
    }
}

#[async_trait]
impl Environment for AiReviewEnvironment {
    fn name(&self) -> &str {
        "ai_review"
    }

    async fn execute(
        &self,
        context: &ActionContext,
        action: &Action,
        args: Map<String, Value>,
    ) -> Result<ActionOutcome, EnvironmentError> {
        if self.needs_review(action.name()) {
            self.execute_with_review(context, action, args).await
        } else {
            debug!(action = action.name(), "Immediate execution");
            self.inner.execute(context, action, args).await
        }
    }
}

fn review_prompt(operation: &str, content: &str, args: &Map<String, Value>) -> String {
    let requirement = |key: &str| {
        args.get(key)
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
            .unwrap_or_else(|| "N/A".to_string())
    };
    const FORMAT: &str = "Response format:\nDECISION: [APPROVE/REJECT]\n\
                          FEEDBACK: [Specific feedback for improvement]";

    match operation {
        "generate_step_definitions" => format!(
            "Review this BDD step definitions code.\n\nCONTENT TO REVIEW:\n{content}\n\n\
             ORIGINAL REQUIREMENTS:\n{}\n\n\
             CHECK FOR:\n\
             1. Correct Gherkin step matching (Given/When/Then)\n\
             2. Proper parameter extraction and handling\n\
             3. Appropriate assertions and validations\n\
             4. No duplicate or conflicting step definitions\n\n\
             APPROVE if the code is production-ready.\n\
             REJECT if there are issues that need fixing.\n\n{FORMAT}",
            requirement("scenarios")
        ),
        "generate_test_implementation" => format!(
            "Review this test implementation.\n\nCONTENT TO REVIEW:\n{content}\n\n\
             ORIGINAL REQUIREMENTS:\n{}\n\n\
             CHECK FOR:\n\
             1. Tests exercise the business requirements\n\
             2. Edge cases and error conditions are covered\n\
             3. Tests are independent of one another\n\n\
             APPROVE if tests are comprehensive and correct.\n\
             REJECT if tests are incomplete or incorrect.\n\n{FORMAT}",
            requirement("step_definitions")
        ),
        "generate_production_code" => format!(
            "Review this production code.\n\nCONTENT TO REVIEW:\n{content}\n\n\
             ORIGINAL REQUIREMENTS:\n{}\n\n\
             CHECK FOR:\n\
             1. Code implements the business requirements\n\
             2. Errors and edge cases are handled\n\
             3. Structure is readable and maintainable\n\
             4. Security and performance are considered\n\n\
             APPROVE if code is production-ready.\n\
             REJECT if there are quality or correctness issues.\n\n{FORMAT}",
            requirement("requirements")
        ),
        "generate_complete_function" => format!(
            "Review this generated function.\n\nCONTENT TO REVIEW:\n{content}\n\n\
             ORIGINAL REQUIREMENTS:\n{}\n\n\
             CHECK FOR:\n\
             1. A complete definition whose name and parameters match the requirements\n\
             2. Indentation of exactly 4 spaces and no syntax errors\n\
             3. Edge cases from the analysis are handled\n\
             4. Only code: no markdown, explanations or docstrings\n\n\
             APPROVE if the function is correct.\n\
             REJECT if it needs changes.\n\n{FORMAT}",
            requirement("requirements")
        ),
        "generate_bdd_tests" => format!(
            "Review these BDD scenarios.\n\nCONTENT TO REVIEW:\n{content}\n\n\
             FUNCTION ANALYSIS:\n{}\n\n\
             CHECK FOR:\n\
             1. Valid Gherkin with Given/When/Then\n\
             2. Normal cases, edge cases and error handling are all covered\n\
             3. Nothing but scenarios in the output\n\n\
             APPROVE if the scenarios fully cover the function.\n\
             REJECT if coverage is missing.\n\n{FORMAT}",
            requirement("analysis")
        ),
        _ => format!("Review this generated content:\n{content}\n\n{FORMAT}"),
    }
}
