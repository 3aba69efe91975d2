//! Structured LLM step: prompt in, validated JSON object out
//!
//! Every agent is a [`StructuredStep`]; [`StepRunner`] owns the call,
//! timeout, metrics and parsing so the agents only describe prompts and
//! output shapes. Output that fails JSON parsing, enum membership or
//! `validator` rules is a contract error and is never coerced.

use lazy_static::lazy_static;
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;
use validator::Validate;

use crate::error::{bounded, PipelineError};
use crate::llm::{ChatModel, ChatRequest};
use crate::metrics;

lazy_static! {
    static ref JSON_FENCE: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("static regex");
}

pub trait StructuredStep: Send + Sync {
    /// Step name used in errors, logs and metrics.
    const NAME: &'static str;
    const TEMPERATURE: f32 = 0.2;
    const MAX_TOKENS: u32 = 1024;

    type Input: Sync + ?Sized;
    type Output: DeserializeOwned + Validate + Send;

    fn system_prompt(&self) -> String;

    fn user_prompt(&self, input: &Self::Input) -> String;

    /// Checks that need the input, e.g. references back into it.
    fn check(&self, _input: &Self::Input, _output: &Self::Output) -> Result<(), String> {
        Ok(())
    }
}

#[derive(Clone)]
pub struct StepRunner {
    chat: Arc<dyn ChatModel>,
    timeout: Duration,
}

impl StepRunner {
    pub fn new(chat: Arc<dyn ChatModel>, timeout: Duration) -> Self {
        Self { chat, timeout }
    }

    pub async fn run<S: StructuredStep>(
        &self,
        step: &S,
        input: &S::Input,
    ) -> Result<S::Output, PipelineError> {
        let request = ChatRequest {
            step: S::NAME,
            system: step.system_prompt(),
            user: step.user_prompt(input),
            temperature: S::TEMPERATURE,
            max_tokens: S::MAX_TOKENS,
            json_mode: true,
        };

        let started = Instant::now();
        let raw = bounded(S::NAME, self.timeout, self.chat.complete(request)).await?;
        metrics::observe_step(S::NAME, started.elapsed().as_secs_f64());
        debug!("{} returned {} chars", S::NAME, raw.len());

        let output: S::Output = parse_structured(S::NAME, &raw)?;
        step.check(input, &output)
            .map_err(|detail| PipelineError::contract(S::NAME, detail))?;
        Ok(output)
    }
}

/// Locate the JSON object in a model reply (bare or inside a markdown fence).
fn extract_json(raw: &str) -> &str {
    let trimmed = raw.trim();
    if let Some(captures) = JSON_FENCE.captures(trimmed) {
        if let Some(body) = captures.get(1) {
            return body.as_str();
        }
    }
    trimmed
}

/// Validate each element of a nested list, naming the first bad one.
pub(crate) fn validate_items<T: Validate>(field: &str, items: &[T]) -> Result<(), String> {
    for (i, item) in items.iter().enumerate() {
        item.validate()
            .map_err(|e| format!("{}[{}] invalid: {}", field, i, e))?;
    }
    Ok(())
}

pub fn parse_structured<T>(step: &'static str, raw: &str) -> Result<T, PipelineError>
where
    T: DeserializeOwned + Validate,
{
    let output: T = serde_json::from_str(extract_json(raw))
        .map_err(|e| PipelineError::contract(step, format!("unparsable output: {}", e)))?;
    output
        .validate()
        .map_err(|e| PipelineError::contract(step, format!("invalid output: {}", e)))?;
    Ok(output)
}
