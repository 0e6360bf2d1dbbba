use async_trait::async_trait;
use leadloop_core::errors::ServiceError;
use leadloop_core::filters::FilterModel;
use leadloop_core::search::{RefinementAdvisor, RefinementContext, RefinementSuggestion};
use serde_json::Value;
use tracing::{debug, info};

use crate::llm::{CompletionRequest, LlmClient};
use crate::prompts::{refine_prompt, seed_prompt, REFINE_SYSTEM_PROMPT, SEED_SYSTEM_PROMPT};

/// [`RefinementAdvisor`] backed by any [`LlmClient`].
pub struct LlmAdvisor<C> {
    client: C,
    max_tokens: u32,
}

impl<C> LlmAdvisor<C>
where
    C: LlmClient,
{
    pub fn new(client: C, max_tokens: u32) -> Self {
        Self { client, max_tokens }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    async fn ask(&self, system: &str, prompt: String) -> Result<String, ServiceError> {
        let request =
            CompletionRequest { system: system.to_string(), prompt, max_tokens: self.max_tokens };
        let reply = self.client.complete(&request).await?;
        debug!(event_name = "advisor.llm.reply", reply_chars = reply.len(), "advisor replied");
        Ok(reply)
    }
}

#[async_trait]
impl<C> RefinementAdvisor for LlmAdvisor<C>
where
    C: LlmClient,
{
    async fn seed(&self, goal: &str) -> Result<FilterModel, ServiceError> {
        let reply = self.ask(SEED_SYSTEM_PROMPT, seed_prompt(goal)).await?;
        parse_filters(&reply)
    }

    async fn refine(
        &self,
        context: &RefinementContext<'_>,
    ) -> Result<RefinementSuggestion, ServiceError> {
        let reply = self.ask(REFINE_SYSTEM_PROMPT, refine_prompt(context)).await?;
        let suggestion = parse_suggestion(&reply)?;
        info!(
            event_name = "advisor.suggestion.parsed",
            iteration = context.iteration,
            direction = context.direction.as_str(),
            estimated_new_count = ?suggestion.estimated_new_count,
            model = self.client.model_name(),
            "advisor suggestion parsed"
        );
        Ok(suggestion)
    }
}

/// Returns the JSON object in a model reply. A fenced block is preferred;
/// otherwise each `{` is tried in turn until a balanced slice parses, so braces
/// in surrounding prose are skipped.
pub fn extract_json_object(text: &str) -> Option<&str> {
    fenced_block(text).and_then(first_json_object).or_else(|| first_json_object(text))
}

/// Body of the first ```` ``` ```` block, language tag line dropped.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body = &after_fence[after_fence.find('\n')? + 1..];
    let close = body.find("```")?;
    Some(&body[..close])
}

fn first_json_object(text: &str) -> Option<&str> {
    text.match_indices('{').find_map(|(start, _)| {
        let candidate = balanced_object(&text[start..])?;
        serde_json::from_str::<Value>(candidate).ok().filter(Value::is_object).map(|_| candidate)
    })
}

/// `text` starts at `{`; braces inside JSON strings are ignored.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0_usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[..offset + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_object(text: &str) -> Result<Value, ServiceError> {
    let raw = extract_json_object(text).ok_or_else(|| ServiceError::UnparseableSuggestion {
        message: "reply contained no JSON object".to_string(),
    })?;
    serde_json::from_str(raw).map_err(|error| ServiceError::UnparseableSuggestion {
        message: format!("reply JSON is invalid: {error}"),
    })
}

fn decode_filters(value: Value) -> Result<FilterModel, ServiceError> {
    FilterModel::from_value(value)
        .map_err(|error| ServiceError::UnparseableSuggestion { message: error.to_string() })
}

fn estimated_count(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number
            .as_u64()
            .or_else(|| number.as_f64().filter(|n| n.is_finite() && *n >= 0.0).map(|n| n.round() as u64)),
        Value::String(raw) => {
            raw.chars().filter(char::is_ascii_digit).collect::<String>().parse().ok()
        }
        _ => None,
    }
}

pub fn parse_suggestion(text: &str) -> Result<RefinementSuggestion, ServiceError> {
    let mut object = parse_object(text)?;
    let filters = object
        .get_mut("modified_filters")
        .map(Value::take)
        .filter(Value::is_object)
        .ok_or_else(|| ServiceError::UnparseableSuggestion {
            message: "reply is missing a `modified_filters` object".to_string(),
        })?;

    Ok(RefinementSuggestion {
        modified_filters: decode_filters(filters)?,
        change_description: object
            .get("change_description")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim()
            .to_string(),
        estimated_new_count: object.get("estimated_new_count").and_then(estimated_count),
    })
}

/// Seed replies may wrap the filters under `filters`/`search_filters` or be
/// the filter object itself.
pub fn parse_filters(text: &str) -> Result<FilterModel, ServiceError> {
    let mut object = parse_object(text)?;
    let wrapped = ["search_filters", "filters", "modified_filters"]
        .into_iter()
        .find_map(|key| object.get_mut(key).filter(|value| value.is_object()).map(Value::take));
    decode_filters(wrapped.unwrap_or(object))
}
