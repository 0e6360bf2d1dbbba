//! LLM-backed refinement advice.
//!
//! The model is only asked for filter documents. Counting, convergence and
//! enrichment decisions stay in `leadloop-core`; replies are parsed into
//! typed [`FilterModel`](leadloop_core::filters::FilterModel) values and
//! rejected as unparseable when they do not fit.

pub mod advisor;
pub mod llm;
pub mod prompts;

pub use advisor::{extract_json_object, parse_filters, parse_suggestion, LlmAdvisor};
pub use llm::{default_base_url, CompletionRequest, HttpLlmClient, LlmClient};
