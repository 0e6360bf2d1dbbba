use std::fmt::Write;

use leadloop_core::refinement::states::Direction;
use leadloop_core::search::RefinementContext;

pub const REFINE_SYSTEM_PROMPT: &str = "You refine B2B lead searches for the Instantly SuperSearch API. \
You receive a goal, the current search filters, and the lead count they produced. \
Make one kind of change only: broaden when told to broaden, narrow when told to narrow. \
Always return the complete filter object, not a diff. \
Respond with a single JSON object and nothing else.";

pub const SEED_SYSTEM_PROMPT: &str = "You translate a plain-language lead search goal into \
Instantly SuperSearch filters. Prefer a small number of precise filters. \
Respond with a single JSON object and nothing else.";

const FILTER_SHAPE: &str = r#"{
  "locations": {"include": [{"country": "US", "state": "CO", "city": "Denver"}], "exclude": []},
  "job_titles": {"include": ["CEO"], "exclude": ["Assistant"]},
  "management_levels": ["c_level"],
  "departments": ["engineering"],
  "industries": ["Software"],
  "company_size": {"min": 10, "max": 200},
  "revenue_range": {"min": 1000000, "max": 50000000},
  "technologies": ["Salesforce"],
  "keywords": ["hiring"],
  "funding_type": ["venture"],
  "funding_stage": ["series_a"]
}"#;

fn direction_guidance(direction: Direction) -> &'static str {
    match direction {
        Direction::Broaden => {
            "BROADEN: the count is below the target. Only relax filters: widen company_size or \
revenue_range, add industries, titles or locations, or drop keyword/technology/funding filters. \
Do not add new restrictions."
        }
        Direction::Narrow => {
            "NARROW: the count is above the target. Only tighten filters: shrink company_size or \
revenue_range, restrict industries or locations, or add keyword/technology/funding filters. \
Do not remove existing restrictions."
        }
    }
}

pub fn refine_prompt(context: &RefinementContext<'_>) -> String {
    let filters = context.filters.to_pretty_json();
    let history = if context.history.is_empty() {
        "none".to_string()
    } else {
        context.history.iter().map(u64::to_string).collect::<Vec<_>>().join(" -> ")
    };

    let mut prompt = String::new();
    let _ = writeln!(prompt, "GOAL:\n{}\n", context.goal.trim());
    let _ = writeln!(
        prompt,
        "TARGET RANGE: {} to {} leads (inclusive)",
        context.target.min(),
        context.target.max()
    );
    let _ = writeln!(prompt, "ITERATION: {} of {}", context.iteration, context.max_iterations);
    let _ = writeln!(prompt, "CURRENT COUNT: {}", context.count);
    let _ = writeln!(prompt, "COUNT HISTORY: {history}\n");
    let _ = writeln!(prompt, "CURRENT FILTERS:\n{filters}\n");
    let _ = writeln!(prompt, "{}\n", direction_guidance(context.direction));
    let _ = writeln!(prompt, "Available filter fields and their shapes:\n{FILTER_SHAPE}\n");
    prompt.push_str(
        "Respond ONLY with JSON of this form:\n\
{\"modified_filters\": { ...complete filter object... }, \
\"change_description\": \"one sentence\", \
\"estimated_new_count\": 1200}",
    );
    prompt
}

pub fn seed_prompt(goal: &str) -> String {
    format!(
        "GOAL:\n{}\n\nAvailable filter fields and their shapes:\n{FILTER_SHAPE}\n\n\
Respond ONLY with the filter object. Omit fields the goal does not constrain.",
        goal.trim()
    )
}
