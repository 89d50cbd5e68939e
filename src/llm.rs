pub mod transport;

use std::{fmt::Write as _, sync::Arc, time::Duration};

use anyhow::Result;
use schemars::{gen::SchemaSettings, JsonSchema};
use serde_json::Value;
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

use self::transport::{ModelReply, ModelTransport, ToolSpec};
use crate::{
    context::{ContextSnapshot, Season},
    criteria::{Category, CrowdLevel, RawCriteria, SortOrder, Taste},
    extractor::ExtractionResult,
};

pub const TOOL_NAME: &str = "get_dishes_by_criteria";
const TOOL_DESCRIPTION: &str = "Query the canteen's dishes with structured filters. \
    Every field is optional; omit a field to leave it unconstrained.";
const DEFAULT_MODEL_TIMEOUT: Duration = Duration::from_secs(20);
const COLD_BELOW_C: f64 = 15.0;
const HOT_ABOVE_C: f64 = 25.0;

/// Arguments of the dish query tool. Only used to derive the JSON Schema
/// handed to the model; replies are parsed leniently as [`RawCriteria`].
#[allow(dead_code)]
#[derive(JsonSchema)]
struct ToolArguments {
    /// Part of a dish name, e.g. "beef noodles".
    name: Option<String>,
    category: Option<Category>,
    taste: Option<Taste>,
    /// Highest acceptable spice level, 0 (none) to 5 (very hot).
    #[schemars(range(min = 0, max = 5))]
    spice_level: Option<u8>,
    /// Lowest price in yuan.
    #[schemars(range(min = 0))]
    min_price: Option<f64>,
    /// Highest price in yuan.
    #[schemars(range(max = 1000))]
    max_price: Option<f64>,
    /// Lowest acceptable rating, 0 to 5.
    #[schemars(range(min = 0, max = 5))]
    min_rating: Option<f64>,
    sort_by: Option<SortOrder>,
    /// Number of dishes to return.
    #[schemars(range(min = 1, max = 50))]
    result_limit: Option<u32>,
    /// Longest acceptable wait for the dish, in minutes.
    max_wait_minutes: Option<u32>,
    crowd_level: Option<CrowdLevel>,
    /// Canteen hall name.
    hall: Option<String>,
    /// One sentence telling the diner why these filters fit them.
    justification: Option<String>,
}

/// Builds the tool declaration from [`ToolArguments`].
pub fn tool_spec() -> Result<ToolSpec> {
    let generator = SchemaSettings::draft07()
        .with(|s| s.inline_subschemas = true)
        .into_generator();
    let mut parameters = serde_json::to_value(generator.into_root_schema_for::<ToolArguments>())?;
    if let Some(schema) = parameters.as_object_mut() {
        schema.remove("$schema");
        schema.remove("title");
    }
    Ok(ToolSpec {
        name: TOOL_NAME.to_string(),
        description: TOOL_DESCRIPTION.to_string(),
        parameters,
    })
}

/// How the model answered, reduced to what the pipeline acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum Advice {
    /// Criteria with the model's fields laid over the baseline, not yet
    /// validated.
    ToolCall {
        args: RawCriteria,
        justification: Option<String>,
    },
    TextReply {
        text: String,
    },
    Unavailable,
}

pub struct ModelAdvisor {
    transport: Arc<dyn ModelTransport>,
    tool: ToolSpec,
    deadline: Duration,
}

impl ModelAdvisor {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Result<Self> {
        Ok(Self {
            transport,
            tool: tool_spec()?,
            deadline: DEFAULT_MODEL_TIMEOUT,
        })
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn is_available(&self) -> bool {
        self.transport.is_configured()
    }

    #[instrument(name = "model_advise", skip_all)]
    pub async fn advise(
        &self,
        query: &str,
        baseline: &ExtractionResult,
        context: &ContextSnapshot,
    ) -> Advice {
        if !self.is_available() {
            info!("Model transport not configured");
            return Advice::Unavailable;
        }
        let prompt = system_prompt(baseline, context);
        let call = self.transport.invoke_with_tool(&prompt, query, &self.tool);
        let reply = match timeout(self.deadline, call).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                error!(error = ?e, "Model call failed");
                return Advice::Unavailable;
            }
            Err(_) => {
                warn!(deadline = ?self.deadline, "Model call timed out");
                return Advice::Unavailable;
            }
        };

        match reply {
            ModelReply::TextReply { text } if text.trim().is_empty() => {
                warn!("Model replied with blank text");
                Advice::Unavailable
            }
            ModelReply::TextReply { text } => Advice::TextReply { text },
            ModelReply::ToolCall { name, .. } if name != TOOL_NAME => {
                warn!(tool = %name, "Model called an undeclared tool");
                Advice::Unavailable
            }
            ModelReply::ToolCall { arguments, .. } => match parse_arguments(arguments) {
                Some((args, justification)) => {
                    info!(?args, "Model chose criteria");
                    Advice::ToolCall {
                        args: args.over(RawCriteria::from(&baseline.criteria)),
                        justification,
                    }
                }
                None => {
                    warn!("Unparsable tool arguments");
                    Advice::Unavailable
                }
            },
        }
    }
}

fn parse_arguments(arguments: Value) -> Option<(RawCriteria, Option<String>)> {
    match arguments {
        Value::Null => Some((RawCriteria::default(), None)),
        Value::String(encoded) => parse_arguments(serde_json::from_str(&encoded).ok()?),
        Value::Object(map) => {
            let justification = map
                .get("justification")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string);
            let args = serde_json::from_value(Value::Object(map)).ok()?;
            Some((args, justification))
        }
        _ => None,
    }
}

/// The directive system prompt: situation facts, the hints that apply to
/// them, and the baseline the model has to keep.
pub fn system_prompt(baseline: &ExtractionResult, context: &ContextSnapshot) -> String {
    let date = &context.date_info;
    let weather = &context.weather;
    let crowd = &context.crowd;
    let tags: Vec<&str> = date.festival_tags.iter().map(String::as_str).collect();
    let peak_hours: Vec<String> = crowd.peak_hours.iter().map(u32::to_string).collect();

    let mut prompt = format!(
        "You are the dish advisor of a university canteen. Choose filters for the diner's \
        request by calling the `{TOOL_NAME}` tool.\n\n## Situation\n"
    );
    let _ = writeln!(
        prompt,
        "- Date: {} ({}), {:02}:00, season: {}, weekend: {}",
        date.calendar_date,
        date.calendar_date.format("%A"),
        date.hour,
        date.season,
        if date.is_weekend { "yes" } else { "no" },
    );
    let _ = writeln!(prompt, "- Festival tags: {}", tags.join(", "));
    let _ = writeln!(
        prompt,
        "- Weather: {}, {:.0}°C, humidity {:.0}%, wind level {}",
        weather.condition, weather.temperature_c, weather.humidity, weather.wind_level,
    );
    let _ = writeln!(
        prompt,
        "- Crowd: {}, about {} minutes wait; peak hours {}",
        crowd.level.as_str(),
        crowd.avg_wait_minutes,
        peak_hours.join(", "),
    );
    let _ = writeln!(prompt, "- Stored preference: {}", describe_preference(context));

    prompt.push_str("\n## Hints\n");
    for hint in hints(context) {
        let _ = writeln!(prompt, "- {hint}");
    }

    let baseline_json = serde_json::to_string(&baseline.criteria).unwrap_or_default();
    let _ = write!(
        prompt,
        "\n## Baseline criteria\nExtracted from the request with confidence {:.2}: {}\n\
        These are a must-respect baseline. Keep every field; you may add fields or narrow \
        them, never remove them.\n\n## Rules\n\
        - Always call `{TOOL_NAME}` for anything that asks for food, even vaguely.\n\
        - Only answer in plain text when the message is pure small talk.\n\
        - Put one short sentence for the diner in `justification`.\n",
        baseline.confidence, baseline_json,
    );
    prompt
}

fn describe_preference(context: &ContextSnapshot) -> String {
    let Some(preference) = &context.stored_preference else {
        return "unknown".to_string();
    };
    if preference.is_empty() {
        return "none".to_string();
    }
    let mut parts = Vec::new();
    if !preference.preferred_categories.is_empty() {
        let names: Vec<_> = preference.preferred_categories.iter().map(Category::as_str).collect();
        parts.push(format!("categories {}", names.join("/")));
    }
    if !preference.preferred_tastes.is_empty() {
        let names: Vec<_> = preference.preferred_tastes.iter().map(Taste::as_str).collect();
        parts.push(format!("tastes {}", names.join("/")));
    }
    if preference.price_range.narrows_default() {
        parts.push(format!(
            "price ¥{:.0}-¥{:.0}",
            preference.price_range.min, preference.price_range.max
        ));
    }
    if preference.spice_level > 0 {
        parts.push(format!("spice level {}", preference.spice_level));
    }
    if !preference.preferred_halls.is_empty() {
        parts.push(format!("halls {}", preference.preferred_halls.join("/")));
    }
    if !preference.dietary_restrictions.is_empty() {
        parts.push(format!("avoids {}", preference.dietary_restrictions.join("/")));
    }
    if let Some(level) = preference.crowd_preference {
        parts.push(format!("prefers {} crowds", level.as_str()));
    }
    parts.join("; ")
}

fn hints(context: &ContextSnapshot) -> Vec<&'static str> {
    let mut hints = Vec::new();
    let temperature = context.weather.temperature_c;
    if temperature < COLD_BELOW_C {
        hints.push("It is cold: warming, spicy dishes suit the diner.");
    } else if temperature > HOT_ABOVE_C {
        hints.push("It is hot: prefer light, mild dishes.");
    }
    hints.push(match context.date_info.season {
        Season::Spring => "Spring favours fresh, mild flavours.",
        Season::Summer => "Summer favours refreshing sweet-sour dishes.",
        Season::Autumn => "Autumn favours savoury, salty dishes.",
        Season::Winter => "Winter favours hearty, spicy dishes.",
    });
    if context.crowd.level == CrowdLevel::High {
        hints.push("The canteen is crowded: set `max_wait_minutes` to keep the wait short.");
    }
    if context.date_info.is_weekend {
        hints.push("It is the weekend: a slightly pricier treat is fine.");
    }
    hints
}
