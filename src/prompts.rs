// src/prompts.rs
//
// Request categories are configuration data: one table entry per category,
// not separate handler code paths.

use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Advice,
    Mindfulness,
}

pub struct RequestConfig {
    /// Name the browser client sends as `requestType`.
    pub wire_name: &'static str,
    /// Category recorded in the ai_usage log.
    pub usage_category: &'static str,
    /// Field carrying the completion text in the caller-facing response.
    pub response_field: &'static str,
    pub model: &'static str,
    pub system_prompt: &'static str,
    pub max_tokens: u32,
    pub temperature: f32,
}

static ADVICE: RequestConfig = RequestConfig {
    wire_name: "mainAdvice",
    usage_category: "dashboard",
    response_field: "advice",
    model: "grok-3",
    system_prompt: "You are a professional addiction therapist. Give advice based on the \
                    user's drinking habits and other submitted data.",
    max_tokens: 500,
    temperature: 0.7,
};

static MINDFULNESS: RequestConfig = RequestConfig {
    wire_name: "mindfulnessTip",
    usage_category: "mindfulness",
    response_field: "response",
    model: "grok-3",
    system_prompt: "You are a mindfulness coach helping someone resist the urge to drink. \
                    Offer one short, practical exercise tailored to their current triggers.",
    max_tokens: 200,
    temperature: 0.7,
};

impl RequestKind {
    pub fn from_wire(name: &str) -> Option<Self> {
        match name {
            "mainAdvice" => Some(Self::Advice),
            "mindfulnessTip" => Some(Self::Mindfulness),
            _ => None,
        }
    }

    pub fn config(&self) -> &'static RequestConfig {
        match self {
            Self::Advice => &ADVICE,
            Self::Mindfulness => &MINDFULNESS,
        }
    }
}

/// Top three moods by journal count, as "mood: NN%" pairs.
pub fn mood_insight(user_data: &Value) -> String {
    let Some(map) = user_data.get("moodCorrelations").and_then(|v| v.as_object()) else {
        return String::new();
    };

    let mut moods: Vec<_> = map.iter().collect();
    moods.sort_by_key(|(_, data)| {
        std::cmp::Reverse(data.get("count").and_then(|c| c.as_i64()).unwrap_or(0))
    });

    moods
        .iter()
        .take(3)
        .map(|(mood, data)| {
            let pct = data.get("percentage").and_then(|p| p.as_i64()).unwrap_or(0);
            format!("{mood}: {pct}%")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn field(user_data: &Value, key: &str, default: &Value) -> String {
    user_data.get(key).unwrap_or(default).to_string()
}

pub fn build_user_prompt(kind: RequestKind, user_data: &Value) -> String {
    let empty_list = Value::Array(vec![]);
    let empty_map = Value::Object(serde_json::Map::new());

    match kind {
        RequestKind::Advice => {
            let moods = mood_insight(user_data);
            let moods = if moods.is_empty() {
                "No mood data yet".to_string()
            } else {
                moods
            };

            format!(
                "Provide personalized advice based on the user's full data:\n\
                 - Triggers: {}\n\
                 - Historical Drinking Patterns: {}\n\
                 - Context Frequencies: {}\n\
                 - Mood When Drinking: {}\n\
                 - Reflections: {}\n\n\
                 Structure the advice in short paragraphs (1-2 sentences each) with sections:\n\
                 1. Mood & Emotional Patterns (highlight correlations like \"You drink X% more when feeling stressed\")\n\
                 2. Triggers Analysis\n\
                 3. Drinking Patterns Insights\n\
                 4. Personalized Tips\n\n\
                 Keep it encouraging, concise, and supportive, aligned with CBT principles. \
                 Be specific about mood correlations if data is available.",
                field(user_data, "triggers", &empty_list),
                field(user_data, "historicalDrinkingPatterns", &empty_map),
                field(user_data, "contextFrequencies", &empty_map),
                moods,
                field(user_data, "reflections", &empty_list),
            )
        }
        RequestKind::Mindfulness => format!(
            "Suggest one mindfulness exercise for someone currently tempted to drink.\n\
             - Triggers: {}\n\n\
             Keep it to 2-3 sentences, calm and actionable.",
            field(user_data, "triggers", &empty_list),
        ),
    }
}
