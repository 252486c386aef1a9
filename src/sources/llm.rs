//! Groq chat-completions source. The model is asked to produce mandi quotes as
//! a JSON array; nothing it returns is validated beyond shape.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{record_from_value, PriceSource};
use crate::config::{Config, LLM_TIMEOUT_SECS};
use crate::error::Result;
use crate::resolver::assemble::format_crop_name;
use crate::types::{MarketRecord, PriceQuery, ResolutionSource};

pub struct GroqSource {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    model: String,
}

impl GroqSource {
    pub fn new(cfg: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(LLM_TIMEOUT_SECS))
            .build()?;
        Ok(Self {
            client,
            api_key: cfg.groq_api_key.clone(),
            api_url: cfg.groq_api_url.clone(),
            model: cfg.groq_model.clone(),
        })
    }

    async fn complete(&self, prompt: String) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            temperature: 0.2,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json::<ChatResponse>()
            .await?;

        Ok(response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default())
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f64,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[async_trait]
impl PriceSource for GroqSource {
    fn kind(&self) -> ResolutionSource {
        ResolutionSource::Llm
    }

    async fn fetch(&self, query: &PriceQuery) -> Vec<MarketRecord> {
        if self.api_key.is_empty() {
            warn!("[Groq] GROQ_API_KEY not configured, skipping");
            return Vec::new();
        }

        let today = chrono::Utc::now().format("%Y-%m-%d").to_string();
        let prompt = build_prompt(query, &today);
        info!(crop = %query.crop, limit = query.limit, "[Groq] requesting market prices");

        let text = match self.complete(prompt).await {
            Ok(t) => t,
            Err(e) => {
                warn!(crop = %query.crop, "[Groq] request failed: {e}");
                return Vec::new();
            }
        };

        let records = parse_reply(&text, &format_crop_name(&query.crop));
        if records.is_empty() {
            let snippet: String = text.chars().take(200).collect();
            warn!(crop = %query.crop, "[Groq] no usable records in reply: {snippet:?}");
        } else {
            debug!(crop = %query.crop, count = records.len(), "[Groq] parsed records");
        }
        records
    }
}

/// Realistic wholesale range in INR/kg, stated to the model but never enforced.
pub fn price_range(crop: &str) -> (u32, u32) {
    match crop.trim().to_lowercase().as_str() {
        "tomato" => (10, 80),
        "onion" => (15, 70),
        "potato" => (10, 40),
        "wheat" => (20, 35),
        "rice" => (25, 60),
        "maize" => (15, 30),
        "cotton" => (50, 80),
        "sugarcane" => (2, 5),
        "soybean" => (35, 60),
        "groundnut" => (45, 80),
        "chili" | "chilli" => (40, 200),
        "banana" => (10, 40),
        "mango" => (30, 150),
        _ => (10, 100),
    }
}

pub fn build_prompt(query: &PriceQuery, today: &str) -> String {
    let crop = format_crop_name(&query.crop);
    let (low, high) = price_range(&query.crop);
    let language = query.language.display_name();

    format!(
        r#"You are an agricultural market data expert for Indian mandis.

Generate TODAY'S wholesale mandi prices for {crop} in India.

Return ONLY a valid JSON array with exactly {limit} market entries. Each entry must have these exact fields:
{{
  "market": "Market Name",
  "state": "State Name",
  "district": "District Name",
  "commodity": "{crop}",
  "variety": "Local",
  "arrival_date": "{today}",
  "min_price": <number>,
  "max_price": <number>,
  "modal_price": <number>,
  "latitude": <number between 8 and 35>,
  "longitude": <number between 68 and 97>
}}

Write the market, state and district names in {language}.
All prices must be in INR per kg, between {low} and {high} for {crop}, with min_price <= modal_price <= max_price.
Prefer markets near latitude {lat:.4}, longitude {lon:.4}.

Return ONLY the JSON array, no markdown, no explanations."#,
        limit = query.limit,
        lat = query.lat,
        lon = query.lon,
    )
}

/// First balanced `[...]` in `text`, ignoring brackets inside string literals.
pub fn extract_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, ch) in text[start..].char_indices() {
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
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn parse_reply(text: &str, crop: &str) -> Vec<MarketRecord> {
    let Some(array) = extract_json_array(text) else {
        return Vec::new();
    };
    let items: Vec<serde_json::Value> = match serde_json::from_str(array) {
        Ok(items) => items,
        Err(e) => {
            warn!("[Groq] JSON parse failed: {e}");
            return Vec::new();
        }
    };
    items
        .iter()
        .filter_map(|v| record_from_value(v, crop, 1.0))
        .collect()
}
