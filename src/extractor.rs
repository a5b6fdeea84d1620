// Natural-language query to SearchFilters, model first with a keyword fallback

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::llm::{CompletionProvider, CompletionRequest};
use crate::models::SearchFilters;
use crate::vocabulary::Vocabulary;

const EXTRACTION_PROMPT: &str = "You are an expert at parsing natural language search queries for car auctions. \
Extract structured search criteria from the user's query and respond with JSON only.\n\n\
Extract the following information when present:\n\
- make: Car manufacturer (e.g., \"Toyota\", \"BMW\", \"Honda\")\n\
- model: Car model (e.g., \"Camry\", \"Accord\", \"3 Series\")\n\
- minYear: Minimum year (number)\n\
- maxYear: Maximum year (number)\n\
- maxPrice: Maximum price in dollars (number, no currency symbols)\n\
- minPrice: Minimum price in dollars (number, no currency symbols)\n\
- damageType: Type of damage mentioned (e.g., \"hail\", \"flood\", \"front end\", \"minor\", \"clean title\")\n\
- location: Geographic location (state, city, or region)\n\
- keywords: Array of other relevant search terms\n\n\
Rules:\n\
- Only include fields that are explicitly mentioned or clearly implied\n\
- For price ranges like \"under $10,000\", use maxPrice\n\
- For damage like \"hail damage\", extract \"hail\" as damageType\n\
- For year ranges like \"2018-2020\", use minYear and maxYear\n\
- Convert text numbers to actual numbers where appropriate\n\
- If no specific criteria found, return empty object\n\n\
Respond with valid JSON only.";

static UNDER_PRICE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"under \$?(\d+(?:,\d{3})*)").unwrap());

pub struct FilterExtractor {
    completion: Option<Arc<dyn CompletionProvider>>,
    vocabulary: Vocabulary,
    temperature: f32,
}

impl FilterExtractor {
    pub fn new(
        completion: Option<Arc<dyn CompletionProvider>>,
        vocabulary: Vocabulary,
        temperature: f32,
    ) -> Self {
        Self { completion, vocabulary, temperature }
    }

    // Extractor that never calls a model.
    pub fn fallback_only(vocabulary: Vocabulary) -> Self {
        Self::new(None, vocabulary, 0.0)
    }

    pub async fn extract(&self, query: &str) -> SearchFilters {
        if query.trim().is_empty() {
            return SearchFilters::default();
        }

        let Some(completion) = &self.completion else {
            return fallback_parse(query, &self.vocabulary);
        };

        let request = CompletionRequest {
            system_prompt: EXTRACTION_PROMPT.to_string(),
            user_message: query.to_string(),
            temperature: self.temperature,
            json_mode: true,
        };

        match completion.complete(&request).await {
            Ok(Some(content)) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => {
                    let filters = validate_filters(&map);
                    tracing::debug!(?filters, "Extracted filters with language model");
                    filters
                }
                Ok(other) => {
                    tracing::warn!(kind = json_kind(&other), "Model returned non-object JSON, using fallback parser");
                    fallback_parse(query, &self.vocabulary)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Model returned malformed JSON, using fallback parser");
                    fallback_parse(query, &self.vocabulary)
                }
            },
            Ok(None) => {
                tracing::warn!("Model returned no content, using fallback parser");
                fallback_parse(query, &self.vocabulary)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Filter extraction call failed, using fallback parser");
                fallback_parse(query, &self.vocabulary)
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn string_field(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)?
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn year_field(map: &Map<String, Value>, key: &str) -> Option<i32> {
    let Value::Number(n) = map.get(key)? else {
        return None;
    };
    let year = n
        .as_i64()
        .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64))?;
    i32::try_from(year).ok().filter(|y| *y > 1900)
}

fn price_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    map.get(key)?.as_f64().filter(|p| p.is_finite() && *p > 0.0)
}

fn keywords_field(map: &Map<String, Value>) -> Option<Vec<String>> {
    let items = map.get("keywords")?.as_array()?;
    items
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect::<Option<Vec<_>>>()
}

// Keeps only the fields that pass type and sanity checks.
pub fn validate_filters(map: &Map<String, Value>) -> SearchFilters {
    SearchFilters {
        make: string_field(map, "make"),
        model: string_field(map, "model"),
        min_year: year_field(map, "minYear"),
        max_year: year_field(map, "maxYear"),
        min_price: price_field(map, "minPrice"),
        max_price: price_field(map, "maxPrice"),
        damage_type: string_field(map, "damageType"),
        location: string_field(map, "location"),
        keywords: keywords_field(map),
    }
}

// Best-effort keyword scan. First vocabulary hit wins for each field.
pub fn fallback_parse(query: &str, vocabulary: &Vocabulary) -> SearchFilters {
    let lower = query.to_lowercase();
    let first_hit = |words: &[String]| {
        words
            .iter()
            .find(|w| !w.is_empty() && lower.contains(&w.to_lowercase()))
            .cloned()
    };

    let max_price = UNDER_PRICE_PATTERN
        .captures(&lower)
        .and_then(|caps| caps[1].replace(',', "").parse::<f64>().ok())
        .filter(|p| *p > 0.0);

    SearchFilters {
        make: first_hit(&vocabulary.query_makes),
        model: first_hit(&vocabulary.models),
        max_price,
        damage_type: first_hit(&vocabulary.damage_keywords),
        location: first_hit(&vocabulary.states),
        ..Default::default()
    }
}
