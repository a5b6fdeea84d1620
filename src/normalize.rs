// Maps marketplace item summaries onto the internal vehicle shape.
// Summary results carry no structured vehicle attributes, so make/model/year
// and friends are mined from the listing title.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::ebay::{Amount, ItemSummary};
use crate::models::{DamageType, NewVehicle};
use crate::vocabulary::Vocabulary;

static YEAR_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19\d{2}|20\d{2})\b").unwrap());
static MILEAGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d+(?:,\d{3})*)\s*(?:miles?|mi)\b").unwrap());
static MODEL_TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[\w-]+").unwrap());

// Checked in order; first hit wins.
const DAMAGE_KEYWORDS: [(&str, DamageType); 9] = [
    ("salvage", DamageType::Salvage),
    ("flood", DamageType::Flood),
    ("hail", DamageType::Hail),
    ("collision", DamageType::Collision),
    ("fire", DamageType::Fire),
    ("theft", DamageType::Theft),
    ("clean title", DamageType::Clean),
    ("rebuilt", DamageType::Rebuilt),
    ("lemon", DamageType::Lemon),
];

#[derive(Debug, Clone, PartialEq)]
pub struct TitleParts {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
}

// Whole-word make matcher compiled from the configured vocabulary.
pub struct TitleParser {
    makes: Vec<(String, Regex)>,
}

impl TitleParser {
    pub fn new(vocabulary: &Vocabulary) -> Self {
        let makes = vocabulary
            .title_makes
            .iter()
            .filter(|m| !m.trim().is_empty())
            .filter_map(|make| {
                let pattern = format!(r"(?i)\b{}\b", regex::escape(make.trim()));
                match Regex::new(&pattern) {
                    Ok(re) => Some((make.trim().to_string(), re)),
                    Err(e) => {
                        tracing::warn!(make = %make, error = %e, "Skipping unusable make in vocabulary");
                        None
                    }
                }
            })
            .collect();
        Self { makes }
    }

    pub fn parse(&self, title: &str) -> TitleParts {
        let year = YEAR_PATTERN
            .captures(title)
            .and_then(|caps| caps[1].parse::<i32>().ok());

        let mut make = None;
        let mut model = None;
        if let Some((name, m)) = self
            .makes
            .iter()
            .find_map(|(name, re)| re.find(title).map(|m| (name, m)))
        {
            make = Some(name.clone());
            let after = title[m.end()..].trim_start();
            model = MODEL_TOKEN_PATTERN.find(after).map(|t| t.as_str().to_string());
        }

        TitleParts { make, model, year }
    }
}

pub fn extract_mileage(title: &str) -> Option<u32> {
    MILEAGE_PATTERN
        .captures(title)
        .and_then(|caps| caps[1].replace(',', "").parse::<u32>().ok())
}

pub fn extract_damage_type(title: &str) -> Option<DamageType> {
    let lower = title.to_lowercase();
    DAMAGE_KEYWORDS
        .iter()
        .find(|(keyword, _)| lower.contains(keyword))
        .map(|(_, damage)| *damage)
}

fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw?).ok().map(|dt| dt.with_timezone(&Utc))
}

// Returns `None` when make, model or year cannot be derived from the title.
pub fn normalize_item(item: &ItemSummary, source: &str, parser: &TitleParser) -> Option<NewVehicle> {
    let title = item.title.trim();
    let parts = parser.parse(title);
    let (Some(make), Some(model), Some(year)) = (parts.make, parts.model, parts.year) else {
        tracing::debug!(item_id = %item.item_id, title, "Skipping item without make/model/year");
        return None;
    };

    let location = item.item_location.as_ref().and_then(|loc| {
        loc.city
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| loc.country.clone().filter(|c| !c.is_empty()))
    });

    Some(NewVehicle {
        external_id: item.item_id.clone(),
        source: source.to_string(),
        title: title.to_string(),
        make,
        model,
        year,
        vin: None, // not exposed in summary results
        mileage: extract_mileage(title),
        current_bid: item.price.as_ref().and_then(Amount::as_f64),
        buy_it_now_price: item.buy_it_now_price.as_ref().and_then(Amount::as_f64),
        damage_type: extract_damage_type(title),
        location,
        auction_date: parse_timestamp(item.listing_date.as_deref()),
        auction_end_date: parse_timestamp(item.end_date.as_deref()),
        image_urls: item
            .image
            .as_ref()
            .and_then(|img| img.image_url.clone())
            .into_iter()
            .collect(),
        auction_url: item
            .item_web_url
            .clone()
            .or_else(|| Some(format!("https://www.ebay.com/itm/{}", item.item_id))),
        is_active: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ebay::{ItemImage, ItemLocation};

    fn parser() -> TitleParser {
        TitleParser::new(&Vocabulary::default())
    }

    fn item(id: &str, title: &str) -> ItemSummary {
        ItemSummary { item_id: id.into(), title: title.into(), ..Default::default() }
    }

    #[test]
    fn test_reference_title() {
        let title = "2019 Honda Accord Hail Damage 45,000 miles";
        let parts = parser().parse(title);
        assert_eq!(parts.make.as_deref(), Some("Honda"));
        assert_eq!(parts.model.as_deref(), Some("Accord"));
        assert_eq!(parts.year, Some(2019));
        assert_eq!(extract_mileage(title), Some(45000));
        assert_eq!(extract_damage_type(title), Some(DamageType::Hail));
    }

    #[test]
    fn test_make_needs_whole_word() {
        // "Rambler" must not match "Ram"
        let parts = parser().parse("1965 Rambler Classic");
        assert_eq!(parts.make, None);
        let parts = parser().parse("2021 RAM 1500 Big Horn");
        assert_eq!(parts.make.as_deref(), Some("Ram"));
        assert_eq!(parts.model.as_deref(), Some("1500"));
    }

    #[test]
    fn test_make_priority_follows_vocabulary() {
        let parts = parser().parse("2015 Ford Escape not a Toyota");
        assert_eq!(parts.make.as_deref(), Some("Toyota"));
        assert_eq!(parts.model, None);
    }

    #[test]
    fn test_hyphenated_model() {
        let parts = parser().parse("2018 Ford F-150 XLT");
        assert_eq!(parts.model.as_deref(), Some("F-150"));
    }

    #[test]
    fn test_year_bounds() {
        assert_eq!(parser().parse("1899 Ford Model").year, None);
        assert_eq!(parser().parse("2100 Ford Model").year, None);
        assert_eq!(parser().parse("1999 Ford Ranger").year, Some(1999));
    }

    #[test]
    fn test_mileage_variants() {
        assert_eq!(extract_mileage("only 87000mi"), Some(87000));
        assert_eq!(extract_mileage("120,500 Miles clean"), Some(120500));
        assert_eq!(extract_mileage("2019 Mini Cooper"), None);
    }

    #[test]
    fn test_damage_order() {
        assert_eq!(extract_damage_type("Salvage flood car"), Some(DamageType::Salvage));
        assert_eq!(extract_damage_type("CLEAN TITLE one owner"), Some(DamageType::Clean));
        assert_eq!(extract_damage_type("clean interior"), None);
    }

    #[test]
    fn test_mystery_title_is_dropped() {
        assert!(normalize_item(&item("1", "Mystery Project Car"), "ebay", &parser()).is_none());
    }

    #[test]
    fn test_missing_year_is_dropped() {
        assert!(normalize_item(&item("1", "Honda Accord EX"), "ebay", &parser()).is_none());
    }

    #[test]
    fn test_normalize_full_item() {
        let mut summary = item("v1|555|0", "2017 Toyota Camry SE Flood 60,000 miles");
        summary.item_location = Some(ItemLocation { city: None, country: Some("US".into()) });
        summary.image = Some(ItemImage { image_url: Some("https://i.ebayimg.com/a.jpg".into()) });
        summary.listing_date = Some("2024-04-01T10:00:00.000Z".into());
        summary.end_date = Some("not a date".into());

        let vehicle = normalize_item(&summary, "ebay", &parser()).unwrap();
        assert_eq!(vehicle.make, "Toyota");
        assert_eq!(vehicle.model, "Camry");
        assert_eq!(vehicle.year, 2017);
        assert_eq!(vehicle.mileage, Some(60000));
        assert_eq!(vehicle.damage_type, Some(DamageType::Flood));
        assert_eq!(vehicle.location.as_deref(), Some("US"));
        assert_eq!(vehicle.image_urls, vec!["https://i.ebayimg.com/a.jpg".to_string()]);
        assert_eq!(vehicle.auction_url.as_deref(), Some("https://www.ebay.com/itm/v1|555|0"));
        assert!(vehicle.auction_date.is_some());
        assert!(vehicle.auction_end_date.is_none());
        assert!(vehicle.is_active);
    }
}
