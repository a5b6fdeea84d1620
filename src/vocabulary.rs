// Keyword lists used by the fallback query parser and the listing title parser.
// Overridable from config; the defaults below cover the common US auction inventory.

use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Vocabulary {
    // Makes recognized in free-text queries, in match priority order.
    pub query_makes: Vec<String>,
    // Makes recognized in marketplace listing titles (whole-word match).
    pub title_makes: Vec<String>,
    // Lowercase model names recognized in free-text queries.
    pub models: Vec<String>,
    // Lowercase US state names recognized as a location.
    pub states: Vec<String>,
    // Lowercase damage keywords recognized in free-text queries.
    pub damage_keywords: Vec<String>,
}

fn owned(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self {
            query_makes: owned(&[
                "Toyota", "Honda", "BMW", "Mercedes", "Ford", "Chevrolet", "Nissan", "Audi",
                "Lexus", "Hyundai",
            ]),
            title_makes: owned(&[
                "Toyota", "Honda", "BMW", "Mercedes", "Ford", "Chevrolet", "Nissan", "Audi",
                "Lexus", "Hyundai", "Kia", "Mazda", "Subaru", "Volkswagen", "Jeep", "Ram", "GMC",
                "Cadillac", "Buick", "Lincoln", "Acura", "Infiniti",
            ]),
            models: owned(&[
                "camry", "accord", "civic", "corolla", "altima", "f-150", "mustang", "3 series",
            ]),
            states: owned(&["texas", "california", "florida", "new york", "ohio", "illinois"]),
            damage_keywords: owned(&["hail", "flood", "clean", "minor"]),
        }
    }
}
