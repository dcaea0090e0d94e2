//! Meal model with field-name normalization at the API boundary.
//!
//! The nutrition backend has shipped several payload shapes over time
//! (`protein` vs `protein_g`, `imageUrl` vs `image_url`, numeric vs string
//! ids). [`Meal`] accepts all of them on deserialization and exposes a
//! single naming to the rest of the app.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Server-assigned meal identifier.
///
/// Always held as a string; numeric ids from older endpoints are converted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MealId(String);

impl MealId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MealId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for MealId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Text(String),
            Signed(i64),
            Unsigned(u64),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Text(s) => MealId(s),
            RawId::Signed(n) => MealId(n.to_string()),
            RawId::Unsigned(n) => MealId(n.to_string()),
        })
    }
}

/// A logged meal, normalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawMeal")]
pub struct Meal {
    pub id: MealId,
    pub name: String,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub image_url: Option<String>,
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

/// User feedback on a meal analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MealFeedback {
    /// 1 (poor) to 5 (accurate).
    pub rating: u8,
    #[serde(default)]
    pub comment: Option<String>,
}

/// Every spelling the backend has used. Canonical names win when both appear.
#[derive(Deserialize)]
struct RawMeal {
    id: MealId,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    calories: Option<f64>,
    #[serde(default)]
    calories_kcal: Option<f64>,
    #[serde(default)]
    protein_g: Option<f64>,
    #[serde(default)]
    protein: Option<f64>,
    #[serde(default)]
    carbs_g: Option<f64>,
    #[serde(default)]
    carbs: Option<f64>,
    #[serde(default)]
    carbohydrates: Option<f64>,
    #[serde(default)]
    fat_g: Option<f64>,
    #[serde(default)]
    fat: Option<f64>,
    #[serde(default)]
    image_url: Option<String>,
    #[serde(default, rename = "imageUrl")]
    image_url_camel: Option<String>,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    is_favorite: Option<bool>,
    #[serde(default, rename = "isFavorite")]
    is_favorite_camel: Option<bool>,
    #[serde(default)]
    favorite: Option<bool>,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(default, rename = "createdAt")]
    created_at_camel: Option<DateTime<Utc>>,
    #[serde(default)]
    logged_at: Option<DateTime<Utc>>,
}

impl From<RawMeal> for Meal {
    fn from(raw: RawMeal) -> Self {
        Meal {
            id: raw.id,
            name: raw.name.or(raw.title).unwrap_or_default(),
            calories: raw.calories.or(raw.calories_kcal).unwrap_or(0.0),
            protein_g: raw.protein_g.or(raw.protein).unwrap_or(0.0),
            carbs_g: raw
                .carbs_g
                .or(raw.carbs)
                .or(raw.carbohydrates)
                .unwrap_or(0.0),
            fat_g: raw.fat_g.or(raw.fat).unwrap_or(0.0),
            image_url: raw.image_url.or(raw.image_url_camel).or(raw.image),
            is_favorite: raw
                .is_favorite
                .or(raw.is_favorite_camel)
                .or(raw.favorite)
                .unwrap_or(false),
            created_at: raw
                .created_at
                .or(raw.created_at_camel)
                .or(raw.logged_at)
                .unwrap_or(DateTime::UNIX_EPOCH),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_payload() {
        let meal: Meal = serde_json::from_value(json!({
            "id": "m-1",
            "name": "Oatmeal",
            "calories": 320.0,
            "protein_g": 12.0,
            "carbs_g": 54.0,
            "fat_g": 6.5,
            "image_url": "https://cdn.example/oat.jpg",
            "is_favorite": true,
            "created_at": "2024-01-01T08:00:00Z"
        }))
        .expect("canonical payload should parse");

        assert_eq!(meal.id.as_str(), "m-1");
        assert_eq!(meal.protein_g, 12.0);
        assert!(meal.is_favorite);
        assert_eq!(meal.image_url.as_deref(), Some("https://cdn.example/oat.jpg"));
    }

    #[test]
    fn test_legacy_payload_is_normalized() {
        let meal: Meal = serde_json::from_value(json!({
            "id": 42,
            "title": "Burrito",
            "calories_kcal": 710,
            "protein": 31,
            "carbohydrates": 80,
            "fat": 24,
            "imageUrl": "https://cdn.example/burrito.jpg",
            "favorite": false,
            "createdAt": "2024-02-03T12:30:00Z"
        }))
        .expect("legacy payload should parse");

        assert_eq!(meal.id, MealId::new("42"));
        assert_eq!(meal.name, "Burrito");
        assert_eq!(meal.calories, 710.0);
        assert_eq!(meal.protein_g, 31.0);
        assert_eq!(meal.carbs_g, 80.0);
        assert_eq!(meal.fat_g, 24.0);
        assert_eq!(meal.image_url.as_deref(), Some("https://cdn.example/burrito.jpg"));
        assert!(!meal.is_favorite);
    }

    #[test]
    fn test_canonical_name_wins_over_legacy() {
        let meal: Meal = serde_json::from_value(json!({
            "id": "m-2",
            "protein": 5,
            "protein_g": 9,
            "created_at": "2024-02-03T12:30:00Z"
        }))
        .expect("mixed payload should parse");
        assert_eq!(meal.protein_g, 9.0);
    }

    #[test]
    fn test_missing_macros_default_to_zero() {
        let meal: Meal = serde_json::from_value(json!({ "id": "m-3", "protein": null }))
            .expect("sparse payload should parse");
        assert_eq!(meal.protein_g, 0.0);
        assert_eq!(meal.fat_g, 0.0);
        assert_eq!(meal.image_url, None);
        assert_eq!(meal.created_at, DateTime::UNIX_EPOCH);
    }

    proptest::proptest! {
        #[test]
        fn prop_legacy_and_canonical_shapes_agree(
            id in proptest::num::i64::ANY,
            protein in 0.0f64..500.0,
            carbs in 0.0f64..500.0,
            fat in 0.0f64..500.0,
        ) {
            let legacy: Meal = serde_json::from_value(json!({
                "id": id, "protein": protein, "carbs": carbs, "fat": fat
            })).expect("legacy payload should parse");
            let canonical: Meal = serde_json::from_value(json!({
                "id": id.to_string(), "protein_g": protein, "carbs_g": carbs, "fat_g": fat
            })).expect("canonical payload should parse");
            proptest::prop_assert_eq!(legacy, canonical);
        }
    }

    #[test]
    fn test_serializes_canonical_names() {
        let meal: Meal = serde_json::from_value(json!({ "id": 7, "protein": 3 }))
            .expect("payload should parse");
        let value = serde_json::to_value(&meal).expect("meal should serialize");
        assert_eq!(value["id"], json!("7"));
        assert_eq!(value["protein_g"], json!(3.0));
        assert!(value.get("protein").is_none());
    }
}
