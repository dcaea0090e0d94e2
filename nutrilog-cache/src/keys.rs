//! Cache keys for meal data.
//!
//! Every meal-related key shares [`MEALS_PREFIX`], so a mutation can drop all
//! of them with one `invalidate_prefix(MEALS_PREFIX)`.

use nutrilog_core::MealId;

pub use nutrilog_core::constants::MEALS_KEY_PREFIX as MEALS_PREFIX;

/// Key of the meal history list.
pub fn meal_list() -> String {
    format!("{MEALS_PREFIX}list")
}

/// Key of a single meal.
pub fn meal(id: &MealId) -> String {
    format!("{MEALS_PREFIX}{id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_meal_keys_share_prefix() {
        assert_eq!(meal_list(), "meals:list");
        assert_eq!(meal(&MealId::new("42")), "meals:42");
        assert!(meal_list().starts_with(MEALS_PREFIX));
    }
}
