//! Remote meal API collaborator.
//!
//! Every operation returns `Result<_, FetchError>` so it can be handed to a
//! fetch coordinator as-is. The transport (HTTP client, auth) lives outside
//! this workspace; [`InMemoryMealApi`] stands in for it in tests and the
//! demo binary.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::FetchError;
use crate::meal::{Meal, MealFeedback, MealId};

#[async_trait]
pub trait MealApi: Send + Sync {
    /// List the user's meal history, newest first.
    async fn list_meals(&self) -> Result<Vec<Meal>, FetchError>;

    /// Flip the favorite flag and return the updated meal.
    async fn toggle_favorite(&self, id: &MealId) -> Result<Meal, FetchError>;

    /// Log a copy of an existing meal as a new entry.
    async fn duplicate_meal(&self, id: &MealId) -> Result<Meal, FetchError>;

    async fn update_meal(&self, meal: &Meal) -> Result<Meal, FetchError>;

    async fn save_feedback(&self, id: &MealId, feedback: &MealFeedback) -> Result<(), FetchError>;
}

/// In-memory meal API with injectable transient failures.
///
/// Uses tokio::sync::RwLock for safe async access.
#[derive(Debug, Default)]
pub struct InMemoryMealApi {
    meals: RwLock<Vec<Meal>>,
    feedback: RwLock<Vec<(MealId, MealFeedback)>>,
    /// Number of upcoming calls that fail with a transient error.
    fail_next: AtomicU32,
    calls: AtomicU64,
}

impl InMemoryMealApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_meals(meals: Vec<Meal>) -> Self {
        Self {
            meals: RwLock::new(meals),
            ..Default::default()
        }
    }

    /// Make the next `count` calls fail with a transient error.
    pub fn fail_next(&self, count: u32) {
        self.fail_next.store(count, Ordering::SeqCst);
    }

    /// Total calls received, including injected failures.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn feedback_for(&self, id: &MealId) -> Vec<MealFeedback> {
        self.feedback
            .read()
            .await
            .iter()
            .filter(|(meal_id, _)| meal_id == id)
            .map(|(_, feedback)| feedback.clone())
            .collect()
    }

    fn enter(&self) -> Result<(), FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(FetchError::transient("503 service unavailable")),
            Err(_) => Ok(()),
        }
    }
}

fn not_found(id: &MealId) -> FetchError {
    FetchError::permanent(format!("meal {} not found", id))
}

#[async_trait]
impl MealApi for InMemoryMealApi {
    async fn list_meals(&self) -> Result<Vec<Meal>, FetchError> {
        self.enter()?;
        let mut meals = self.meals.read().await.clone();
        meals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(meals)
    }

    async fn toggle_favorite(&self, id: &MealId) -> Result<Meal, FetchError> {
        self.enter()?;
        let mut meals = self.meals.write().await;
        let meal = meals
            .iter_mut()
            .find(|m| &m.id == id)
            .ok_or_else(|| not_found(id))?;
        meal.is_favorite = !meal.is_favorite;
        Ok(meal.clone())
    }

    async fn duplicate_meal(&self, id: &MealId) -> Result<Meal, FetchError> {
        self.enter()?;
        let mut meals = self.meals.write().await;
        let original = meals
            .iter()
            .find(|m| &m.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))?;
        let copy = Meal {
            id: MealId::new(Uuid::now_v7().to_string()),
            is_favorite: false,
            created_at: Utc::now(),
            ..original
        };
        meals.push(copy.clone());
        Ok(copy)
    }

    async fn update_meal(&self, meal: &Meal) -> Result<Meal, FetchError> {
        self.enter()?;
        let mut meals = self.meals.write().await;
        let slot = meals
            .iter_mut()
            .find(|m| m.id == meal.id)
            .ok_or_else(|| not_found(&meal.id))?;
        *slot = meal.clone();
        Ok(meal.clone())
    }

    async fn save_feedback(&self, id: &MealId, feedback: &MealFeedback) -> Result<(), FetchError> {
        self.enter()?;
        if !(1..=5).contains(&feedback.rating) {
            return Err(FetchError::permanent(format!(
                "rating must be between 1 and 5, got {}",
                feedback.rating
            )));
        }
        if !self.meals.read().await.iter().any(|m| &m.id == id) {
            return Err(not_found(id));
        }
        self.feedback.write().await.push((id.clone(), feedback.clone()));
        Ok(())
    }
}
