//! Typed client for the habit endpoints.
//!
//! Every call goes through the [`Gateway`], so an expired token on any of
//! them ends the session the same way.

use reqwest::Method;
use serde_json::json;
use tracing::debug;

use super::{ApiError, Gateway};
use crate::models::{Activity, Analysis, Habit, HabitDraft, HabitId};

/// Habit CRUD, activity logging, history and analysis.
/// Clone is cheap - the gateway shares its connection pool.
#[derive(Clone)]
pub struct HabitApi {
    gateway: Gateway,
}

impl HabitApi {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    fn validate(draft: &HabitDraft) -> Result<(), ApiError> {
        if draft.name.trim().is_empty() {
            return Err(ApiError::Validation("Habit name is required".to_string()));
        }
        Ok(())
    }

    pub async fn list_habits(&self) -> Result<Vec<Habit>, ApiError> {
        let habits: Option<Vec<Habit>> = self.gateway.get("/habits").await?;
        let habits = habits.unwrap_or_default();
        debug!(count = habits.len(), "Fetched habits");
        Ok(habits)
    }

    pub async fn create_habit(&self, draft: &HabitDraft) -> Result<Habit, ApiError> {
        Self::validate(draft)?;
        self.gateway.post("/habits", draft).await
    }

    pub async fn update_habit(&self, id: HabitId, draft: &HabitDraft) -> Result<Habit, ApiError> {
        Self::validate(draft)?;
        self.gateway.put(&format!("/habits/{}", id), draft).await
    }

    pub async fn delete_habit(&self, id: HabitId) -> Result<(), ApiError> {
        self.gateway
            .execute::<()>(Method::DELETE, &format!("/habits/{}", id), None)
            .await
    }

    /// Record one completion of a habit now.
    pub async fn log_activity(&self, id: HabitId) -> Result<(), ApiError> {
        self.gateway
            .execute(Method::POST, &format!("/habits/{}/log", id), Some(&json!({})))
            .await
    }

    pub async fn history(&self, id: HabitId) -> Result<Vec<Activity>, ApiError> {
        let activities: Option<Vec<Activity>> =
            self.gateway.get(&format!("/habits/{}/history", id)).await?;
        Ok(activities.unwrap_or_default())
    }

    /// Totals and trends, with one zero-filled series per habit.
    pub async fn analysis(&self) -> Result<Analysis, ApiError> {
        let analysis: Analysis = self.gateway.get("/habits/analysis").await?;
        Ok(analysis.normalized())
    }
}
