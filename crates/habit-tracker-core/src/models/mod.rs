//! Data models for the habit tracker API.
//!
//! - `user`: the signed-in user's profile
//! - `habit`: habits, logged activities and the analysis summary

pub mod habit;
pub mod user;

pub use habit::{Activity, Analysis, Frequency, Habit, HabitDraft, HabitId, HabitTotals, Trends};
pub use user::UserProfile;
