use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub type HabitId = i64;

/// How often a habit is meant to be completed. Sent to the API lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl Frequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "daily",
            Frequency::Weekly => "weekly",
            Frequency::Monthly => "monthly",
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "daily" => Ok(Frequency::Daily),
            "weekly" => Ok(Frequency::Weekly),
            "monthly" => Ok(Frequency::Monthly),
            other => Err(format!(
                "unknown frequency '{}' (expected daily, weekly or monthly)",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Habit {
    pub id: HabitId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub frequency: Frequency,
    /// Current streak, computed by the server.
    #[serde(default)]
    pub streak: u32,
}

/// Body for creating or updating a habit.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct HabitDraft {
    pub name: String,
    pub description: String,
    pub frequency: Frequency,
}

impl HabitDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn frequency(mut self, frequency: Frequency) -> Self {
        self.frequency = frequency;
        self
    }
}

impl From<&Habit> for HabitDraft {
    fn from(habit: &Habit) -> Self {
        Self {
            name: habit.name.clone(),
            description: habit.description.clone().unwrap_or_default(),
            frequency: habit.frequency,
        }
    }
}

/// One logged completion of a habit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    pub id: i64,
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub completed_at: DateTime<Utc>,
}

/// Naive date-time formats accepted when a timestamp carries no offset.
const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Parse an API timestamp. RFC 3339 first; a timestamp without an offset,
/// or a bare date, is read as UTC.
fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
        .ok_or_else(|| format!("invalid timestamp '{}'", raw))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HabitTotals {
    pub id: HabitId,
    pub name: String,
    #[serde(default)]
    pub total_activities: u32,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Trends {
    pub labels: Vec<String>,
    #[serde(default)]
    pub data: HashMap<HabitId, Vec<u32>>,
}

/// Per-habit totals plus activity counts over time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub habits: Vec<HabitTotals>,
    #[serde(default)]
    pub trends: Trends,
}

impl Analysis {
    /// Give every listed habit exactly one count per trend label.
    ///
    /// Habits without a series get zeros; short series are zero-padded and
    /// long ones cut to the label count. Series for habits not listed are
    /// dropped.
    pub fn normalized(mut self) -> Self {
        let len = self.trends.labels.len();
        let mut data = HashMap::with_capacity(self.habits.len());
        for habit in &self.habits {
            let mut series = self.trends.data.remove(&habit.id).unwrap_or_default();
            series.resize(len, 0);
            data.insert(habit.id, series);
        }
        self.trends.data = data;
        self
    }

    /// Trend series for one habit.
    pub fn series(&self, id: HabitId) -> &[u32] {
        self.trends.data.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_parse_is_case_insensitive() {
        assert_eq!("Daily".parse::<Frequency>(), Ok(Frequency::Daily));
        assert_eq!(" WEEKLY ".parse::<Frequency>(), Ok(Frequency::Weekly));
        assert!("hourly".parse::<Frequency>().is_err());
    }

    #[test]
    fn test_draft_serializes_lowercase_frequency() {
        let draft = HabitDraft::new("Read")
            .description("20 pages")
            .frequency(Frequency::Weekly);
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"name": "Read", "description": "20 pages", "frequency": "weekly"})
        );
    }

    #[test]
    fn test_habit_parses_with_missing_optional_fields() {
        let habit: Habit = serde_json::from_str(r#"{"id": 3, "name": "Stretch"}"#).unwrap();
        assert_eq!(habit.description, None);
        assert_eq!(habit.frequency, Frequency::Daily);
        assert_eq!(habit.streak, 0);
    }

    #[test]
    fn test_analysis_normalized_fills_and_resizes_series() {
        let json = r#"{
            "habits": [
                {"id": 1, "name": "Run", "total_activities": 4},
                {"id": 2, "name": "Read", "total_activities": 0},
                {"id": 3, "name": "Swim", "total_activities": 9}
            ],
            "trends": {
                "labels": ["Mon", "Tue", "Wed"],
                "data": {"1": [1, 2, 1], "3": [5, 4, 0, 7], "99": [1, 1, 1]}
            }
        }"#;
        let analysis: Analysis = serde_json::from_str(json).unwrap();
        let analysis = analysis.normalized();

        assert_eq!(analysis.series(1), &[1, 2, 1]);
        assert_eq!(analysis.series(2), &[0, 0, 0]);
        assert_eq!(analysis.series(3), &[5, 4, 0]);
        assert!(analysis.series(99).is_empty());
        assert_eq!(analysis.trends.data.len(), 3);
    }

    #[test]
    fn test_activity_parses_rfc3339() {
        let activity: Activity =
            serde_json::from_str(r#"{"id": 7, "completed_at": "2024-03-01T08:30:00Z"}"#).unwrap();
        assert_eq!(activity.completed_at.to_rfc3339(), "2024-03-01T08:30:00+00:00");

        let offset: Activity =
            serde_json::from_str(r#"{"id": 8, "completed_at": "2024-03-01T10:30:00+02:00"}"#).unwrap();
        assert_eq!(offset.completed_at, activity.completed_at);
    }

    #[test]
    fn test_activity_parses_timestamp_without_offset_as_utc() {
        let activity: Activity =
            serde_json::from_str(r#"{"id": 7, "completed_at": "2024-03-01T08:30:00.123456"}"#).unwrap();
        assert_eq!(activity.completed_at.to_rfc3339(), "2024-03-01T08:30:00.123456+00:00");

        let spaced = parse_timestamp("2024-03-01 08:30:00").unwrap();
        assert_eq!(spaced.to_rfc3339(), "2024-03-01T08:30:00+00:00");

        let date_only = parse_timestamp("2024-03-01").unwrap();
        assert_eq!(date_only.to_rfc3339(), "2024-03-01T00:00:00+00:00");
    }

    #[test]
    fn test_activity_rejects_garbage_timestamp() {
        let result = serde_json::from_str::<Activity>(r#"{"id": 7, "completed_at": "yesterday"}"#);
        assert!(result.is_err());
    }
}
