//! Read-only view of the journal entry an enrichment is generated for.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::job::EntryId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SleepQuality {
    Excellent,
    Good,
    Fair,
    Poor,
    Terrible,
}

impl SleepQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepQuality::Excellent => "EXCELLENT",
            SleepQuality::Good => "GOOD",
            SleepQuality::Fair => "FAIR",
            SleepQuality::Poor => "POOR",
            SleepQuality::Terrible => "TERRIBLE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mood {
    Happy,
    Calm,
    Anxious,
    Sad,
    Stressed,
    Excited,
    Tired,
    Confused,
    Refreshed,
}

impl Mood {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mood::Happy => "HAPPY",
            Mood::Calm => "CALM",
            Mood::Anxious => "ANXIOUS",
            Mood::Sad => "SAD",
            Mood::Stressed => "STRESSED",
            Mood::Excited => "EXCITED",
            Mood::Tired => "TIRED",
            Mood::Confused => "CONFUSED",
            Mood::Refreshed => "REFRESHED",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DreamType {
    #[default]
    Normal,
    Lucid,
    Nightmare,
    Recurring,
    Prophetic,
}

impl DreamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DreamType::Normal => "NORMAL",
            DreamType::Lucid => "LUCID",
            DreamType::Nightmare => "NIGHTMARE",
            DreamType::Recurring => "RECURRING",
            DreamType::Prophetic => "PROPHETIC",
        }
    }
}

/// A journal entry as seen by the enrichment pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: EntryId,
    pub title: String,
    pub content: String,
    pub dream_date: Option<NaiveDate>,
    #[serde(default)]
    pub sleep_quality: Option<SleepQuality>,
    #[serde(default)]
    pub mood_before_sleep: Option<Mood>,
    #[serde(default)]
    pub mood_after_wake: Option<Mood>,
    #[serde(default)]
    pub dream_type: Option<DreamType>,
    /// Vividness on a 1-10 scale.
    #[serde(default)]
    pub vividness: Option<u8>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl JournalEntry {
    /// An entry with only the required fields set.
    pub fn new(id: i64, title: &str, content: &str) -> Self {
        Self {
            id: EntryId::new(id),
            title: title.to_string(),
            content: content.to_string(),
            dream_date: None,
            sleep_quality: None,
            mood_before_sleep: None,
            mood_after_wake: None,
            dream_type: None,
            vividness: None,
            tags: Vec::new(),
        }
    }
}
