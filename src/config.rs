//! Application-level configuration loading: event slots, timing windows, and
//! the daily rotation size.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use serde_with::serde_as;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TRIVIA_LIVE_CONFIG_PATH";

/// Wall-clock slot (UTC) at which a daily event starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventSlot {
    /// Hour of day, 0-23.
    pub hour: u8,
    /// Minute of hour, 0-59.
    pub minute: u8,
}

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    event_slots: Vec<EventSlot>,
    event_duration: Duration,
    question_time_limit: Duration,
    answer_buffer: Duration,
    inter_question_delay: Duration,
    questions_per_quiz: usize,
    themes: Vec<String>,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in
    /// defaults when the file is missing or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(
                        path = %path.display(),
                        slots = config.event_slots.len(),
                        "loaded event schedule from config"
                    );
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Daily event start slots, UTC.
    pub fn event_slots(&self) -> &[EventSlot] {
        &self.event_slots
    }

    /// Length of each event window.
    pub fn event_duration(&self) -> Duration {
        self.event_duration
    }

    /// Time participants have to answer a question.
    pub fn question_time_limit(&self) -> Duration {
        self.question_time_limit
    }

    /// Grace added to the question timeout to absorb client latency.
    pub fn answer_buffer(&self) -> Duration {
        self.answer_buffer
    }

    /// Full window between `question-started` and the timeout firing.
    pub fn question_window(&self) -> Duration {
        self.question_time_limit + self.answer_buffer
    }

    /// Pause between `question-ended` and the next `question-started`.
    pub fn inter_question_delay(&self) -> Duration {
        self.inter_question_delay
    }

    /// How many questions are rotated into each daily quiz.
    pub fn questions_per_quiz(&self) -> usize {
        self.questions_per_quiz
    }

    /// Theme for the given day, rotating through the configured list.
    pub fn theme_for_day(&self, ordinal: usize) -> &str {
        &self.themes[ordinal % self.themes.len()]
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            event_slots: vec![
                EventSlot { hour: 9, minute: 0 },
                EventSlot {
                    hour: 15,
                    minute: 0,
                },
                EventSlot {
                    hour: 21,
                    minute: 0,
                },
            ],
            event_duration: Duration::from_secs(30 * 60),
            question_time_limit: Duration::from_secs(15),
            answer_buffer: Duration::from_secs(1),
            inter_question_delay: Duration::from_secs(3),
            questions_per_quiz: 10,
            themes: default_themes(),
        }
    }
}

fn default_themes() -> Vec<String> {
    [
        "General Knowledge",
        "Science & Nature",
        "History",
        "Geography",
        "Arts & Literature",
        "Sports",
        "Film & Television",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[serde_as]
#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file.
struct RawConfig {
    #[serde(default)]
    event_slots: Vec<RawSlot>,
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    #[serde(default)]
    event_duration_ms: Option<Duration>,
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    #[serde(default)]
    question_time_limit_ms: Option<Duration>,
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    #[serde(default)]
    answer_buffer_ms: Option<Duration>,
    #[serde_as(as = "Option<serde_with::DurationMilliSeconds<u64>>")]
    #[serde(default)]
    inter_question_delay_ms: Option<Duration>,
    #[serde(default)]
    questions_per_quiz: Option<usize>,
    #[serde(default)]
    themes: Vec<String>,
}

#[derive(Debug, Deserialize)]
/// JSON representation of a single start slot.
struct RawSlot {
    hour: u8,
    minute: u8,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = AppConfig::default();

        let mut event_slots: Vec<EventSlot> = raw
            .event_slots
            .into_iter()
            .filter(|slot| slot.hour < 24 && slot.minute < 60)
            .map(|slot| EventSlot {
                hour: slot.hour,
                minute: slot.minute,
            })
            .collect();
        if event_slots.is_empty() {
            event_slots = defaults.event_slots.clone();
        }

        let themes = if raw.themes.is_empty() {
            defaults.themes.clone()
        } else {
            raw.themes
        };

        let questions_per_quiz = match raw.questions_per_quiz {
            Some(count) if count > 0 => count,
            _ => defaults.questions_per_quiz,
        };

        Self {
            event_slots,
            event_duration: raw.event_duration_ms.unwrap_or(defaults.event_duration),
            question_time_limit: raw
                .question_time_limit_ms
                .unwrap_or(defaults.question_time_limit),
            answer_buffer: raw.answer_buffer_ms.unwrap_or(defaults.answer_buffer),
            inter_question_delay: raw
                .inter_question_delay_ms
                .unwrap_or(defaults.inter_question_delay),
            questions_per_quiz,
            themes,
        }
    }
}

fn resolve_config_path() -> PathBuf {
    env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}
