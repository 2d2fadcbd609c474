//! User-facing options.
//!
//! Settings are persisted one key per row in the store's settings collection.
//! Every read and every write goes through [`Settings::merged`], which clamps
//! out-of-range numbers and coerces malformed values instead of rejecting
//! them: a value that cannot be interpreted keeps the prior value for that
//! option (the default, if there is none).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;
use crate::storage::{Store, StoreTx};

pub const WORK_MINUTES: &str = "workMinutes";
pub const SHORT_BREAK_MINUTES: &str = "shortBreakMinutes";
pub const LONG_BREAK_MINUTES: &str = "longBreakMinutes";
pub const LONG_BREAK_INTERVAL: &str = "longBreakInterval";
pub const SOUND_ENABLED: &str = "soundEnabled";
pub const ALARM_SOUND: &str = "alarmSound";
pub const ACTIVE_TASK_ID: &str = "activeTaskId";
pub const POMODOROS_SINCE_LONG_BREAK: &str = "pomodorosSinceLongBreak";
pub const TOTAL_POINTS: &str = "totalPoints";
pub const THEME: &str = "theme";

/// Every option name, in display order.
pub const SETTING_KEYS: [&str; 10] = [
    THEME,
    WORK_MINUTES,
    SHORT_BREAK_MINUTES,
    LONG_BREAK_MINUTES,
    LONG_BREAK_INTERVAL,
    SOUND_ENABLED,
    ALARM_SOUND,
    ACTIVE_TASK_ID,
    POMODOROS_SINCE_LONG_BREAK,
    TOTAL_POINTS,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Midnight,
    Light,
    Ocean,
    Forest,
    Sunset,
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Midnight,
        Theme::Light,
        Theme::Ocean,
        Theme::Forest,
        Theme::Sunset,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Theme::Midnight => "midnight",
            Theme::Light => "light",
            Theme::Ocean => "ocean",
            Theme::Forest => "forest",
            Theme::Sunset => "sunset",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }
}

/// Alarm identifiers. Playing them is up to the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlarmSound {
    Beep,
    #[default]
    Chime,
    Dingdong,
    Buzz,
    Waves,
}

impl AlarmSound {
    pub const ALL: [AlarmSound; 5] = [
        AlarmSound::Beep,
        AlarmSound::Chime,
        AlarmSound::Dingdong,
        AlarmSound::Buzz,
        AlarmSound::Waves,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AlarmSound::Beep => "beep",
            AlarmSound::Chime => "chime",
            AlarmSound::Dingdong => "dingdong",
            AlarmSound::Buzz => "buzz",
            AlarmSound::Waves => "waves",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == name)
    }
}

/// Normalized settings. Every field is always within its documented range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub work_minutes: u32,
    pub short_break_minutes: u32,
    pub long_break_minutes: u32,
    pub long_break_interval: u32,
    pub sound_enabled: bool,
    pub alarm_sound: AlarmSound,
    pub active_task_id: Option<String>,
    pub pomodoros_since_long_break: u32,
    pub total_points: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Midnight,
            work_minutes: 25,
            short_break_minutes: 5,
            long_break_minutes: 15,
            long_break_interval: 4,
            sound_enabled: false,
            alarm_sound: AlarmSound::Chime,
            active_task_id: None,
            pomodoros_since_long_break: 0,
            total_points: 0,
        }
    }
}

impl Settings {
    /// Normalize raw persisted values over the defaults.
    pub fn from_raw(raw: &Map<String, Value>) -> Self {
        Self::default().merged(raw)
    }

    /// Apply `overrides` on top of `self`, normalizing each value.
    ///
    /// Unknown keys are ignored.
    pub fn merged(&self, overrides: &Map<String, Value>) -> Self {
        let mut out = self.clone();
        for (key, value) in overrides {
            match key.as_str() {
                THEME => {
                    out.theme = value
                        .as_str()
                        .and_then(Theme::from_name)
                        .unwrap_or(self.theme);
                }
                WORK_MINUTES => out.work_minutes = clamped(value, 1, 180, self.work_minutes),
                SHORT_BREAK_MINUTES => {
                    out.short_break_minutes = clamped(value, 1, 60, self.short_break_minutes);
                }
                LONG_BREAK_MINUTES => {
                    out.long_break_minutes = clamped(value, 1, 90, self.long_break_minutes);
                }
                LONG_BREAK_INTERVAL => {
                    out.long_break_interval = clamped(value, 2, 12, self.long_break_interval);
                }
                SOUND_ENABLED => out.sound_enabled = truthy(value),
                ALARM_SOUND => {
                    out.alarm_sound = match value.as_str().map(str::trim) {
                        Some("") | None => AlarmSound::default(),
                        Some(name) => AlarmSound::from_name(name).unwrap_or(self.alarm_sound),
                    };
                }
                ACTIVE_TASK_ID => {
                    out.active_task_id = match value {
                        Value::String(s) if !s.is_empty() => Some(s.clone()),
                        Value::Number(n) => Some(n.to_string()),
                        _ => None,
                    };
                }
                POMODOROS_SINCE_LONG_BREAK => {
                    out.pomodoros_since_long_break =
                        clamped(value, 0, 999_999, self.pomodoros_since_long_break);
                }
                TOTAL_POINTS => {
                    out.total_points = coerce_int(value)
                        .map(|n| n.clamp(0, 999_999_999) as u64)
                        .unwrap_or(self.total_points);
                }
                _ => tracing::warn!(%key, "ignoring unknown setting"),
            }
        }
        out
    }

    /// Normalized value of one option.
    pub fn get(&self, key: &str) -> Option<Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(mut map)) => map.remove(key),
            _ => None,
        }
    }

    /// All options as a JSON object keyed by option name.
    pub fn to_map(&self) -> Map<String, Value> {
        SETTING_KEYS
            .iter()
            .filter_map(|key| self.get(key).map(|v| (key.to_string(), v)))
            .collect()
    }

    /// Read and normalize the persisted settings inside a unit.
    pub fn load_in(tx: &StoreTx<'_>) -> Result<Self> {
        Ok(Self::from_raw(&tx.get_settings()?))
    }

    pub fn load(store: &Store) -> Result<Self> {
        Ok(Self::from_raw(&store.get_settings()?))
    }

    /// Write the normalized value of each named option.
    pub fn persist_in(&self, tx: &StoreTx<'_>, keys: &[&str]) -> Result<()> {
        for key in keys {
            if let Some(value) = self.get(key) {
                tx.set_setting(key, &value)?;
            }
        }
        Ok(())
    }

    /// Merge `patch` over the persisted settings, store the normalized values
    /// of the patched keys, and return the result. One atomic unit.
    pub fn save_patch(store: &Store, patch: &Map<String, Value>) -> Result<Self> {
        store.atomically(|tx| {
            let next = Self::load_in(tx)?.merged(patch);
            let keys: Vec<&str> = SETTING_KEYS
                .iter()
                .copied()
                .filter(|k| patch.contains_key(*k))
                .collect();
            next.persist_in(tx, &keys)?;
            tracing::debug!(?keys, "settings saved");
            Ok(next)
        })
    }
}

fn clamped(value: &Value, min: i64, max: i64, prior: u32) -> u32 {
    coerce_int(value)
        .map(|n| n.clamp(min, max) as u32)
        .unwrap_or(prior)
}

/// Integer reading of a loosely typed value: numbers are truncated, strings
/// contribute their leading integer (`"12abc"` is 12). Anything else is `None`.
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_u64().map(|u| i64::try_from(u).unwrap_or(i64::MAX)))
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => leading_int(s),
        _ => None,
    }
}

fn leading_int(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    if end == 0 {
        return None;
    }
    let magnitude = digits[..end].parse::<i64>().unwrap_or(i64::MAX);
    Some(if negative { -magnitude } else { magnitude })
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !matches!(s.trim(), "" | "false" | "0"),
        Value::Null => false,
        Value::Array(_) | Value::Object(_) => true,
    }
}
