use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    Work,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        !matches!(self, Phase::Work)
    }

    /// Short human label, as shown next to the countdown.
    pub fn label(self) -> &'static str {
        match self {
            Phase::Work => "Work",
            Phase::ShortBreak => "Break",
            Phase::LongBreak => "Long break",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Work => "work",
            Phase::ShortBreak => "shortBreak",
            Phase::LongBreak => "longBreak",
        };
        f.write_str(s)
    }
}

/// Render seconds as `MM:SS`. Minutes are not wrapped at 60.
pub fn format_mmss(total_secs: u64) -> String {
    format!("{:02}:{:02}", total_secs / 60, total_secs % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mmss() {
        assert_eq!(format_mmss(0), "00:00");
        assert_eq!(format_mmss(25 * 60), "25:00");
        assert_eq!(format_mmss(61), "01:01");
        assert_eq!(format_mmss(180 * 60), "180:00");
    }

    #[test]
    fn display_matches_serde_name() {
        for phase in [Phase::Work, Phase::ShortBreak, Phase::LongBreak] {
            let json = serde_json::to_value(phase).unwrap();
            assert_eq!(json, phase.to_string());
        }
    }
}
