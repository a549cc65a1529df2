// =============================================================================
// Time-of-day risk gate
// =============================================================================
//
// Classifies "now" into SAFE / RISKY / BLOCK from a list of UTC windows.
// Windows are matched at minute resolution, both ends inclusive. When several
// windows match, the most severe status wins and every matching event is
// reported.

use std::fmt;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NewsStatus {
    Safe,
    Risky,
    Block,
}

impl fmt::Display for NewsStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Safe => write!(f, "SAFE"),
            Self::Risky => write!(f, "RISKY"),
            Self::Block => write!(f, "BLOCK"),
        }
    }
}

/// Risk read consulted once per scoring call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewsRisk {
    pub status: NewsStatus,
    pub events: Vec<String>,
}

impl NewsRisk {
    pub fn safe() -> Self {
        Self {
            status: NewsStatus::Safe,
            events: Vec::new(),
        }
    }
}

impl Default for NewsRisk {
    fn default() -> Self {
        Self::safe()
    }
}

/// Anything that can classify the current moment.
pub trait RiskSource: Send + Sync {
    fn assess(&self, now: DateTime<Utc>) -> NewsRisk;
}

/// A UTC time-of-day window with the status it imposes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub status: NewsStatus,
    pub event: String,
}

impl RiskWindow {
    fn contains(&self, minute_of_day: u32) -> bool {
        let start = self.start.hour() * 60 + self.start.minute();
        let end = self.end.hour() * 60 + self.end.minute();
        start <= minute_of_day && minute_of_day <= end
    }
}

pub fn default_risk_windows() -> Vec<RiskWindow> {
    vec![
        RiskWindow {
            start: NaiveTime::from_hms_opt(13, 25, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(13, 40, 0).unwrap_or_default(),
            status: NewsStatus::Block,
            event: "US high-impact release window".to_string(),
        },
        RiskWindow {
            start: NaiveTime::from_hms_opt(14, 0, 0).unwrap_or_default(),
            end: NaiveTime::from_hms_opt(14, 30, 0).unwrap_or_default(),
            status: NewsStatus::Risky,
            event: "New York session open".to_string(),
        },
    ]
}

/// Stateless classifier over configured windows.
#[derive(Debug, Clone)]
pub struct RiskGate {
    windows: Vec<RiskWindow>,
}

impl RiskGate {
    pub fn new(windows: Vec<RiskWindow>) -> Self {
        Self { windows }
    }
}

impl Default for RiskGate {
    fn default() -> Self {
        Self::new(default_risk_windows())
    }
}

impl RiskSource for RiskGate {
    fn assess(&self, now: DateTime<Utc>) -> NewsRisk {
        let minute_of_day = now.hour() * 60 + now.minute();
        let matching: Vec<&RiskWindow> = self
            .windows
            .iter()
            .filter(|w| w.contains(minute_of_day))
            .collect();

        let status = matching
            .iter()
            .map(|w| w.status)
            .max()
            .unwrap_or(NewsStatus::Safe);

        NewsRisk {
            status,
            events: matching.into_iter().map(|w| w.event.clone()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 12, h, m, s).unwrap()
    }

    #[test]
    fn default_windows_classify() {
        let gate = RiskGate::default();
        assert_eq!(gate.assess(at(9, 0, 0)).status, NewsStatus::Safe);
        assert!(gate.assess(at(9, 0, 0)).events.is_empty());
        assert_eq!(gate.assess(at(13, 24, 59)).status, NewsStatus::Safe);
        assert_eq!(gate.assess(at(13, 25, 0)).status, NewsStatus::Block);
        assert_eq!(gate.assess(at(13, 40, 59)).status, NewsStatus::Block);
        assert_eq!(gate.assess(at(13, 41, 0)).status, NewsStatus::Safe);
        assert_eq!(gate.assess(at(14, 0, 0)).status, NewsStatus::Risky);
        assert_eq!(gate.assess(at(14, 30, 30)).status, NewsStatus::Risky);
        assert_eq!(gate.assess(at(14, 31, 0)).status, NewsStatus::Safe);
    }

    #[test]
    fn block_reports_event() {
        let risk = RiskGate::default().assess(at(13, 30, 0));
        assert_eq!(risk.events, vec!["US high-impact release window".to_string()]);
    }

    #[test]
    fn most_severe_overlapping_window_wins() {
        let mut windows = default_risk_windows();
        windows.push(RiskWindow {
            start: NaiveTime::from_hms_opt(13, 0, 0).unwrap(),
            end: NaiveTime::from_hms_opt(13, 59, 0).unwrap(),
            status: NewsStatus::Risky,
            event: "London fix".to_string(),
        });
        let risk = RiskGate::new(windows).assess(at(13, 30, 0));
        assert_eq!(risk.status, NewsStatus::Block);
        assert_eq!(risk.events.len(), 2);
    }

    #[test]
    fn windows_round_trip_through_config_json() {
        let json = serde_json::to_string(&default_risk_windows()).unwrap();
        assert!(json.contains("\"13:25:00\""));
        let back: Vec<RiskWindow> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, default_risk_windows());
    }
}
