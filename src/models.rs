use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::config::AlertPolicy;

pub const BUGTRACKER: &str = "Bugtracker";
pub const OCTADESK: &str = "Octadesk";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Up,
    Down,
}

/// A monitored endpoint as the prober sees it.
#[derive(Debug, Clone)]
pub struct Target {
    pub name: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub timeout: Duration,
    pub policy: AlertPolicy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    pub name: String,
    /// Debounced status; only flips on the first probe that disagrees.
    pub is_down: bool,
    /// Set exactly while `is_down` is true.
    pub down_since: Option<DateTime<Utc>>,
    /// Raw result of the latest probe.
    pub last_observed_up: bool,
    pub last_checked: Option<DateTime<Utc>>,
    pub repeat_alerts_sent: u32,
}

impl EndpointState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_down: false,
            down_since: None,
            last_observed_up: false,
            last_checked: None,
            repeat_alerts_sent: 0,
        }
    }

    pub fn status(&self) -> Status {
        if self.is_down { Status::Down } else { Status::Up }
    }
}

/// Elapsed outage time, truncated to whole seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Downtime {
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
}

impl Downtime {
    pub fn between(since: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        Self::from_millis((now - since).num_milliseconds())
    }

    pub fn from_millis(millis: i64) -> Self {
        let millis = millis.max(0);
        Self {
            hours: millis / 3_600_000,
            minutes: (millis % 3_600_000) / 60_000,
            seconds: (millis % 60_000) / 1_000,
        }
    }

    pub fn total_seconds(&self) -> i64 {
        self.hours * 3600 + self.minutes * 60 + self.seconds
    }
}

impl fmt::Display for Downtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} horas, {} minutos e {} segundos", self.hours, self.minutes, self.seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Down,
    StillDown { downtime: Downtime },
    Recovered { downtime: Downtime },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub endpoint: String,
    pub kind: NotificationKind,
}

impl Notification {
    /// Chat text, Discord markdown.
    pub fn message(&self) -> String {
        match &self.kind {
            NotificationKind::Down => {
                format!("🚨 **API {} está fora do ar!** @everyone", self.endpoint)
            }
            NotificationKind::StillDown { downtime } => format!(
                "⚠️ **API {} continua fora do ar!** Inativa há {} @everyone",
                self.endpoint, downtime
            ),
            NotificationKind::Recovered { downtime } => format!(
                "✅ **API {} está online novamente!** Ela ficou inativa por {}",
                self.endpoint, downtime
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn downtime_truncates_each_unit() {
        // 1h 2m 3.999s
        let d = Downtime::from_millis(3_600_000 + 120_000 + 3_999);
        assert_eq!(d, Downtime { hours: 1, minutes: 2, seconds: 3 });
        assert_eq!(d.to_string(), "1 horas, 2 minutos e 3 segundos");
    }

    #[test]
    fn downtime_never_negative() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let later = now + chrono::Duration::seconds(30);
        let d = Downtime::between(later, now);
        assert_eq!(d.total_seconds(), 0);
    }

    #[test]
    fn downtime_spans_more_than_a_day() {
        let d = Downtime::from_millis(26 * 3_600_000 + 59_000);
        assert_eq!(d.to_string(), "26 horas, 0 minutos e 59 segundos");
    }

    #[test]
    fn messages_mention_endpoint() {
        let down = Notification { endpoint: BUGTRACKER.into(), kind: NotificationKind::Down };
        assert_eq!(down.message(), "🚨 **API Bugtracker está fora do ar!** @everyone");

        let up = Notification {
            endpoint: OCTADESK.into(),
            kind: NotificationKind::Recovered { downtime: Downtime::from_millis(5_000) },
        };
        assert_eq!(
            up.message(),
            "✅ **API Octadesk está online novamente!** Ela ficou inativa por 0 horas, 0 minutos e 5 segundos"
        );
    }

    #[test]
    fn fresh_state_is_up() {
        let state = EndpointState::new(OCTADESK);
        assert_eq!(state.status(), Status::Up);
        assert!(state.down_since.is_none());
        assert!(!state.last_observed_up);
    }
}
