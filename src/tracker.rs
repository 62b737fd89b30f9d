//! Debounced up/down tracking per endpoint.
//!
//! Every probe result goes through [`HealthTracker::evaluate`], which updates
//! the raw status unconditionally and only produces a [`Notification`] on an
//! edge (UP→DOWN, DOWN→UP), or on a reminder when the endpoint's
//! [`AlertPolicy`] asks for one.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use tracing::{error, info, warn};

use crate::config::AlertPolicy;
use crate::models::{Downtime, EndpointState, Notification, NotificationKind, Target};

#[derive(Debug)]
struct Slot {
    state: EndpointState,
    policy: AlertPolicy,
}

#[derive(Debug)]
pub struct HealthTracker {
    endpoints: BTreeMap<String, Slot>,
}

impl HealthTracker {
    pub fn new<I, S>(endpoints: I) -> Self
    where
        I: IntoIterator<Item = (S, AlertPolicy)>,
        S: Into<String>,
    {
        let endpoints = endpoints
            .into_iter()
            .map(|(name, policy)| {
                let name = name.into();
                (name.clone(), Slot { state: EndpointState::new(name), policy })
            })
            .collect();
        Self { endpoints }
    }

    pub fn from_targets(targets: &[Target]) -> Self {
        Self::new(targets.iter().map(|t| (t.name.clone(), t.policy)))
    }

    /// Applies one raw probe result observed at `now`.
    pub fn evaluate(&mut self, endpoint: &str, raw_up: bool, now: DateTime<Utc>) -> Option<Notification> {
        let Some(slot) = self.endpoints.get_mut(endpoint) else {
            warn!(%endpoint, "probe result for unknown endpoint ignored");
            return None;
        };
        let policy = slot.policy;
        let state = &mut slot.state;

        state.last_observed_up = raw_up;
        state.last_checked = Some(now);

        let kind = if raw_up {
            if !state.is_down {
                return None;
            }
            let since = state.down_since.take().unwrap_or(now);
            let elapsed = (now - since).max(chrono::Duration::zero());
            state.is_down = false;
            state.repeat_alerts_sent = 0;

            let downtime = Downtime::between(since, now);
            warn!("[CHANGE] {} -> {:?} after {}", state.name, state.status(), downtime);

            if let Some(min) = policy.min_recovery_notice() {
                if elapsed < min {
                    info!(
                        endpoint = %state.name,
                        downtime_secs = downtime.total_seconds(),
                        "recovered below notice threshold, not announcing"
                    );
                    return None;
                }
            }
            NotificationKind::Recovered { downtime }
        } else if !state.is_down {
            state.is_down = true;
            state.down_since = Some(now);
            state.repeat_alerts_sent = 0;
            error!("[CHANGE] {} -> {:?}", state.name, state.status());
            NotificationKind::Down
        } else {
            let threshold = policy.repeat_down_after()?;
            let since = state.down_since?;
            let elapsed = (now - since).max(chrono::Duration::zero());
            let crossings = elapsed.num_milliseconds() / threshold.num_milliseconds();
            if crossings <= i64::from(state.repeat_alerts_sent) {
                return None;
            }
            state.repeat_alerts_sent = u32::try_from(crossings).unwrap_or(u32::MAX);
            let downtime = Downtime::between(since, now);
            warn!(endpoint = %state.name, %downtime, reminder = state.repeat_alerts_sent, "still down");
            NotificationKind::StillDown { downtime }
        };

        Some(Notification { endpoint: state.name.clone(), kind })
    }

    /// Latest raw probe result per endpoint; never-probed endpoints read `false`.
    pub fn snapshot(&self) -> BTreeMap<String, bool> {
        self.endpoints
            .iter()
            .map(|(name, slot)| (name.clone(), slot.state.last_observed_up))
            .collect()
    }

    pub fn state(&self, endpoint: &str) -> Option<&EndpointState> {
        self.endpoints.get(endpoint).map(|slot| &slot.state)
    }

    pub fn states(&self) -> Vec<EndpointState> {
        self.endpoints.values().map(|slot| slot.state.clone()).collect()
    }
}
