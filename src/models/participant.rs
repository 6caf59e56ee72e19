//! # Participant State
//!
//! Execution state for a named task performer. Participants are created on
//! first reference and are never deleted; disabling is a soft state.

use serde::Serialize;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantActivity {
    Idle,
    Busy,
}

#[derive(Debug, Clone)]
pub struct ParticipantState {
    pub name: String,
    pub enabled: bool,
    pub suspended: bool,
    pub activity: ParticipantActivity,
    pub last_utilisation: Option<Instant>,
    pub queue_size_max: usize,
    pub offload_threshold: usize,
    pub onload_threshold: usize,
    /// Tasks for this participant currently parked in the offload store
    pub offloaded_count: usize,
}

impl ParticipantState {
    pub fn new(
        name: impl Into<String>,
        queue_size_max: usize,
        offload_threshold: usize,
        onload_threshold: usize,
    ) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            suspended: false,
            activity: ParticipantActivity::Idle,
            last_utilisation: None,
            queue_size_max,
            offload_threshold,
            onload_threshold,
            offloaded_count: 0,
        }
    }

    pub fn is_idle(&self) -> bool {
        self.activity == ParticipantActivity::Idle
    }

    pub fn is_disabled(&self) -> bool {
        !self.enabled
    }

    pub fn mark_busy(&mut self) {
        self.activity = ParticipantActivity::Busy;
        self.last_utilisation = Some(Instant::now());
    }

    pub fn mark_idle(&mut self) {
        self.activity = ParticipantActivity::Idle;
        self.last_utilisation = Some(Instant::now());
    }

    /// Whether `retry_delay` has passed since this participant was last utilised
    pub fn retry_delay_elapsed(&self, retry_delay: Duration) -> bool {
        self.retry_delay_remaining(retry_delay).is_zero()
    }

    pub fn retry_delay_remaining(&self, retry_delay: Duration) -> Duration {
        self.last_utilisation
            .map(|instant| retry_delay.saturating_sub(instant.elapsed()))
            .unwrap_or(Duration::ZERO)
    }
}

/// Point-in-time copy of a participant's state, including its queue length
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantSnapshot {
    pub name: String,
    pub enabled: bool,
    pub suspended: bool,
    pub activity: ParticipantActivity,
    pub queue_size: usize,
    pub queue_size_max: usize,
    pub offload_threshold: usize,
    pub onload_threshold: usize,
    pub offloaded_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_participant_is_enabled_and_idle() {
        let state = ParticipantState::new("p", 500, 400, 200);
        assert!(state.is_idle());
        assert!(!state.is_disabled());
        assert!(!state.suspended);
        assert!(state.retry_delay_elapsed(Duration::from_secs(3600)));
    }

    #[test]
    fn test_retry_delay_tracks_last_utilisation() {
        let mut state = ParticipantState::new("p", 500, 400, 200);
        state.mark_busy();
        assert!(!state.retry_delay_elapsed(Duration::from_secs(3600)));
        assert!(state.retry_delay_elapsed(Duration::ZERO));

        let remaining = state.retry_delay_remaining(Duration::from_secs(3600));
        assert!(remaining > Duration::from_secs(3590));
        assert_eq!(state.retry_delay_remaining(Duration::ZERO), Duration::ZERO);
    }
}
