//! Experience state machine.
//!
//! A thin consumer of the motion controller: it decides which sequence to
//! play next as presence comes and goes, and reacts to playback
//! completion. Invalid triggers for the current state are ignored.

use std::collections::BTreeSet;

use rand::seq::IndexedRandom;
use tokio::sync::mpsc;

use crate::config::ExperienceSettings;
use crate::motion::MotionController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceState {
    Idle,
    Activating,
    Active,
    Deactivating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperienceEvent {
    /// A user arrived in front of the head.
    PresenceDetected,
    /// The last user left.
    PresenceLost,
    /// The controller reported all instruction sequences complete.
    SequenceComplete,
}

/// The transition table. `None` means the trigger is ignored in that
/// state.
pub fn transition(state: ExperienceState, event: ExperienceEvent) -> Option<ExperienceState> {
    use ExperienceEvent::*;
    use ExperienceState::*;
    match (state, event) {
        (Idle, PresenceDetected) => Some(Activating),
        (Idle, SequenceComplete) => Some(Idle),
        (Activating, SequenceComplete) => Some(Active),
        (Activating, PresenceLost) => Some(Deactivating),
        (Active, PresenceLost) => Some(Deactivating),
        (Active, SequenceComplete) => Some(Deactivating),
        (Deactivating, PresenceDetected) => Some(Activating),
        (Deactivating, SequenceComplete) => Some(Idle),
        _ => None,
    }
}

pub struct ExperienceController {
    controller: MotionController,
    settings: ExperienceSettings,
    state: ExperienceState,
}

impl ExperienceController {
    pub fn new(controller: MotionController, settings: ExperienceSettings) -> Self {
        Self {
            controller,
            settings,
            state: ExperienceState::Idle,
        }
    }

    pub fn state(&self) -> ExperienceState {
        self.state
    }

    /// Kicks the experience off in idle and drives it from the event
    /// stream until the stream closes.
    pub async fn run(mut self, mut events: mpsc::UnboundedReceiver<ExperienceEvent>) {
        self.play_state_sequence().await;
        while let Some(event) = events.recv().await {
            self.handle_event(event).await;
        }
        tracing::info!("experience event stream closed, stopping playback");
        self.controller.stop_all().await;
    }

    pub async fn handle_event(&mut self, event: ExperienceEvent) {
        let Some(next) = transition(self.state, event) else {
            tracing::debug!(state = ?self.state, ?event, "ignoring trigger");
            return;
        };
        tracing::info!(from = ?self.state, to = ?next, ?event, "experience transition");
        self.state = next;
        self.play_state_sequence().await;
    }

    /// Prepares a sequence for the current state, stops what is still
    /// playing, then executes. The next handle is registered before the old
    /// ones are stopped, so draining the replaced handles' completions
    /// never empties the registry and can't surface a completion for a
    /// sequence this transition cut short. A failed or unconfigured
    /// sequence is skipped with a warning; completion then comes from the
    /// stopped handles (or immediately, with nothing registered), so the
    /// loop keeps moving.
    async fn play_state_sequence(&mut self) {
        if let Some(source) = self.pick_sequence() {
            tracing::info!(state = ?self.state, source = %source, "playing state sequence");
            if let Err(error) = self
                .controller
                .prepare(&source, BTreeSet::new(), false)
                .await
            {
                tracing::warn!(%source, %error, "skipping sequence that failed to load");
            }
        } else {
            tracing::warn!(state = ?self.state, "no sequence configured");
        }
        self.controller.stop_all().await;
        self.controller.execute_all().await;
    }

    fn pick_sequence(&self) -> Option<String> {
        let pool = match self.state {
            ExperienceState::Idle => &self.settings.idle,
            ExperienceState::Activating => &self.settings.activating,
            ExperienceState::Active => &self.settings.active,
            ExperienceState::Deactivating => &self.settings.deactivating,
        };
        pool.choose(&mut rand::rng()).cloned()
    }
}
