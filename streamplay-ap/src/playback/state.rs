//! Playback lifecycle state machine
//!
//! `idle → start ⇄ pause → stop | finish | error`. Observers hear about
//! transitions only; re-entering the current state is silent.

use std::sync::Arc;
use streamplay_common::{PlaybackObserver, PlaybackState};
use tracing::{debug, info};

pub struct PlaybackStateMachine {
    state: PlaybackState,
    observers: Vec<Arc<dyn PlaybackObserver>>,
}

impl PlaybackStateMachine {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Idle,
            observers: Vec::new(),
        }
    }

    pub fn add_observer(&mut self, observer: Arc<dyn PlaybackObserver>) {
        self.observers.push(observer);
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Move to `next`, notifying observers if it differs.
    ///
    /// Returns whether a transition happened.
    pub fn transition(&mut self, next: PlaybackState) -> bool {
        if self.state == next {
            debug!("Already in state {}, no notification", next);
            return false;
        }

        info!("Playback state: {} -> {}", self.state, next);
        self.state = next;
        for observer in &self.observers {
            observer.on_state_changed(&self.state);
        }
        true
    }

    /// Back to `idle` for a new stream. Observers are told if the state changed.
    pub fn reset(&mut self) {
        self.transition(PlaybackState::Idle);
    }
}

impl Default for PlaybackStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder(Mutex<Vec<PlaybackState>>);

    impl PlaybackObserver for Recorder {
        fn on_state_changed(&self, state: &PlaybackState) {
            self.0.lock().unwrap().push(state.clone());
        }
    }

    #[test]
    fn test_initial_state_is_idle() {
        let machine = PlaybackStateMachine::new();
        assert_eq!(machine.state(), &PlaybackState::Idle);
        assert!(machine.is_active());
    }

    #[test]
    fn test_notifies_only_on_change() {
        let recorder = Arc::new(Recorder::default());
        let mut machine = PlaybackStateMachine::new();
        machine.add_observer(recorder.clone());

        assert!(machine.transition(PlaybackState::Started));
        assert!(!machine.transition(PlaybackState::Started));
        assert!(machine.transition(PlaybackState::Paused));
        assert!(machine.transition(PlaybackState::Started));

        assert_eq!(
            *recorder.0.lock().unwrap(),
            vec![
                PlaybackState::Started,
                PlaybackState::Paused,
                PlaybackState::Started
            ]
        );
    }

    #[test]
    fn test_error_cause_is_part_of_state() {
        let recorder = Arc::new(Recorder::default());
        let mut machine = PlaybackStateMachine::new();
        machine.add_observer(recorder.clone());

        machine.transition(PlaybackState::Error("decode".to_string()));
        machine.transition(PlaybackState::Error("decode".to_string()));

        assert!(machine.is_terminal());
        assert_eq!(recorder.0.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reset_returns_to_idle() {
        let mut machine = PlaybackStateMachine::new();
        machine.transition(PlaybackState::Stopped);
        machine.reset();
        assert_eq!(machine.state(), &PlaybackState::Idle);
    }
}
