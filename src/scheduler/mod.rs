//! Timed replay of one instruction timeline.
//!
//! Each running scheduler is a tokio task that walks its timeline in time
//! order, sleeping until each offset is due and emitting typed events over
//! a channel. Cancellation is cooperative: `stop()` flips a watch channel
//! that the sleep is raced against, so a stop interrupts a suspension
//! promptly instead of waiting the sleep out.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

use crate::instructions::{TimedInstruction, Timeline};

/// Identity of one scheduler, passed with every event so the receiver can
/// route by source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedulerId(uuid::Uuid);

impl SchedulerId {
    fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl std::fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// The instructions scheduled at one offset are due, in insertion
    /// order.
    Fire {
        scheduler: SchedulerId,
        instructions: Vec<TimedInstruction>,
    },
    /// Playback finished, by exhaustion or by `stop()`. Emitted exactly
    /// once per `start()`.
    Complete { scheduler: SchedulerId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Completed,
    Stopped,
}

/// Wake this much before an instruction is due to counter systematic
/// oversleep.
const LOOKAHEAD: Duration = Duration::from_millis(5);

pub struct InstructionScheduler {
    id: SchedulerId,
    timeline: Option<Timeline>,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    drift_warn: Duration,
    state: Arc<Mutex<SchedulerState>>,
    cancel: Option<watch::Sender<bool>>,
}

impl InstructionScheduler {
    pub fn new(events: mpsc::UnboundedSender<SchedulerEvent>, drift_warn: Duration) -> Self {
        Self {
            id: SchedulerId::new(),
            timeline: None,
            events,
            drift_warn,
            state: Arc::new(Mutex::new(SchedulerState::Idle)),
            cancel: None,
        }
    }

    pub fn id(&self) -> SchedulerId {
        self.id
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock().unwrap()
    }

    /// Arms the scheduler with a timeline. Ignored while running.
    pub fn set_timeline(&mut self, timeline: Timeline) {
        if self.state() == SchedulerState::Running {
            tracing::warn!(scheduler = %self.id, "cannot replace timeline while running");
            return;
        }
        self.timeline = Some(timeline);
    }

    /// Begins timed replay. An empty or absent timeline completes
    /// immediately without spawning the replay task.
    pub fn start(&mut self) {
        if self.state() == SchedulerState::Running {
            tracing::warn!(scheduler = %self.id, "already running");
            return;
        }

        let timeline = match self.timeline.clone() {
            Some(timeline) if !timeline.is_empty() => timeline,
            _ => {
                tracing::debug!(scheduler = %self.id, "no instructions to play");
                *self.state.lock().unwrap() = SchedulerState::Completed;
                let _ = self.events.send(SchedulerEvent::Complete { scheduler: self.id });
                return;
            }
        };

        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.cancel = Some(cancel_tx);
        *self.state.lock().unwrap() = SchedulerState::Running;

        let id = self.id;
        let events = self.events.clone();
        let drift_warn = self.drift_warn;
        let state = Arc::clone(&self.state);
        tokio::spawn(replay(id, timeline, events, drift_warn, state, cancel_rx));
    }

    /// Requests a prompt stop. Safe to call from any task; a no-op when not
    /// running. The completion event is still emitted by the replay task.
    pub fn stop(&self) {
        if self.state() != SchedulerState::Running {
            return;
        }
        if let Some(cancel) = &self.cancel {
            tracing::debug!(scheduler = %self.id, "stopping instruction replay");
            let _ = cancel.send(true);
        }
    }
}

async fn replay(
    id: SchedulerId,
    timeline: Timeline,
    events: mpsc::UnboundedSender<SchedulerEvent>,
    drift_warn: Duration,
    state: Arc<Mutex<SchedulerState>>,
    mut cancel: watch::Receiver<bool>,
) {
    tracing::debug!(scheduler = %id, offsets = timeline.len(), "starting instruction replay");
    let started = Instant::now();
    let mut stopped = false;

    'outer: for (offset, slot) in timeline.iter() {
        let elapsed = started.elapsed();
        if offset > elapsed {
            let wait = (offset - elapsed).saturating_sub(LOOKAHEAD);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = cancel.changed() => {}
            }
        }
        if *cancel.borrow() {
            stopped = true;
            break 'outer;
        }

        let elapsed = started.elapsed();
        if elapsed > offset && elapsed - offset > drift_warn {
            tracing::warn!(
                scheduler = %id,
                due_s = offset.as_secs_f64(),
                late_ms = (elapsed - offset).as_millis() as u64,
                "instruction fired late"
            );
        }

        if events
            .send(SchedulerEvent::Fire {
                scheduler: id,
                instructions: slot.to_vec(),
            })
            .is_err()
        {
            // Receiver gone; nothing left to drive.
            break 'outer;
        }
    }

    *state.lock().unwrap() = if stopped {
        tracing::debug!(scheduler = %id, "instruction replay stopped");
        SchedulerState::Stopped
    } else {
        tracing::debug!(scheduler = %id, "instruction replay complete");
        SchedulerState::Completed
    };
    let _ = events.send(SchedulerEvent::Complete { scheduler: id });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instructions::Instruction;

    fn phoneme_at(secs: f64, name: &str) -> TimedInstruction {
        TimedInstruction {
            offset: Duration::from_secs_f64(secs),
            move_time_ms: Some(100),
            instruction: Instruction::Phoneme(name.to_string()),
        }
    }

    async fn drain_until_complete(
        rx: &mut mpsc::UnboundedReceiver<SchedulerEvent>,
    ) -> (Vec<Vec<TimedInstruction>>, usize) {
        let mut fired = Vec::new();
        let mut completions = 0;
        while let Some(event) = rx.recv().await {
            match event {
                SchedulerEvent::Fire { instructions, .. } => fired.push(instructions),
                SchedulerEvent::Complete { .. } => {
                    completions += 1;
                    break;
                }
            }
        }
        (fired, completions)
    }

    #[tokio::test(start_paused = true)]
    async fn fires_instructions_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = InstructionScheduler::new(tx, Duration::from_millis(50));
        scheduler.set_timeline(
            [
                phoneme_at(0.0, "REST"),
                phoneme_at(0.5, "AI"),
                phoneme_at(1.0, "O"),
            ]
            .into_iter()
            .collect(),
        );
        scheduler.start();

        let (fired, completions) = drain_until_complete(&mut rx).await;
        assert_eq!(completions, 1);
        assert_eq!(fired.len(), 3);
        assert_eq!(fired[0][0].instruction, Instruction::Phoneme("REST".into()));
        assert_eq!(fired[1][0].instruction, Instruction::Phoneme("AI".into()));
        assert_eq!(fired[2][0].instruction, Instruction::Phoneme("O".into()));
        assert_eq!(scheduler.state(), SchedulerState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn instructions_fire_at_their_offsets() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = InstructionScheduler::new(tx, Duration::from_millis(50));
        scheduler.set_timeline([phoneme_at(0.5, "AI")].into_iter().collect());

        let started = Instant::now();
        scheduler.start();
        let (fired, _) = drain_until_complete(&mut rx).await;
        assert_eq!(fired.len(), 1);
        // Woken by the timer, lookahead-early at most.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(495), "fired at {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_timeline_completes_immediately() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = InstructionScheduler::new(tx, Duration::from_millis(50));
        scheduler.start();
        assert_eq!(scheduler.state(), SchedulerState::Completed);
        assert!(matches!(
            rx.recv().await,
            Some(SchedulerEvent::Complete { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_interrupts_suspension_and_completes_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = InstructionScheduler::new(tx, Duration::from_millis(50));
        scheduler.set_timeline([phoneme_at(60.0, "AI")].into_iter().collect());
        scheduler.start();

        // Let the replay task reach its sleep, then stop it mid-suspension.
        tokio::task::yield_now().await;
        scheduler.stop();

        let (fired, completions) = drain_until_complete(&mut rx).await;
        assert!(fired.is_empty());
        assert_eq!(completions, 1);
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        // No second completion event.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_when_idle_is_a_noop() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = InstructionScheduler::new(tx, Duration::from_millis(50));
        scheduler.stop();
        assert_eq!(scheduler.state(), SchedulerState::Idle);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn scheduler_can_be_rearmed_after_completion() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut scheduler = InstructionScheduler::new(tx, Duration::from_millis(50));

        scheduler.set_timeline([phoneme_at(0.0, "REST")].into_iter().collect());
        scheduler.start();
        let (fired, _) = drain_until_complete(&mut rx).await;
        assert_eq!(fired.len(), 1);

        scheduler.set_timeline([phoneme_at(0.0, "AI")].into_iter().collect());
        scheduler.start();
        let (fired, completions) = drain_until_complete(&mut rx).await;
        assert_eq!(fired.len(), 1);
        assert_eq!(completions, 1);
        assert_eq!(fired[0][0].instruction, Instruction::Phoneme("AI".into()));
    }
}
