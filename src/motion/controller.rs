//! The motion controller.
//!
//! Owns every running scheduler handle plus the override layer and the
//! last-sent snapshot. All mutation goes through one mutex, and scheduler
//! events drain through a single channel into [`MotionController::run`],
//! so instruction handling is serialized no matter how many schedulers are
//! playing concurrently.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use tokio::sync::{Mutex, broadcast, mpsc};

use crate::config::HeadConfig;
use crate::instructions::{Instruction, InstructionSet, LoadError, TimedInstruction};
use crate::scheduler::{InstructionScheduler, SchedulerEvent, SchedulerId, SchedulerState};
use crate::servo::{PhonemeMap, Servo, ServoLimits, ServoPositions};
use crate::transport::ServoTransport;

use super::{DispatchError, MotionEvent};

/// One registered scheduler plus its dispatch policy.
struct HandleInfo {
    scheduler: InstructionScheduler,
    source: String,
    /// Servos this handle's position instructions must not drive.
    without_servos: BTreeSet<Servo>,
    /// Position instructions from this handle take override priority.
    as_override: bool,
    /// Servos this handle has overridden, released on completion.
    overridden: BTreeSet<Servo>,
    /// Primary handles are started by `execute_all`; nested ones by their
    /// parent's trigger instruction.
    primary: bool,
    /// Nested source → pre-resolved child handle.
    children: HashMap<String, SchedulerId>,
}

#[derive(Default)]
struct ControllerState {
    handles: HashMap<SchedulerId, HandleInfo>,
    override_layer: ServoPositions,
    last_sent: ServoPositions,
}

#[derive(Clone)]
pub struct MotionController {
    state: Arc<Mutex<ControllerState>>,
    instruction_set: InstructionSet,
    phonemes: Arc<PhonemeMap>,
    transport: Arc<dyn ServoTransport>,
    scheduler_tx: mpsc::UnboundedSender<SchedulerEvent>,
    motion_tx: broadcast::Sender<MotionEvent>,
    config: Arc<HeadConfig>,
}

impl MotionController {
    /// Builds the controller. The returned receiver carries every
    /// scheduler's events and must be fed to [`MotionController::run`].
    pub fn new(
        config: Arc<HeadConfig>,
        limits: Arc<ServoLimits>,
        transport: Arc<dyn ServoTransport>,
    ) -> (Self, mpsc::UnboundedReceiver<SchedulerEvent>) {
        let (scheduler_tx, scheduler_rx) = mpsc::unbounded_channel();
        let (motion_tx, _) = broadcast::channel(64);
        let instruction_set = InstructionSet::new(
            config.playback.instruction_dir.clone(),
            config.playback.default_move_time_ms,
            Arc::clone(&limits),
        );
        let controller = Self {
            state: Arc::new(Mutex::new(ControllerState::default())),
            instruction_set,
            phonemes: Arc::new(PhonemeMap::new(&limits)),
            transport,
            scheduler_tx,
            motion_tx,
            config,
        };
        (controller, scheduler_rx)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MotionEvent> {
        self.motion_tx.subscribe()
    }

    /// Drives dispatch: drains scheduler events until every sender is gone.
    pub async fn run(self, mut events: mpsc::UnboundedReceiver<SchedulerEvent>) {
        while let Some(event) = events.recv().await {
            match event {
                SchedulerEvent::Fire {
                    scheduler,
                    instructions,
                } => {
                    for instruction in instructions {
                        if let Err(error) = self.dispatch(scheduler, instruction).await {
                            tracing::warn!(%scheduler, %error, "skipping instruction");
                        }
                    }
                }
                SchedulerEvent::Complete { scheduler } => {
                    self.handle_complete(scheduler).await;
                }
            }
        }
        tracing::debug!("motion controller event loop finished");
    }

    /// Loads a sequence and registers a handle for it, recursively
    /// pre-resolving nested sequences into child handles that inherit this
    /// handle's policy. A nested source that fails to load degrades that
    /// branch only; a cycle back into the prepare chain is skipped.
    pub async fn prepare(
        &self,
        source: &str,
        without_servos: BTreeSet<Servo>,
        as_override: bool,
    ) -> Result<SchedulerId, LoadError> {
        let mut chain = vec![source.to_string()];
        self.prepare_inner(source, without_servos, as_override, true, &mut chain)
            .await
    }

    fn prepare_inner<'a>(
        &'a self,
        source: &'a str,
        without_servos: BTreeSet<Servo>,
        as_override: bool,
        primary: bool,
        chain: &'a mut Vec<String>,
    ) -> std::pin::Pin<
        Box<dyn Future<Output = Result<SchedulerId, LoadError>> + Send + 'a>,
    > {
        Box::pin(async move {
            let (timeline, nested) = self.instruction_set.load(source)?;

            let mut scheduler = InstructionScheduler::new(
                self.scheduler_tx.clone(),
                self.config.playback.drift_warn(),
            );
            scheduler.set_timeline(timeline);
            let id = scheduler.id();

            let mut children = HashMap::new();
            for reference in nested {
                if chain.iter().any(|seen| *seen == reference.source) {
                    tracing::warn!(
                        source = %reference.source,
                        via = source,
                        "nested sequence cycle detected, skipping"
                    );
                    continue;
                }
                chain.push(reference.source.clone());
                let prepared = self
                    .prepare_inner(
                        &reference.source,
                        without_servos.clone(),
                        as_override,
                        false,
                        chain,
                    )
                    .await;
                chain.pop();
                match prepared {
                    Ok(child) => {
                        children.insert(reference.source.clone(), child);
                    }
                    Err(error) => {
                        tracing::warn!(
                            source = %reference.source,
                            %error,
                            "skipping nested sequence that failed to load"
                        );
                    }
                }
            }

            let mut state = self.state.lock().await;
            state.handles.insert(
                id,
                HandleInfo {
                    scheduler,
                    source: source.to_string(),
                    without_servos,
                    as_override,
                    overridden: BTreeSet::new(),
                    primary,
                    children,
                },
            );
            tracing::info!(%id, source, primary, "prepared instruction sequence");
            Ok(id)
        })
    }

    /// Starts every primary handle that has not run yet. Handles already
    /// running, or stopped and awaiting their completion event, are left
    /// alone. With nothing registered, signals completion immediately.
    pub async fn execute_all(&self) {
        let mut state = self.state.lock().await;
        if state.handles.is_empty() {
            tracing::debug!("no instructions registered");
            let _ = self.motion_tx.send(MotionEvent::AllComplete);
            return;
        }
        tracing::info!("executing all loaded servo instructions");
        for info in state.handles.values_mut() {
            if info.primary && info.scheduler.state() == SchedulerState::Idle {
                info.scheduler.start();
            }
        }
    }

    /// Stops every registered handle, primary and nested.
    pub async fn stop_all(&self) {
        let state = self.state.lock().await;
        for info in state.handles.values() {
            info.scheduler.stop();
        }
    }

    /// Low-latency manual control: merge into the override layer and send
    /// straight to the transport, bypassing instruction dispatch.
    pub async fn override_control(&self, positions: ServoPositions) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        self.apply_override(&mut state, positions).await
    }

    /// Releases the given servos from the override layer.
    pub async fn clear_override(&self, servos: &BTreeSet<Servo>) {
        let mut state = self.state.lock().await;
        tracing::debug!(?servos, "clearing position override");
        state.override_layer.clear(servos);
    }

    async fn apply_override(
        &self,
        state: &mut ControllerState,
        positions: ServoPositions,
    ) -> Result<(), DispatchError> {
        state.override_layer = state.override_layer.merge(&positions);
        let to_send = state
            .override_layer
            .without_duplicates(&state.last_sent, self.threshold());
        if to_send.is_empty() {
            return Ok(());
        }
        state.last_sent = state.last_sent.merge(&to_send);
        self.transport.move_to(&to_send, None).await?;
        let _ = self.motion_tx.send(MotionEvent::Move(to_send));
        Ok(())
    }

    async fn dispatch(
        &self,
        scheduler: SchedulerId,
        instruction: TimedInstruction,
    ) -> Result<(), DispatchError> {
        let mut state = self.state.lock().await;
        match instruction.instruction {
            Instruction::Phoneme(ref name) => {
                let shape = self
                    .phonemes
                    .lookup(name)
                    .map_err(|_| DispatchError::UnmappedPhoneme(name.clone()))?
                    .clone();
                let merged = shape.merge(&state.override_layer);
                self.send_positions(&mut state, merged, instruction.move_time_ms, None)
                    .await
            }
            Instruction::Position(positions) => {
                let Some(info) = state.handles.get_mut(&scheduler) else {
                    tracing::warn!(%scheduler, "position fired for unregistered handle");
                    return Ok(());
                };
                if info.as_override {
                    info.overridden.extend(positions.controlled_servos());
                    return self.apply_override(&mut state, positions).await;
                }
                let without = info.without_servos.clone();
                let merged = positions.merge(&state.override_layer);
                // Per-servo speeds supersede the uniform move time.
                let move_time = if merged.speed_specified() {
                    None
                } else {
                    instruction.move_time_ms
                };
                self.send_positions(&mut state, merged, move_time, Some(&without))
                    .await
            }
            Instruction::Stop(servos) => {
                // Servos under live override keep moving.
                let overridden = state.override_layer.controlled_servos();
                let to_stop: BTreeSet<Servo> =
                    servos.difference(&overridden).copied().collect();
                if to_stop.is_empty() {
                    return Ok(());
                }
                self.transport.stop_servos(&to_stop).await?;
                let _ = self.motion_tx.send(MotionEvent::Stop(to_stop));
                Ok(())
            }
            Instruction::NestedSequence(ref nested_source) => {
                let child = state
                    .handles
                    .get(&scheduler)
                    .and_then(|info| info.children.get(nested_source))
                    .copied()
                    .ok_or_else(|| {
                        DispatchError::InvalidNestedReference(nested_source.clone())
                    })?;
                tracing::info!(source = %nested_source, "starting parallel sequence");
                match state.handles.get_mut(&child) {
                    Some(info) => info.scheduler.start(),
                    None => {
                        return Err(DispatchError::InvalidNestedReference(
                            nested_source.clone(),
                        ));
                    }
                }
                Ok(())
            }
        }
    }

    /// Dedup against the last-sent snapshot and forward to the transport.
    /// `without` projects servos out of the wire send only; the snapshot
    /// still records them so later dedup stays consistent.
    async fn send_positions(
        &self,
        state: &mut ControllerState,
        positions: ServoPositions,
        move_time_ms: Option<u32>,
        without: Option<&BTreeSet<Servo>>,
    ) -> Result<(), DispatchError> {
        if positions.within_threshold(Some(&state.last_sent), self.threshold()) {
            tracing::trace!("send suppressed, positions within threshold of last send");
            return Ok(());
        }
        let to_send = positions.without_duplicates(&state.last_sent, self.threshold());
        if to_send.is_empty() {
            return Ok(());
        }
        state.last_sent = state.last_sent.merge(&to_send);

        let outgoing = match without {
            Some(excluded) if !excluded.is_empty() => to_send.without(excluded),
            _ => to_send.clone(),
        };
        if outgoing.is_empty() {
            return Ok(());
        }
        self.transport.move_to(&outgoing, move_time_ms).await?;
        let _ = self.motion_tx.send(MotionEvent::Move(outgoing));
        Ok(())
    }

    async fn handle_complete(&self, scheduler: SchedulerId) {
        let mut state = self.state.lock().await;
        if let Some(info) = state.handles.remove(&scheduler) {
            tracing::info!(%scheduler, source = %info.source, "instruction sequence complete");
            if info.as_override && !info.overridden.is_empty() {
                tracing::debug!(servos = ?info.overridden, "releasing overridden servos");
                state.override_layer.clear(&info.overridden);
            }
            // Children whose trigger never fired (parent stopped early)
            // would otherwise pin the registry open.
            remove_idle_children(&mut state, &info);
        }
        if state.handles.is_empty() {
            tracing::info!("all instruction sequences complete");
            let _ = self.motion_tx.send(MotionEvent::AllComplete);
        }
    }

    fn threshold(&self) -> i32 {
        self.config.playback.dedup_threshold
    }
}

fn remove_idle_children(state: &mut ControllerState, parent: &HandleInfo) {
    for child_id in parent.children.values() {
        let idle = state
            .handles
            .get(child_id)
            .is_some_and(|child| child.scheduler.state() == SchedulerState::Idle);
        if idle {
            if let Some(child) = state.handles.remove(child_id) {
                tracing::debug!(scheduler = %child_id, source = %child.source, "dropping unstarted nested handle");
                remove_idle_children(state, &child);
            }
        }
    }
}
