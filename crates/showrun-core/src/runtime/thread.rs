//! Runtime thread for showrun.
//!
//! The runtime thread owns the [`PlaybackEngine`]. It:
//! - Applies queued [`EngineMessage`]s in arrival order
//! - Ticks the engine at the update rate
//! - Fires scheduled finishes without waiting for the next tick
//! - Publishes changed slices and fires automations

use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::automation::{plan_outputs, AutomationDispatcher, AutomationSettings, TimerLifeCycle};
use crate::broadcast::{rundown_slice, runtime_slices, Broadcaster, StoreUpdate};
use crate::control::ControlAction;
use crate::engine::{FinishTicket, PlaybackEngine};
use crate::error::EngineError;
use crate::rundown::{EntryId, RundownEdit};
use crate::state::{EngineMessage, Reply, RestorePoint, RuntimeState, SharedState, StateManager};

/// Upper bound on a single wait so shutdown is noticed promptly.
const MAX_WAIT: Duration = Duration::from_millis(100);

/// Handle to the running runtime.
///
/// This is the interface adapters (HTTP, OSC, CLI) use. It is cheap to clone
/// and safe to share between threads.
#[derive(Clone)]
pub struct RuntimeHandle {
    /// Sender for engine messages.
    message_tx: Sender<EngineMessage>,
    /// Shared state for read access.
    state_manager: StateManager,
    /// Flag to signal shutdown.
    shutdown: Arc<AtomicBool>,
}

impl RuntimeHandle {
    /// Send a message to the runtime thread without waiting.
    pub fn send(&self, msg: EngineMessage) -> Result<()> {
        self.message_tx
            .send(msg)
            .map_err(|e| anyhow::anyhow!("Failed to send message: {}", e))
    }

    /// Get a clone of the message sender.
    pub fn message_sender(&self) -> Sender<EngineMessage> {
        self.message_tx.clone()
    }

    /// Apply an action and wait for the outcome.
    pub fn request(&self, action: ControlAction) -> crate::Result<()> {
        self.call(|reply| EngineMessage::Control {
            action,
            reply: Some(reply),
        })
    }

    /// Apply a rundown edit and wait. Returns the id of a created entry.
    pub fn edit(&self, edit: RundownEdit) -> crate::Result<Option<EntryId>> {
        self.call(|reply| EngineMessage::Edit {
            edit,
            reply: Some(reply),
        })
    }

    /// Re-seed playback from a restore point and wait.
    pub fn restore(&self, point: RestorePoint, now_epoch: i64) -> crate::Result<()> {
        self.call(|reply| EngineMessage::Restore {
            point,
            now_epoch,
            reply: Some(reply),
        })
    }

    /// Replace the automation settings.
    pub fn set_automation(&self, settings: AutomationSettings) -> Result<()> {
        self.send(EngineMessage::SetAutomation(settings))
    }

    /// Subscribe to store updates. The first messages are a full sync.
    pub fn subscribe(&self) -> crate::Result<Receiver<StoreUpdate>> {
        let (tx, rx) = unbounded();
        self.message_tx
            .send(EngineMessage::Subscribe(tx))
            .map_err(|_| EngineError::Unavailable)?;
        Ok(rx)
    }

    /// Snapshot the published state as a restore point.
    pub fn restore_point(&self, now_epoch: i64) -> RestorePoint {
        self.state_manager
            .with_state_read(|state| RestorePoint::from_state(&state.runtime, now_epoch))
    }

    /// Get the state manager for read access.
    pub fn state(&self) -> &StateManager {
        &self.state_manager
    }

    /// Read the published state with a closure.
    pub fn with_state<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&SharedState) -> R,
    {
        self.state_manager.with_state_read(f)
    }

    /// Signal the runtime to shut down.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    /// Check if shutdown has been requested.
    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    fn call<T>(
        &self,
        make: impl FnOnce(Sender<crate::Result<T>>) -> EngineMessage,
    ) -> crate::Result<T> {
        let (tx, rx) = bounded(1);
        self.message_tx
            .send(make(tx))
            .map_err(|_| EngineError::Unavailable)?;
        rx.recv().map_err(|_| EngineError::Unavailable)?
    }
}

/// The showrun runtime.
///
/// Owns the runtime thread; dropping it stops the thread.
pub struct Runtime {
    handle: RuntimeHandle,
    thread_handle: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Start the runtime thread around a configured engine.
    pub fn start(engine: PlaybackEngine, automation: AutomationSettings) -> Result<Self> {
        let state_manager = StateManager::new();
        let (message_tx, message_rx) = unbounded();
        let shutdown = Arc::new(AtomicBool::new(false));

        // readers see the loaded rundown before the first tick
        state_manager.with_state_write(|state| {
            state.runtime = engine.state().clone();
            state.rundown = engine.rundown().clone();
            state.metadata = engine.metadata().clone();
            state.bump_version();
        });

        let dispatcher = match AutomationDispatcher::start(message_tx.clone()) {
            Ok(dispatcher) => Some(dispatcher),
            Err(e) => {
                log::warn!("[AUTOMATION] Dispatcher unavailable, outputs disabled: {}", e);
                None
            }
        };

        let handle = RuntimeHandle {
            message_tx,
            state_manager: state_manager.clone(),
            shutdown: shutdown.clone(),
        };

        let thread_shutdown = shutdown.clone();
        let thread_handle = thread::Builder::new()
            .name("showrun-runtime".to_string())
            .spawn(move || {
                let mut rt =
                    RuntimeThread::new(engine, state_manager, message_rx, automation, dispatcher);
                rt.run(thread_shutdown);
            })?;

        log::info!("[RUNTIME] Started");
        Ok(Self {
            handle,
            thread_handle: Some(thread_handle),
        })
    }

    /// Get a handle to interact with the runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Shut down the runtime gracefully.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        self.handle.shutdown();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
            log::info!("[RUNTIME] Stopped");
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.stop();
    }
}

/// The thread that owns the engine.
struct RuntimeThread {
    engine: PlaybackEngine,
    shared: StateManager,
    message_rx: Receiver<EngineMessage>,
    broadcaster: Broadcaster,
    automation: AutomationSettings,
    dispatcher: Option<AutomationDispatcher>,
    last_update: Instant,
    last_notify: Instant,
    /// Rundown revision last copied to the shared state.
    synced_revision: Option<u64>,
    finish: Option<(FinishTicket, Instant)>,
}

impl RuntimeThread {
    fn new(
        engine: PlaybackEngine,
        shared: StateManager,
        message_rx: Receiver<EngineMessage>,
        automation: AutomationSettings,
        dispatcher: Option<AutomationDispatcher>,
    ) -> Self {
        let now = Instant::now();
        Self {
            engine,
            shared,
            message_rx,
            broadcaster: Broadcaster::new(),
            automation,
            dispatcher,
            last_update: now,
            last_notify: now,
            synced_revision: None,
            finish: None,
        }
    }

    fn run(&mut self, shutdown: Arc<AtomicBool>) {
        let update_interval = self.engine.config().update_interval();
        self.engine.update();
        self.after_change(true);

        while !shutdown.load(Ordering::Relaxed) {
            let mut deadline = self.last_update + update_interval;
            if let Some((_, due)) = &self.finish {
                deadline = deadline.min(*due);
            }
            let wait = deadline
                .saturating_duration_since(Instant::now())
                .min(MAX_WAIT);

            match self.message_rx.recv_timeout(wait) {
                Ok(msg) => {
                    self.handle_message(msg);
                    while let Ok(msg) = self.message_rx.try_recv() {
                        self.handle_message(msg);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("[RUNTIME] All handles dropped, stopping");
                    break;
                }
            }

            if let Some((ticket, due)) = self.finish.clone() {
                if Instant::now() >= due {
                    self.finish = None;
                    let finished = self.engine.complete_finish(&ticket);
                    self.after_change(finished);
                }
            }

            if self.last_update.elapsed() >= update_interval {
                self.last_update = Instant::now();
                let outcome = self.engine.update();
                self.after_change(outcome.finished || outcome.clock_jumped);
            }
        }
    }

    fn handle_message(&mut self, msg: EngineMessage) {
        match msg {
            EngineMessage::Control { action, reply } => {
                let result = self.engine.apply(&action);
                self.after_change(true);
                respond(reply, result);
            }
            EngineMessage::Restore {
                point,
                now_epoch,
                reply,
            } => {
                let result = self.engine.restore(&point, now_epoch);
                if let Err(e) = &result {
                    log::warn!("[RUNTIME] Restore rejected: {}", e);
                }
                self.after_change(true);
                respond(reply, result);
            }
            EngineMessage::Edit { edit, reply } => {
                let result = self.engine.edit(edit).map(|outcome| outcome.created);
                if let Err(e) = &result {
                    log::warn!("[RUNDOWN] Edit rejected: {}", e);
                }
                self.after_change(true);
                respond(reply, result);
            }
            EngineMessage::SetAutomation(settings) => {
                log::info!(
                    "[AUTOMATION] Loaded {} triggers, {} automations (enabled: {})",
                    settings.triggers.len(),
                    settings.automations.len(),
                    settings.enabled
                );
                self.automation = settings;
            }
            EngineMessage::Subscribe(tx) => {
                self.publish();
                self.broadcaster.add_subscriber(tx);
                log::debug!(
                    "[RUNTIME] Subscriber added ({} total)",
                    self.broadcaster.subscriber_count()
                );
            }
        }
    }

    /// Sync readers, reschedule the finish, fire queued lifecycle moments
    /// and publish when forced or due.
    fn after_change(&mut self, force: bool) {
        let events = self.engine.take_events();
        self.sync_shared();
        self.finish = self.engine.finish_ticket().map(|(ticket, remaining)| {
            let remaining = Duration::from_millis(u64::try_from(remaining).unwrap_or(0));
            (ticket, Instant::now() + remaining)
        });

        let snapshot = self.engine.state().clone();
        for cycle in events {
            self.fire(cycle, &snapshot);
        }

        let due = self.last_notify.elapsed() >= self.engine.config().notification_interval();
        if force || due {
            self.publish();
        }
        if due {
            self.last_notify = Instant::now();
            self.fire(TimerLifeCycle::OnUpdate, &snapshot);
        }
    }

    fn sync_shared(&mut self) {
        let revision = self.engine.rundown().revision;
        let rundown_changed = self.synced_revision != Some(revision);
        let engine = &self.engine;
        self.shared.with_state_write(|shared| {
            shared.runtime = engine.state().clone();
            if rundown_changed {
                shared.rundown = engine.rundown().clone();
                shared.metadata = engine.metadata().clone();
            }
            shared.bump_version();
        });
        self.synced_revision = Some(revision);
    }

    fn publish(&mut self) {
        let mut slices = runtime_slices(self.engine.state());
        slices.push(rundown_slice(
            self.engine.rundown().revision,
            self.engine.metadata(),
        ));
        let changed = self.broadcaster.publish(slices);
        if !changed.is_empty() {
            log::trace!("[RUNTIME] Published {:?}", changed);
        }
    }

    fn fire(&self, cycle: TimerLifeCycle, state: &RuntimeState) {
        if !self.automation.enabled {
            return;
        }
        let outputs = plan_outputs(&self.automation, cycle, state);
        if outputs.is_empty() {
            return;
        }
        match &self.dispatcher {
            Some(dispatcher) => dispatcher.dispatch(outputs),
            None => log::debug!("[AUTOMATION] No dispatcher, dropping {} outputs", outputs.len()),
        }
    }
}

fn respond<T>(reply: Reply<T>, result: crate::Result<T>) {
    if let Some(tx) = reply {
        let _ = tx.send(result);
    }
}
