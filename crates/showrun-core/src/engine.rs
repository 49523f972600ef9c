//! Playback engine.
//!
//! [`PlaybackEngine`] owns the rundown and the [`RuntimeState`]. Operator
//! actions and ticks mutate the state in place; every derived number
//! (countdown, elapsed, phase, offsets, expected ends) is recomputed from
//! scratch after each mutation so a single tick always yields a consistent
//! state.
//!
//! Lifecycle moments (load, start, pause, stop, finish) are queued and
//! drained by the runtime with [`PlaybackEngine::take_events`].

use std::sync::Arc;

use crate::automation::TimerLifeCycle;
use crate::clock::{day_delta, wrap_day, Clock, DAY_TO_MS};
use crate::config::EngineConfig;
use crate::control::{AuxAction, ControlAction, EventTarget};
use crate::error::{EngineError, Result};
use crate::offset::{
    get_expected_start, get_relative_offset, get_runtime_offset, OffsetInputs, RelativeReset,
};
use crate::playback::Playback;
use crate::rundown::{
    apply_edit, normalise, EditOutcome, EndAction, EntryId, EventEntry, Rundown, RundownEdit,
    RundownMetadata,
};
use crate::state::{
    OffsetState, RelativeAnchor, RestorePoint, RuntimeState, TimerState,
};
use crate::timer::{
    calculate_duration, get_current, get_current_to_end, get_elapsed, get_expected_finish,
    get_timer_phase,
};

/// Tags a scheduled finish with the run it was computed for.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FinishTicket {
    pub entry_id: EntryId,
    pub started_at: i64,
}

/// What a tick did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub clock: i64,
    /// The clock moved further than `skip_limit` since the last tick.
    pub clock_jumped: bool,
    /// The loaded event reached its finish this tick.
    pub finished: bool,
}

enum RollTarget {
    /// The clock is inside this event's scheduled window.
    Running(EntryId),
    /// The next event to start.
    Pending(EntryId),
}

/// The playback state machine.
pub struct PlaybackEngine {
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    rundown: Rundown,
    metadata: RundownMetadata,
    state: RuntimeState,
    events: Vec<TimerLifeCycle>,
}

impl PlaybackEngine {
    pub fn new(clock: Arc<dyn Clock>, config: EngineConfig) -> Self {
        let mut state = RuntimeState::new(config.aux_timer_default);
        state.offset.mode = config.offset_mode;
        state.clock = clock.now();
        log::debug!("[PLAYBACK] Engine created with {} clock", clock.name());
        Self {
            clock,
            config,
            rundown: Rundown::default(),
            metadata: RundownMetadata::default(),
            state,
            events: Vec::new(),
        }
    }

    pub fn with_rundown(mut self, rundown: Rundown) -> Self {
        self.set_rundown(rundown);
        self
    }

    /// Replace the rundown wholesale.
    pub fn set_rundown(&mut self, mut rundown: Rundown) {
        self.metadata = normalise(&mut rundown);
        self.rundown = rundown;
        self.refresh_selection(self.clock.now());
        self.recompute(self.clock.now());
    }

    pub fn state(&self) -> &RuntimeState {
        &self.state
    }

    pub fn rundown(&self) -> &Rundown {
        &self.rundown
    }

    pub fn metadata(&self) -> &RundownMetadata {
        &self.metadata
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Drain the lifecycle moments queued since the last call.
    pub fn take_events(&mut self) -> Vec<TimerLifeCycle> {
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: TimerLifeCycle) {
        self.events.push(event);
    }

    // =========================================================================
    // Operator actions
    // =========================================================================

    /// Apply an operator action. A rejected action leaves the state untouched.
    pub fn apply(&mut self, action: &ControlAction) -> Result<()> {
        let clock = self.clock.now();
        let result = match action {
            ControlAction::Start(None) => self.start_at(clock),
            ControlAction::Start(Some(target)) => self.start_target_at(target, clock),
            ControlAction::Load(target) => self.load_at(target, clock),
            ControlAction::Pause => self.pause_at(clock),
            ControlAction::Stop => self.stop(),
            ControlAction::Roll => self.roll_at(clock),
            ControlAction::Reload => self.reload_at(clock),
            ControlAction::Next => self.next_at(clock),
            ControlAction::Previous => self.previous_at(clock),
            ControlAction::AddTime(ms) => self.add_time_at(*ms, clock),
            ControlAction::Skip(id) => self.skip(id),
            ControlAction::Aux(aux) => {
                self.aux_at(aux, clock);
                Ok(())
            }
        };
        match &result {
            Ok(()) => log::debug!("[PLAYBACK] Applied {}", action),
            Err(e) => log::warn!("[PLAYBACK] Rejected {}: {}", action, e),
        }
        self.recompute(clock);
        result
    }

    pub fn load(&mut self, target: &EventTarget) -> Result<()> {
        self.apply(&ControlAction::Load(target.clone()))
    }

    pub fn start(&mut self) -> Result<()> {
        self.apply(&ControlAction::Start(None))
    }

    pub fn pause(&mut self) -> Result<()> {
        self.apply(&ControlAction::Pause)
    }

    pub fn roll(&mut self) -> Result<()> {
        self.apply(&ControlAction::Roll)
    }

    pub fn reload(&mut self) -> Result<()> {
        self.apply(&ControlAction::Reload)
    }

    pub fn next(&mut self) -> Result<()> {
        self.apply(&ControlAction::Next)
    }

    pub fn previous(&mut self) -> Result<()> {
        self.apply(&ControlAction::Previous)
    }

    pub fn add_time(&mut self, ms: i64) -> Result<()> {
        self.apply(&ControlAction::AddTime(ms))
    }

    fn load_at(&mut self, target: &EventTarget, clock: i64) -> Result<()> {
        let id = self.resolve_target(target)?;
        self.load_event(&id, clock)
    }

    fn start_target_at(&mut self, target: &EventTarget, clock: i64) -> Result<()> {
        let id = self.resolve_target(target)?;
        self.load_event(&id, clock)?;
        self.start_at(clock)
    }

    fn start_at(&mut self, clock: i64) -> Result<()> {
        if let Some(pending) = self.state.internal.pending.clone() {
            self.load_event(&pending, clock)?;
        } else if self.state.event_now.is_none() {
            let first = self
                .metadata
                .playable_event_order
                .first()
                .cloned()
                .ok_or(EngineError::NoTarget("playable"))?;
            self.load_event(&first, clock)?;
        }
        if !self.state.timer.playback.can_start(self.state.is_loaded()) {
            return Err(EngineError::NoEventLoaded);
        }
        match self.state.timer.playback {
            Playback::Play => return Ok(()),
            Playback::Pause => self.resume(clock),
            Playback::Roll => self.state.internal.force_finish = None,
            Playback::Stop => {}
        }
        self.state.timer.playback = Playback::Play;
        self.mark_started();
        if let Some(event) = &self.state.event_now {
            log::info!("[PLAYBACK] Started '{}'", event.id);
        }
        self.emit(TimerLifeCycle::OnStart);
        Ok(())
    }

    fn pause_at(&mut self, clock: i64) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_pause() {
            return Err(EngineError::InvalidTransition {
                action: "pause",
                playback,
            });
        }
        self.state.internal.paused_at = Some(clock);
        self.state.timer.playback = Playback::Pause;
        log::info!("[PLAYBACK] Paused");
        self.emit(TimerLifeCycle::OnPause);
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_stop() {
            return Err(EngineError::InvalidTransition {
                action: "stop",
                playback,
            });
        }
        self.stop_inner();
        Ok(())
    }

    fn stop_inner(&mut self) {
        let state = &mut self.state;
        state.timer = TimerState::default();
        state.event_now = None;
        state.event_next = None;
        state.group_now = None;
        state.offset = OffsetState {
            mode: self.config.offset_mode,
            ..Default::default()
        };
        state.runtime.selected_event_index = None;
        state.runtime.actual_start = None;
        state.internal.paused_at = None;
        state.internal.force_finish = None;
        state.internal.pending = None;
        state.internal.anchor = None;
        log::info!("[PLAYBACK] Stopped");
        self.emit(TimerLifeCycle::OnStop);
    }

    fn reload_at(&mut self, clock: i64) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_reload() {
            return Err(EngineError::InvalidTransition {
                action: "reload",
                playback,
            });
        }
        let id = self
            .state
            .event_now
            .as_ref()
            .map(|e| e.id.clone())
            .ok_or(EngineError::NoEventLoaded)?;
        self.load_event(&id, clock)?;
        self.start_at(clock)
    }

    fn next_at(&mut self, clock: i64) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_step() {
            return Err(EngineError::InvalidTransition {
                action: "next",
                playback,
            });
        }
        let target = match &self.state.event_now {
            Some(event) => self.playable_after(&event.id),
            None => self.metadata.playable_event_order.first().cloned(),
        }
        .ok_or(EngineError::NoTarget("next"))?;
        self.step_to(&target, playback, clock)
    }

    fn previous_at(&mut self, clock: i64) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_step() {
            return Err(EngineError::InvalidTransition {
                action: "previous",
                playback,
            });
        }
        let target = self
            .state
            .event_now
            .as_ref()
            .and_then(|event| self.playable_before(&event.id))
            .ok_or(EngineError::NoTarget("previous"))?;
        self.step_to(&target, playback, clock)
    }

    /// Load `target`, keeping the run state.
    fn step_to(&mut self, target: &str, playback: Playback, clock: i64) -> Result<()> {
        self.load_event(target, clock)?;
        if playback == Playback::Play {
            self.start_at(clock)?;
        }
        Ok(())
    }

    fn add_time_at(&mut self, ms: i64, clock: i64) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_add_time() {
            return Err(EngineError::InvalidTransition {
                action: "add time",
                playback,
            });
        }
        self.state.timer.added_time += ms;
        self.recompute(clock);
        let timer = &mut self.state.timer;
        if timer.finished_at.is_some() && timer.current.is_some_and(|c| c > 0) {
            timer.finished_at = None;
        }
        Ok(())
    }

    /// Mark an event as skipped.
    pub fn skip(&mut self, id: &str) -> Result<()> {
        if self.rundown.event(id).is_none() {
            return Err(EngineError::EventNotFound(id.to_string()));
        }
        self.edit(RundownEdit::SetSkip {
            id: id.to_string(),
            skip: true,
        })
        .map(|_| ())
    }

    fn aux_at(&mut self, action: &AuxAction, clock: i64) {
        let aux = &mut self.state.aux_timer;
        match action {
            AuxAction::Start => aux.start(clock),
            AuxAction::Pause => aux.pause(clock),
            AuxAction::Stop => aux.stop(),
            AuxAction::SetDuration(ms) => aux.set_duration(*ms),
            AuxAction::SetDirection(direction) => aux.set_direction(*direction),
        }
    }

    // =========================================================================
    // Roll
    // =========================================================================

    fn roll_at(&mut self, clock: i64) -> Result<()> {
        let playback = self.state.timer.playback;
        if !playback.can_roll(self.state.timer.phase) {
            return Err(EngineError::InvalidTransition {
                action: "roll",
                playback,
            });
        }
        if self.metadata.playable_event_order.is_empty() {
            return Err(EngineError::NoTarget("playable"));
        }
        if self.state.event_now.is_some() && playback != Playback::Stop {
            // keep the loaded event and let the schedule take over after it
            if playback == Playback::Pause {
                self.resume(clock);
                self.emit(TimerLifeCycle::OnStart);
            }
            self.state.timer.playback = Playback::Roll;
            self.state.internal.force_finish = None;
            self.mark_started();
            log::info!("[PLAYBACK] Rolling from the loaded event");
            return Ok(());
        }
        self.roll_to_schedule(clock, None)
    }

    /// Follow the schedule: run the event whose window contains the clock,
    /// or wait for the next one. `exclude` is never chosen as running.
    fn roll_to_schedule(&mut self, clock: i64, exclude: Option<&str>) -> Result<()> {
        match self.find_roll_target(clock, exclude) {
            Some(RollTarget::Running(id)) => self.begin_roll_event(&id),
            Some(RollTarget::Pending(id)) => {
                let event = self
                    .rundown
                    .event(&id)
                    .cloned()
                    .ok_or_else(|| EngineError::EventNotFound(id.clone()))?;
                log::info!(
                    "[PLAYBACK] Roll waiting {} ms for '{}'",
                    wrap_day(event.delayed_start() - clock),
                    id
                );
                let state = &mut self.state;
                state.timer = TimerState {
                    duration: Some(event.duration),
                    current: Some(event.duration),
                    playback: Playback::Roll,
                    ..Default::default()
                };
                state.event_now = None;
                state.group_now = None;
                state.event_next = Some(event);
                state.runtime.selected_event_index = None;
                state.internal.pending = Some(id);
                state.internal.paused_at = None;
                state.internal.force_finish = None;
                Ok(())
            }
            None => Err(EngineError::NoTarget("playable")),
        }
    }

    fn find_roll_target(&self, clock: i64, exclude: Option<&str>) -> Option<RollTarget> {
        let mut upcoming: Option<(i64, &EntryId)> = None;
        for id in &self.metadata.playable_event_order {
            let Some(event) = self.rundown.event(id) else {
                continue;
            };
            let start = event.delayed_start();
            if exclude != Some(id.as_str()) && wrap_day(clock - start) < event.duration {
                return Some(RollTarget::Running(id.clone()));
            }
            let wait = wrap_day(start - clock);
            if upcoming.map_or(true, |(best, _)| wait < best) {
                upcoming = Some((wait, id));
            }
        }
        upcoming.map(|(_, id)| RollTarget::Pending(id.clone()))
    }

    /// Run an event on its schedule, held to its scheduled end.
    fn begin_roll_event(&mut self, id: &str) -> Result<()> {
        let event = self
            .rundown
            .event(id)
            .cloned()
            .ok_or_else(|| EngineError::EventNotFound(id.to_string()))?;
        let start = event.delayed_start();
        self.state.timer = TimerState {
            duration: Some(event.duration),
            started_at: Some(start),
            playback: Playback::Roll,
            ..Default::default()
        };
        let internal = &mut self.state.internal;
        internal.force_finish = Some(wrap_day(start + event.duration));
        internal.paused_at = None;
        internal.pending = None;
        log::info!("[PLAYBACK] Roll started '{}'", event.id);
        self.select(event);
        self.mark_started();
        self.emit(TimerLifeCycle::OnLoad);
        self.emit(TimerLifeCycle::OnStart);
        Ok(())
    }

    fn update_pending(&mut self, clock: i64) {
        let Some(id) = self.state.internal.pending.clone() else {
            return;
        };
        let Some(event) = self.rundown.event(&id).cloned() else {
            if let Err(e) = self.roll_to_schedule(clock, None) {
                log::warn!("[PLAYBACK] Roll lost its target: {}", e);
                self.stop_inner();
            }
            return;
        };
        let start = event.delayed_start();
        let wait = wrap_day(start - clock);
        // a zero length event has no window, catch the wrap of the wait instead
        let crossed = self
            .state
            .timer
            .secondary_timer
            .is_some_and(|previous| previous <= self.config.skip_limit && wait > DAY_TO_MS / 2);
        let inside = wrap_day(clock - start) < event.duration;
        if inside || crossed || wait == 0 {
            if let Err(e) = self.begin_roll_event(&id) {
                log::warn!("[PLAYBACK] Failed to start pending '{}': {}", id, e);
            }
        } else {
            self.state.timer.secondary_timer = Some(wait);
        }
    }

    // =========================================================================
    // Tick
    // =========================================================================

    /// Advance to the current clock.
    pub fn update(&mut self) -> TickOutcome {
        let clock = self.clock.now();
        let mut outcome = TickOutcome {
            clock,
            ..Default::default()
        };

        if let Some(last) = self.state.internal.last_clock {
            let delta = day_delta(clock, last);
            if delta.abs() > self.config.skip_limit {
                log::warn!("[PLAYBACK] Clock jumped {} ms, recomputing", delta);
                outcome.clock_jumped = true;
                self.rebase_after_jump(clock, delta - self.config.update_rate as i64);
                self.refresh_selection(clock);
            }
        }
        self.state.internal.last_clock = Some(clock);

        self.state.aux_timer.update(clock);
        if self.state.internal.pending.is_some() {
            self.update_pending(clock);
        }
        self.recompute(clock);

        if self.check_finish(clock) {
            outcome.finished = true;
            self.recompute(clock);
        }
        outcome
    }

    /// Carry the loaded run across a clock jump. A run the operator drives
    /// keeps its elapsed time, so every stored instant moves by `shift`.
    /// Roll follows the schedule and is re-targeted from the new clock.
    fn rebase_after_jump(&mut self, clock: i64, shift: i64) {
        match self.state.timer.playback {
            Playback::Play | Playback::Pause => {
                let moved = |value: &mut Option<i64>| {
                    if let Some(t) = value {
                        *t = wrap_day(*t + shift);
                    }
                };
                let state = &mut self.state;
                moved(&mut state.timer.started_at);
                moved(&mut state.timer.finished_at);
                moved(&mut state.internal.paused_at);
                moved(&mut state.runtime.actual_start);
                if let Some(anchor) = state.internal.anchor.as_mut() {
                    anchor.actual = wrap_day(anchor.actual + shift);
                }
            }
            Playback::Roll => {
                let Some(id) = self.state.event_now.as_ref().map(|e| e.id.clone()) else {
                    return;
                };
                let still_running = matches!(
                    self.find_roll_target(clock, None),
                    Some(RollTarget::Running(ref target)) if *target == id
                );
                if !still_running {
                    if let Err(e) = self.roll_to_schedule(clock, None) {
                        log::warn!("[PLAYBACK] Roll lost its target: {}", e);
                        self.stop_inner();
                    }
                }
            }
            Playback::Stop => {}
        }
    }

    /// The finish callback the runtime should schedule, with the time left
    /// until it is due.
    pub fn finish_ticket(&self) -> Option<(FinishTicket, i64)> {
        let timer = &self.state.timer;
        if !matches!(timer.playback, Playback::Play | Playback::Roll) || timer.finished_at.is_some()
        {
            return None;
        }
        let event = self.state.event_now.as_ref()?;
        let started_at = timer.started_at?;
        let current = timer.current?;
        Some((
            FinishTicket {
                entry_id: event.id.clone(),
                started_at,
            },
            (current - self.config.trigger_ahead).max(0),
        ))
    }

    /// Run a scheduled finish. Tickets for a run that no longer exists are
    /// discarded.
    pub fn complete_finish(&mut self, ticket: &FinishTicket) -> bool {
        let valid = self
            .state
            .event_now
            .as_ref()
            .is_some_and(|e| e.id == ticket.entry_id)
            && self.state.timer.started_at == Some(ticket.started_at)
            && self.state.timer.finished_at.is_none();
        if !valid {
            log::debug!(
                "[PLAYBACK] Discarding stale finish ticket for '{}'",
                ticket.entry_id
            );
            return false;
        }
        self.update().finished
    }

    fn check_finish(&mut self, clock: i64) -> bool {
        let timer = &self.state.timer;
        if !matches!(timer.playback, Playback::Play | Playback::Roll) || timer.finished_at.is_some()
        {
            return false;
        }
        let (Some(event), Some(current)) = (self.state.event_now.as_ref(), timer.current) else {
            return false;
        };
        if current > self.config.trigger_ahead {
            return false;
        }
        let id = event.id.clone();
        let end_action = event.end_action;
        self.state.timer.finished_at = Some(wrap_day(clock + current));
        log::info!("[PLAYBACK] '{}' finished", id);
        self.emit(TimerLifeCycle::OnFinish);

        if self.state.timer.playback == Playback::Roll {
            if let Err(e) = self.roll_to_schedule(clock, Some(&id)) {
                log::warn!("[PLAYBACK] Roll could not continue: {}", e);
            }
            return true;
        }
        match end_action {
            EndAction::None => {}
            EndAction::Stop => self.stop_inner(),
            EndAction::PlayNext => match self.playable_after(&id) {
                Some(next) => {
                    if let Err(e) = self
                        .load_event(&next, clock)
                        .and_then(|_| self.start_at(clock))
                    {
                        log::warn!("[PLAYBACK] Could not play next after '{}': {}", id, e);
                    }
                }
                None => log::info!("[PLAYBACK] '{}' is the last event, continuing", id),
            },
        }
        true
    }

    // =========================================================================
    // Rundown edits
    // =========================================================================

    /// Apply a structural edit and refresh the loaded event.
    pub fn edit(&mut self, edit: RundownEdit) -> Result<EditOutcome> {
        let outcome = apply_edit(&mut self.rundown, edit, &self.metadata)?;
        self.metadata = outcome.metadata.clone();
        let clock = self.clock.now();
        self.refresh_selection(clock);
        self.recompute(clock);
        Ok(outcome)
    }

    /// Re-resolve the loaded, next and pending entries from the rundown.
    fn refresh_selection(&mut self, clock: i64) {
        if let Some(id) = self.state.event_now.as_ref().map(|e| e.id.clone()) {
            match self.rundown.event(&id).cloned() {
                Some(event) => self.select(event),
                None => {
                    log::warn!("[PLAYBACK] Loaded event '{}' was removed", id);
                    self.stop_inner();
                }
            }
        }
        if let Some(id) = self.state.internal.pending.clone() {
            if self.metadata.playable_index(&id).is_some() {
                self.state.event_next = self.rundown.event(&id).cloned();
            } else if let Err(e) = self.roll_to_schedule(clock, None) {
                log::warn!("[PLAYBACK] Roll lost its target: {}", e);
                self.stop_inner();
            }
        }
    }

    // =========================================================================
    // Restore
    // =========================================================================

    /// Snapshot playback for a restart.
    pub fn restore_point(&self, now_epoch: i64) -> RestorePoint {
        RestorePoint::from_state(&self.state, now_epoch)
    }

    /// Re-seed playback from a restore point. Restoring fires no lifecycle
    /// events.
    pub fn restore(&mut self, point: &RestorePoint, now_epoch: i64) -> Result<()> {
        if point.is_stale(now_epoch) {
            return Err(EngineError::StaleRestorePoint {
                age_ms: point.age(now_epoch),
            });
        }
        let clock = self.clock.now();
        let queued = self.events.len();
        match point.playback {
            Playback::Stop => {
                if self.state.timer.playback != Playback::Stop {
                    self.stop_inner();
                }
            }
            Playback::Roll => {
                if self.find_roll_target(clock, None).is_none() {
                    return Err(EngineError::NoTarget("playable"));
                }
                self.stop_inner();
                self.roll_to_schedule(clock, None)?;
                self.state.runtime.actual_start = point.first_start;
            }
            Playback::Play | Playback::Pause => {
                let id = point
                    .selected_event_id
                    .as_deref()
                    .ok_or(EngineError::NoEventLoaded)?;
                let event = self
                    .rundown
                    .event(id)
                    .cloned()
                    .ok_or_else(|| EngineError::EventNotFound(id.to_string()))?;
                self.state.timer = TimerState {
                    duration: Some(event.duration),
                    started_at: point.started_at.or(Some(clock)),
                    added_time: point.added_time,
                    playback: point.playback,
                    ..Default::default()
                };
                let internal = &mut self.state.internal;
                internal.paused_at = match point.playback {
                    Playback::Pause => point.paused_at.or(Some(clock)),
                    _ => None,
                };
                internal.force_finish = None;
                internal.pending = None;
                internal.anchor = point.first_start.map(|actual| RelativeAnchor {
                    planned: self.metadata.first_start.unwrap_or(actual),
                    actual,
                    group: None,
                });
                self.state.runtime.actual_start = point.first_start;
                self.select(event);
            }
        }
        self.events.truncate(queued);
        log::info!("[PLAYBACK] Restored {} state", point.playback);
        self.recompute(clock);
        Ok(())
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn resolve_target(&self, target: &EventTarget) -> Result<EntryId> {
        let playable = &self.metadata.playable_event_order;
        match target {
            EventTarget::Id(id) if self.metadata.playable_index(id).is_some() => Ok(id.clone()),
            EventTarget::Id(id) => Err(EngineError::EventNotFound(id.clone())),
            EventTarget::Index(index) => playable
                .get(*index)
                .cloned()
                .ok_or_else(|| EngineError::EventNotFound(format!("index {index}"))),
            EventTarget::Cue(cue) => playable
                .iter()
                .find(|id| self.rundown.event(id).is_some_and(|e| &e.cue == cue))
                .cloned()
                .ok_or_else(|| EngineError::EventNotFound(format!("cue {cue}"))),
        }
    }

    /// Load an event paused at zero.
    fn load_event(&mut self, id: &str, clock: i64) -> Result<()> {
        let event = self
            .rundown
            .event(id)
            .cloned()
            .ok_or_else(|| EngineError::EventNotFound(id.to_string()))?;
        log::info!("[PLAYBACK] Loaded '{}' {}", event.id, event.title);
        self.state.timer = TimerState {
            duration: Some(event.duration),
            started_at: Some(clock),
            playback: Playback::Pause,
            ..Default::default()
        };
        let internal = &mut self.state.internal;
        internal.paused_at = Some(clock);
        internal.force_finish = None;
        internal.pending = None;
        self.select(event);
        self.emit(TimerLifeCycle::OnLoad);
        Ok(())
    }

    /// Make `event` the loaded event and resolve its neighbours.
    fn select(&mut self, event: EventEntry) {
        let next = self
            .playable_after(&event.id)
            .and_then(|id| self.rundown.event(&id).cloned());
        let group = event
            .parent
            .as_deref()
            .and_then(|parent| self.rundown.group(parent))
            .cloned();
        self.state.runtime.selected_event_index = self.metadata.playable_index(&event.id);
        self.state.event_next = next;
        self.state.group_now = group;
        self.state.event_now = Some(event);
    }

    /// Shift `started_at` past an ongoing pause.
    fn resume(&mut self, clock: i64) {
        if let Some(paused_at) = self.state.internal.paused_at.take() {
            let paused_for = get_elapsed(paused_at, clock);
            self.state.timer.started_at = self
                .state
                .timer
                .started_at
                .map(|s| wrap_day(s + paused_for));
        }
    }

    /// Record the actual start and the relative baseline.
    fn mark_started(&mut self) {
        let (Some(event), Some(actual)) = (&self.state.event_now, self.state.timer.started_at) else {
            return;
        };
        let anchor = RelativeAnchor {
            planned: event.delayed_start(),
            actual,
            group: event.parent.clone(),
        };
        let runtime = &mut self.state.runtime;
        let internal = &mut self.state.internal;
        if runtime.actual_start.is_none() {
            runtime.actual_start = Some(actual);
            internal.anchor = Some(anchor);
        } else if self.config.relative_reset == RelativeReset::Group
            && internal.anchor.as_ref().map(|a| &a.group) != Some(&anchor.group)
        {
            internal.anchor = Some(anchor);
        }
    }

    /// Next playable event after `id`, even when `id` itself is skipped.
    fn playable_after(&self, id: &str) -> Option<EntryId> {
        if self.metadata.playable_index(id).is_some() {
            return self.metadata.next_playable(Some(id)).cloned();
        }
        let order = &self.metadata.timed_event_order;
        let position = order.iter().position(|e| e == id)?;
        order[position + 1..]
            .iter()
            .find(|e| self.metadata.playable_index(e).is_some())
            .cloned()
    }

    fn playable_before(&self, id: &str) -> Option<EntryId> {
        if self.metadata.playable_index(id).is_some() {
            return self.metadata.previous_playable(id).cloned();
        }
        let order = &self.metadata.timed_event_order;
        let position = order.iter().position(|e| e == id)?;
        order[..position]
            .iter()
            .rev()
            .find(|e| self.metadata.playable_index(e).is_some())
            .cloned()
    }

    // =========================================================================
    // Derived state
    // =========================================================================

    /// Recompute every derived field for `clock`.
    fn recompute(&mut self, clock: i64) {
        self.state.clock = clock;
        let paused_time = self
            .state
            .internal
            .paused_at
            .map_or(0, |p| get_elapsed(p, clock));
        let pending = self.state.internal.pending.is_some();

        let (warning, danger) = match (&self.state.event_now, &self.state.event_next) {
            (Some(e), _) => (e.time_warning, e.time_danger),
            (None, Some(e)) if pending => (e.time_warning, e.time_danger),
            _ => (0, 0),
        };

        match (&self.state.event_now, self.state.timer.started_at) {
            (Some(event), Some(started_at)) => {
                let end_target = self.state.internal.force_finish.or_else(|| {
                    event
                        .count_to_end
                        .then(|| wrap_day(event.time_end + event.delay))
                });
                let timer = &mut self.state.timer;
                let span = match end_target {
                    Some(end) => calculate_duration(started_at, end),
                    None => event.duration,
                };
                timer.current = match end_target {
                    Some(end) => get_current_to_end(
                        Some(started_at),
                        end,
                        timer.added_time,
                        paused_time,
                        clock,
                    ),
                    None => get_current(
                        Some(started_at),
                        span,
                        timer.added_time,
                        paused_time,
                        clock,
                    ),
                };
                timer.duration = Some(span);
                timer.elapsed = Some((get_elapsed(started_at, clock) - paused_time).max(0));
                timer.expected_finish = get_expected_finish(
                    Some(started_at),
                    timer.finished_at,
                    span,
                    paused_time,
                    timer.added_time,
                )
                .map(wrap_day);
                timer.secondary_timer = None;
            }
            _ if pending => {
                let timer = &mut self.state.timer;
                timer.elapsed = None;
                timer.expected_finish = None;
                timer.started_at = None;
            }
            _ => {
                let timer = &mut self.state.timer;
                timer.current = None;
                timer.elapsed = None;
                timer.expected_finish = None;
                timer.secondary_timer = None;
            }
        }

        let timer = &mut self.state.timer;
        timer.phase = get_timer_phase(timer.playback, timer.current, warning, danger, pending);

        self.recompute_offsets(clock, paused_time);

        let runtime = &mut self.state.runtime;
        runtime.num_events = self.metadata.playable_event_order.len();
        runtime.planned_start = self.metadata.first_start;
        runtime.planned_end = self.metadata.last_end;
        runtime.expected_end = self.state.offset.expected_rundown_end;
        self.state.internal.total_delay = self.metadata.total_delay;
    }

    fn recompute_offsets(&mut self, clock: i64, paused_time: i64) {
        let mode = self.config.offset_mode;
        let (Some(event), Some(started_at)) = (&self.state.event_now, self.state.timer.started_at)
        else {
            self.state.offset = OffsetState {
                mode,
                ..Default::default()
            };
            return;
        };
        if self.state.timer.playback == Playback::Stop {
            return;
        }

        let inputs = OffsetInputs {
            planned_start: event.delayed_start(),
            started_at,
            current: self.state.timer.current.unwrap_or(0),
            paused_time,
            added_time: self.state.timer.added_time,
        };
        let absolute = get_runtime_offset(&inputs);
        let relative = match &self.state.internal.anchor {
            Some(anchor) => get_relative_offset(&inputs, anchor.planned, anchor.actual),
            None => absolute,
        };
        let active = match mode {
            crate::offset::OffsetMode::Absolute => absolute,
            crate::offset::OffsetMode::Relative => relative,
        };

        let expected_finish = self.state.timer.expected_finish;
        let now_id = event.id.clone();
        let expected_end_of = |target: &str| -> Option<i64> {
            if target == now_id {
                return expected_finish;
            }
            let end = self.expected_start(&now_id, target, clock, active)?
                + self.rundown.event(target)?.duration;
            Some(wrap_day(end))
        };

        let expected_rundown_end = self
            .metadata
            .playable_event_order
            .last()
            .and_then(|last| expected_end_of(last));
        let expected_group_end = self.state.group_now.as_ref().and_then(|group| {
            group
                .entries
                .iter()
                .rev()
                .find(|id| self.metadata.playable_index(id).is_some())
                .and_then(|last| expected_end_of(last))
        });
        let expected_flag_start = self.metadata.playable_index(&now_id).and_then(|index| {
            self.metadata.playable_event_order[index + 1..]
                .iter()
                .find(|id| self.rundown.event(id).is_some_and(|e| e.flag))
                .and_then(|id| self.expected_start(&now_id, id, clock, active))
                .map(wrap_day)
        });

        self.state.offset = OffsetState {
            absolute,
            relative,
            mode,
            expected_group_end,
            expected_rundown_end,
            expected_flag_start,
        };
    }

    /// Expected start of `target`, given the running event `now` and the
    /// current offset. Gaps between the two absorb a behind-schedule offset.
    fn expected_start(&self, now: &str, target: &str, clock: i64, offset: i64) -> Option<i64> {
        let order = &self.metadata.playable_event_order;
        let now_index = self.metadata.playable_index(now)?;
        let target_index = self.metadata.playable_index(target)?;
        if target_index <= now_index {
            return None;
        }
        let now_event = self.rundown.event(now)?;
        let target_event = self.rundown.event(target)?;
        let total_gap: i64 = order[now_index + 1..=target_index]
            .iter()
            .filter_map(|id| self.rundown.event(id))
            .map(|e| e.gap)
            .sum();
        let linked_and_next = target_event.link_start && target_index == now_index + 1;
        let normalised_start =
            target_event.normalised_start() - i64::from(now_event.day_offset) * DAY_TO_MS;
        Some(get_expected_start(
            normalised_start,
            total_gap,
            linked_and_next,
            clock,
            offset,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::RundownError;
    use crate::playback::TimerPhase;
    use crate::rundown::{Entry, GroupEntry};

    const MIN: i64 = 60_000;
    const HOUR: i64 = 60 * MIN;

    /// a 10:00-10:10, b 10:10-10:20, c 10:30-10:40
    fn rundown() -> Rundown {
        let mut rundown = Rundown::new("r", "Show");
        rundown.push(Entry::Event(EventEntry::new("a", 10 * HOUR, 10 * MIN).with_cue("1")));
        rundown.push(Entry::Event(EventEntry::new("b", 10 * HOUR + 10 * MIN, 10 * MIN)));
        rundown.push(Entry::Event(EventEntry::new("c", 10 * HOUR + 30 * MIN, 10 * MIN)));
        rundown
    }

    fn engine_at(clock: i64, rundown: Rundown) -> (PlaybackEngine, ManualClock) {
        let manual = ManualClock::new(clock);
        let engine =
            PlaybackEngine::new(Arc::new(manual.clone()), EngineConfig::default()).with_rundown(rundown);
        (engine, manual)
    }

    fn tick(engine: &mut PlaybackEngine, clock: &ManualClock, ms: i64) -> TickOutcome {
        // advance in steps below the skip limit
        let mut outcome = TickOutcome::default();
        let mut left = ms;
        while left > 0 {
            let step = left.min(500);
            clock.advance(step);
            left -= step;
            let o = engine.update();
            outcome.finished |= o.finished;
            outcome.clock_jumped |= o.clock_jumped;
            outcome.clock = o.clock;
        }
        outcome
    }

    #[test]
    fn test_load_is_paused_at_zero() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.load(&EventTarget::Id("b".to_string())).unwrap();
        tick(&mut engine, &clock, 5000);

        let state = engine.state();
        assert_eq!(state.timer.playback, Playback::Pause);
        assert_eq!(state.timer.current, Some(10 * MIN));
        assert_eq!(state.timer.elapsed, Some(0));
        assert_eq!(state.event_now.as_ref().unwrap().id, "b");
        assert_eq!(state.event_next.as_ref().unwrap().id, "c");
        assert_eq!(state.runtime.selected_event_index, Some(1));
        assert!(state.is_consistent());
        assert_eq!(engine.take_events(), vec![TimerLifeCycle::OnLoad]);
    }

    #[test]
    fn test_start_counts_down() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        tick(&mut engine, &clock, 1000);

        let state = engine.state();
        assert_eq!(state.event_now.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.playback, Playback::Play);
        assert_eq!(state.timer.current, Some(10 * MIN - 1000));
        assert_eq!(state.timer.elapsed, Some(1000));
        assert_eq!(state.timer.phase, TimerPhase::Default);
        assert_eq!(state.runtime.actual_start, Some(10 * HOUR));
        assert_eq!(
            engine.take_events(),
            vec![TimerLifeCycle::OnLoad, TimerLifeCycle::OnStart]
        );
        // starting while playing is a no-op
        engine.start().unwrap();
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_pause_guard_and_resume_rebases() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        assert_eq!(
            engine.pause(),
            Err(EngineError::InvalidTransition {
                action: "pause",
                playback: Playback::Stop
            })
        );
        engine.start().unwrap();
        tick(&mut engine, &clock, 2000);
        engine.pause().unwrap();
        tick(&mut engine, &clock, 5000);
        assert_eq!(engine.state().timer.current, Some(10 * MIN - 2000));
        assert_eq!(engine.state().timer.phase, TimerPhase::Default);

        engine.start().unwrap();
        tick(&mut engine, &clock, 1000);
        let timer = &engine.state().timer;
        assert_eq!(timer.current, Some(10 * MIN - 3000));
        assert_eq!(timer.elapsed, Some(3000));
        assert_eq!(timer.started_at, Some(10 * HOUR + 5000));
    }

    #[test]
    fn test_stop_clears_state() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        tick(&mut engine, &clock, 1000);
        engine.stop().unwrap();

        let state = engine.state();
        assert_eq!(state.timer.playback, Playback::Stop);
        assert_eq!(state.timer.phase, TimerPhase::None);
        assert_eq!(state.timer.current, None);
        assert_eq!(state.timer.started_at, None);
        assert!(state.event_now.is_none() && state.event_next.is_none());
        assert_eq!(state.runtime.actual_start, None);
        assert!(state.is_consistent());
        assert!(matches!(
            engine.stop(),
            Err(EngineError::InvalidTransition { action: "stop", .. })
        ));
    }

    #[test]
    fn test_load_missing_event_is_rejected() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        let before = engine.state().clone();
        assert_eq!(
            engine.load(&EventTarget::Id("zz".to_string())),
            Err(EngineError::EventNotFound("zz".to_string()))
        );
        assert_eq!(engine.state(), &before);
    }

    #[test]
    fn test_load_by_index_and_cue() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.load(&EventTarget::Index(2)).unwrap();
        assert_eq!(engine.state().event_now.as_ref().unwrap().id, "c");
        engine.load(&EventTarget::Cue("1".to_string())).unwrap();
        assert_eq!(engine.state().event_now.as_ref().unwrap().id, "a");
        assert!(engine.load(&EventTarget::Index(9)).is_err());
    }

    #[test]
    fn test_next_and_previous_keep_run_state() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        engine.next().unwrap();
        assert_eq!(engine.state().event_now.as_ref().unwrap().id, "b");
        assert_eq!(engine.state().timer.playback, Playback::Play);

        engine.pause().unwrap();
        engine.previous().unwrap();
        assert_eq!(engine.state().event_now.as_ref().unwrap().id, "a");
        assert_eq!(engine.state().timer.playback, Playback::Pause);
        assert_eq!(engine.previous(), Err(EngineError::NoTarget("previous")));
    }

    #[test]
    fn test_reload_restarts_event() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        assert!(engine.reload().is_err());
        engine.start().unwrap();
        tick(&mut engine, &clock, 3000);
        engine.take_events();
        engine.reload().unwrap();
        assert_eq!(engine.state().timer.current, Some(10 * MIN));
        assert_eq!(
            engine.take_events(),
            vec![TimerLifeCycle::OnLoad, TimerLifeCycle::OnStart]
        );
    }

    #[test]
    fn test_finish_overtime_and_add_time() {
        let mut r = Rundown::new("r", "Show");
        r.push(Entry::Event(EventEntry::new("a", 0, 2000)));
        let (mut engine, clock) = engine_at(HOUR, r);
        engine.start().unwrap();
        engine.take_events();

        let outcome = tick(&mut engine, &clock, 2500);
        assert!(outcome.finished);
        let timer = &engine.state().timer;
        assert_eq!(timer.phase, TimerPhase::Overtime);
        assert_eq!(timer.current, Some(-500));
        assert!(timer.finished_at.is_some());
        assert_eq!(timer.expected_finish, timer.finished_at);
        assert_eq!(engine.take_events(), vec![TimerLifeCycle::OnFinish]);

        // finish fires once
        tick(&mut engine, &clock, 1000);
        assert!(engine.take_events().is_empty());

        // rolling into overtime is rejected
        assert!(matches!(
            engine.roll(),
            Err(EngineError::InvalidTransition { action: "roll", .. })
        ));

        engine.add_time(5000).unwrap();
        assert_eq!(engine.state().timer.finished_at, None);
        assert_eq!(engine.state().timer.current, Some(3500));
    }

    #[test]
    fn test_end_actions() {
        let mut r = Rundown::new("r", "Show");
        r.push(Entry::Event(
            EventEntry::new("a", 0, 1000).with_end_action(EndAction::PlayNext),
        ));
        r.push(Entry::Event(
            EventEntry::new("b", 1000, 1000).with_end_action(EndAction::Stop),
        ));
        let (mut engine, clock) = engine_at(HOUR, r);
        engine.start().unwrap();
        tick(&mut engine, &clock, 1000);
        assert_eq!(engine.state().event_now.as_ref().unwrap().id, "b");
        assert_eq!(engine.state().timer.playback, Playback::Play);

        tick(&mut engine, &clock, 1000);
        assert_eq!(engine.state().timer.playback, Playback::Stop);
        let events = engine.take_events();
        assert_eq!(events.last(), Some(&TimerLifeCycle::OnStop));
    }

    #[test]
    fn test_finish_fires_within_trigger_ahead() {
        let mut r = Rundown::new("r", "Show");
        r.push(Entry::Event(EventEntry::new("a", 0, 1000)));
        let (mut engine, clock) = engine_at(HOUR, r);
        engine.start().unwrap();
        clock.advance(995);
        assert!(engine.update().finished);
        assert_eq!(engine.state().timer.finished_at, Some(HOUR + 1000));
    }

    #[test]
    fn test_finish_ticket_invalidated_by_reload() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        let (ticket, due) = engine.finish_ticket().unwrap();
        assert_eq!(ticket.entry_id, "a");
        assert_eq!(due, 10 * MIN - 10);

        clock.advance(500);
        engine.update();
        engine.reload().unwrap();
        assert!(!engine.complete_finish(&ticket));

        let (fresh, _) = engine.finish_ticket().unwrap();
        clock.advance(10 * MIN);
        assert!(engine.complete_finish(&fresh));
        assert!(engine.state().timer.finished_at.is_some());
    }

    #[test]
    fn test_roll_inside_window() {
        let (mut engine, clock) = engine_at(10 * HOUR + 5 * MIN, rundown());
        engine.roll().unwrap();
        let state = engine.state();
        assert_eq!(state.timer.playback, Playback::Roll);
        assert_eq!(state.event_now.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.current, Some(5 * MIN));
        assert!(state.is_consistent());

        // a finishes, b is scheduled right after
        tick(&mut engine, &clock, 5 * MIN);
        assert_eq!(engine.state().event_now.as_ref().unwrap().id, "b");
        assert_eq!(engine.state().timer.playback, Playback::Roll);
    }

    #[test]
    fn test_roll_pending_until_start() {
        let (mut engine, clock) = engine_at(9 * HOUR + 59 * MIN, rundown());
        engine.roll().unwrap();
        engine.update();
        let state = engine.state();
        assert_eq!(state.timer.phase, TimerPhase::Pending);
        assert!(state.event_now.is_none());
        assert_eq!(state.event_next.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.secondary_timer, Some(MIN));
        assert!(state.is_consistent());
        assert!(matches!(
            engine.roll(),
            Err(EngineError::InvalidTransition { action: "roll", .. })
        ));
        assert!(matches!(
            engine.next(),
            Err(EngineError::InvalidTransition { action: "next", .. })
        ));

        tick(&mut engine, &clock, MIN);
        let state = engine.state();
        assert_eq!(state.event_now.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.phase, TimerPhase::Default);
    }

    #[test]
    fn test_roll_after_last_waits_for_tomorrow() {
        let (mut engine, _clock) = engine_at(11 * HOUR, rundown());
        engine.roll().unwrap();
        engine.update();
        let state = engine.state();
        assert_eq!(state.event_next.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.secondary_timer, Some(23 * HOUR));
    }

    #[test]
    fn test_offset_behind_when_started_late() {
        let (mut engine, clock) = engine_at(10 * HOUR + 2 * MIN, rundown());
        engine.start().unwrap();
        tick(&mut engine, &clock, 1000);
        let offset = &engine.state().offset;
        assert_eq!(offset.absolute, -2 * MIN);
        assert_eq!(offset.relative, 0);
        // b follows a without a gap, c has 10 min of gap that absorbs the delay
        assert_eq!(offset.expected_rundown_end, Some(10 * HOUR + 40 * MIN));
    }

    #[test]
    fn test_offset_expected_end_without_gap() {
        let mut r = rundown();
        if let Some(Entry::Event(c)) = r.entries.get_mut("c") {
            c.time_start = 10 * HOUR + 20 * MIN;
        }
        let (mut engine, _clock) = engine_at(10 * HOUR + 2 * MIN, r);
        engine.start().unwrap();
        assert_eq!(
            engine.state().offset.expected_rundown_end,
            Some(10 * HOUR + 32 * MIN)
        );
    }

    #[test]
    fn test_skip_excludes_from_next() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        engine.skip("b").unwrap();
        assert_eq!(engine.state().event_next.as_ref().unwrap().id, "c");
        assert_eq!(engine.state().runtime.num_events, 2);
        assert_eq!(engine.skip("zz"), Err(EngineError::EventNotFound("zz".to_string())));
    }

    #[test]
    fn test_removing_loaded_event_stops() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        engine
            .edit(RundownEdit::Remove {
                ids: vec!["a".to_string()],
            })
            .unwrap();
        assert_eq!(engine.state().timer.playback, Playback::Stop);
        assert!(engine.state().is_consistent());
    }

    #[test]
    fn test_edit_with_unknown_children_is_rejected() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        let before = engine.state().clone();
        let mut group = GroupEntry::new("g", "Act");
        group.entries = vec!["ghost".to_string()];
        let err = engine.edit(RundownEdit::Add {
            entry: Entry::Group(group),
            after: None,
            parent: None,
        });
        assert!(matches!(
            err,
            Err(EngineError::Rundown(RundownError::EntryNotFound(ref id))) if id == "ghost"
        ));
        assert_eq!(engine.state(), &before);
        assert!(engine.rundown().get("g").is_none());
    }

    #[test]
    fn test_group_now_resolved() {
        let mut r = Rundown::new("r", "Show");
        r.push_group(
            GroupEntry::new("g", "Act"),
            vec![Entry::Event(EventEntry::new("a", 0, 1000))],
        );
        let (mut engine, _clock) = engine_at(0, r);
        engine.start().unwrap();
        assert_eq!(engine.state().group_now.as_ref().unwrap().id, "g");
    }

    #[test]
    fn test_restore_round_trip() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        tick(&mut engine, &clock, 4000);
        let point = engine.restore_point(1_000_000);

        let (mut fresh, _) = engine_at(10 * HOUR + 4000, rundown());
        fresh.restore(&point, 1_000_000 + 4000).unwrap();
        assert_eq!(fresh.state().timer.playback, Playback::Play);
        assert_eq!(fresh.state().timer.current, Some(10 * MIN - 4000));
        assert!(fresh.take_events().is_empty());

        let stale = RestorePoint {
            epoch: 0,
            ..point
        };
        assert!(matches!(
            fresh.restore(&stale, 2 * DAY_TO_MS),
            Err(EngineError::StaleRestorePoint { .. })
        ));
    }

    #[test]
    fn test_failed_restore_leaves_state() {
        let (mut engine, _clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        engine.take_events();
        engine.skip("a").unwrap();
        engine.skip("b").unwrap();
        engine.skip("c").unwrap();
        let before = engine.state().clone();

        let point = RestorePoint {
            playback: Playback::Roll,
            epoch: 1_000,
            ..Default::default()
        };
        assert_eq!(
            engine.restore(&point, 2_000),
            Err(EngineError::NoTarget("playable"))
        );
        assert_eq!(engine.state(), &before);
        assert!(engine.take_events().is_empty());
    }

    #[test]
    fn test_clock_jump_detected() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        engine.update();
        clock.advance(5000);
        assert!(engine.update().clock_jumped);
        clock.advance(100);
        assert!(!engine.update().clock_jumped);
    }

    #[test]
    fn test_clock_step_back_keeps_run() {
        let mut r = rundown();
        if let Some(Entry::Event(a)) = r.entries.get_mut("a") {
            a.end_action = EndAction::PlayNext;
        }
        let (mut engine, clock) = engine_at(10 * HOUR, r);
        engine.start().unwrap();
        tick(&mut engine, &clock, 500);
        engine.take_events();

        clock.set(10 * HOUR - 5000);
        let outcome = engine.update();
        assert!(outcome.clock_jumped);
        assert!(!outcome.finished);
        let state = engine.state();
        assert_eq!(state.event_now.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.playback, Playback::Play);
        assert_eq!(state.timer.elapsed, Some(532));
        assert_eq!(state.timer.current, Some(10 * MIN - 532));
        assert_eq!(state.timer.finished_at, None);
        assert!(state.is_consistent());
        assert!(engine.take_events().is_empty());

        tick(&mut engine, &clock, 1000);
        assert_eq!(engine.state().timer.elapsed, Some(1532));
    }

    #[test]
    fn test_clock_step_back_while_paused() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        engine.start().unwrap();
        tick(&mut engine, &clock, 2000);
        engine.pause().unwrap();
        tick(&mut engine, &clock, 1000);

        clock.set(9 * HOUR);
        engine.update();
        let timer = &engine.state().timer;
        assert_eq!(timer.playback, Playback::Pause);
        assert_eq!(timer.current, Some(10 * MIN - 2000));
        assert_eq!(timer.finished_at, None);
    }

    #[test]
    fn test_clock_step_back_during_roll_waits_again() {
        let (mut engine, clock) = engine_at(10 * HOUR + 5 * MIN, rundown());
        engine.roll().unwrap();
        engine.update();
        engine.take_events();

        clock.set(9 * HOUR + 59 * MIN);
        let outcome = engine.update();
        assert!(outcome.clock_jumped);
        assert!(!outcome.finished);
        let state = engine.state();
        assert_eq!(state.timer.playback, Playback::Roll);
        assert_eq!(state.timer.phase, TimerPhase::Pending);
        assert_eq!(state.event_next.as_ref().unwrap().id, "a");
        assert_eq!(state.timer.secondary_timer, Some(MIN));
        assert!(!engine.take_events().contains(&TimerLifeCycle::OnFinish));
    }

    #[test]
    fn test_aux_timer_actions() {
        let (mut engine, clock) = engine_at(0, rundown());
        engine.apply(&ControlAction::Aux(AuxAction::SetDuration(10_000))).unwrap();
        engine.apply(&ControlAction::Aux(AuxAction::Start)).unwrap();
        tick(&mut engine, &clock, 1000);
        assert_eq!(engine.state().aux_timer.current, 9000);
    }

    #[test]
    fn test_guards_stay_consistent() {
        let (mut engine, clock) = engine_at(10 * HOUR, rundown());
        let actions = [
            ControlAction::Start(None),
            ControlAction::Pause,
            ControlAction::Next,
            ControlAction::Roll,
            ControlAction::Reload,
            ControlAction::Stop,
            ControlAction::Previous,
            ControlAction::Roll,
            ControlAction::Stop,
        ];
        for action in &actions {
            let _ = engine.apply(action);
            tick(&mut engine, &clock, 100);
            assert!(engine.state().is_consistent(), "after {action}");
        }
    }
}
