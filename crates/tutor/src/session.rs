use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use strumlight_domain::{
    ChordCatalog, ChordEvent, ChordId, ChordShape, FingerAssignment, StatusVector, Timeline,
};
use strumlight_link::{Command, Notification};

use crate::analytics::{EventResult, SessionReport};
use crate::feedback::{FeedbackInterpreter, OpenStringRule, Verdict};

/// When a correctly played chord hands over to the next one.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum AdvancePolicy {
    /// Move on as soon as the chord is played correctly.
    #[default]
    OnSuccess,
    /// Hold every chord for its full duration, keeping the song's tempo.
    FixedDuration,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Idle,
    Running,
    Paused,
    Completed,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionOptions {
    pub policy: AdvancePolicy,
    /// Pause after a missed chord before the next target, on-success only.
    pub grace_delay_ms: u64,
    pub open_strings: OpenStringRule,
    pub capo: Option<u8>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            policy: AdvancePolicy::OnSuccess,
            grace_delay_ms: 500,
            open_strings: OpenStringRule::TolerateNoNote,
            capo: None,
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Score {
    pub correct: u32,
    pub attempted: u32,
    pub streak: u32,
    pub best_streak: u32,
}

impl Score {
    /// `correct / attempted`, or zero before anything was attempted.
    pub fn accuracy(&self) -> f32 {
        if self.attempted == 0 {
            0.0
        } else {
            self.correct as f32 / self.attempted as f32
        }
    }

    fn record_hit(&mut self) {
        self.correct += 1;
        self.attempted += 1;
        self.streak += 1;
        self.best_streak = self.best_streak.max(self.streak);
    }

    fn record_miss(&mut self) {
        self.attempted += 1;
        self.streak = 0;
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EventOutcome {
    Pending,
    Correct,
    Missed,
}

#[derive(Clone, Debug, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "detail", rename_all = "snake_case")]
pub enum SessionError {
    #[error("malformed notification: {0}")]
    Decode(String),
    #[error("chord {0} is not in the catalog")]
    UnknownChord(String),
    #[error("command {command} not delivered: {reason}")]
    LinkSend { command: String, reason: String },
    #[error("device link lost: {0}")]
    LinkDisconnected(String),
}

/// Output consumed by renderers and by the runner that owns the link.
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SessionEvent {
    PhaseChanged {
        phase: SessionPhase,
    },
    TargetChanged {
        index: usize,
        chord: ChordId,
        finger_hint: Option<u8>,
        shape: Option<ChordShape>,
        fingers: Option<FingerAssignment>,
    },
    Command {
        command: Command,
    },
    Feedback {
        index: usize,
        per_string: StatusVector,
        all_correct: bool,
    },
    ScoreUpdated {
        correct: u32,
        attempted: u32,
        accuracy: f32,
        streak: u32,
    },
    EventMissed {
        index: usize,
        chord: ChordId,
    },
    StaleFeedback {
        chord_label: String,
    },
    Error {
        error: SessionError,
    },
    Completed {
        score: Score,
        accuracy: f32,
    },
}

/// What happened to a notification handed to the session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FeedbackOutcome {
    /// The session is not running.
    Ignored,
    /// The label does not match the current target.
    Stale,
    Evaluated { all_correct: bool, scored: bool },
}

/// Mutable aggregate the state machine owns.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct SessionState {
    pub elapsed: Duration,
    pub active_index: Option<usize>,
    pub last_feedback: Option<Verdict>,
    pub score: Score,
    pub completed: bool,
}

/// Read-only view of the current target, handed to simulated feedback.
#[derive(Clone, Copy, Debug)]
pub struct TargetView<'a> {
    pub index: usize,
    pub chord: &'a ChordId,
    pub shape: Option<&'a ChordShape>,
    pub elapsed_ms: u64,
    pub satisfied: bool,
}

#[derive(Clone, Debug)]
struct ActiveEvent {
    index: usize,
    started_at: u64,
    deadline: u64,
    satisfied: bool,
    feedback_received: bool,
    shape: Option<ChordShape>,
}

/// Timed practice over a chord timeline. Driven externally by [`tick`] and
/// [`apply_notification`]; all output is queued and drained with
/// [`take_events`].
///
/// [`tick`]: PracticeSession::tick
/// [`apply_notification`]: PracticeSession::apply_notification
/// [`take_events`]: PracticeSession::take_events
pub struct PracticeSession {
    timeline: Timeline,
    catalog: Arc<ChordCatalog>,
    options: SessionOptions,
    interpreter: FeedbackInterpreter,
    phase: SessionPhase,
    state: SessionState,
    cursor: usize,
    next_activation_at: u64,
    active: Option<ActiveEvent>,
    outcomes: Vec<EventOutcome>,
    finished_early: bool,
    outbox: Vec<SessionEvent>,
}

impl PracticeSession {
    pub fn new(timeline: Timeline, catalog: Arc<ChordCatalog>, options: SessionOptions) -> Self {
        let next_activation_at = timeline.get(0).map(|event| event.start_ms).unwrap_or(0);
        let outcomes = vec![EventOutcome::Pending; timeline.len()];
        Self {
            interpreter: FeedbackInterpreter::new(options.open_strings),
            timeline,
            catalog,
            options,
            phase: SessionPhase::Idle,
            state: SessionState::default(),
            cursor: 0,
            next_activation_at,
            active: None,
            outcomes,
            finished_early: false,
            outbox: Vec::new(),
        }
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn score(&self) -> Score {
        self.state.score
    }

    pub fn accuracy(&self) -> f32 {
        self.state.score.accuracy()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.state.elapsed.as_millis() as u64
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn outcomes(&self) -> &[EventOutcome] {
        &self.outcomes
    }

    pub fn current_event(&self) -> Option<&ChordEvent> {
        self.active
            .as_ref()
            .and_then(|active| self.timeline.get(active.index))
    }

    pub fn target_view(&self) -> Option<TargetView<'_>> {
        let active = self.active.as_ref()?;
        let event = self.timeline.get(active.index)?;
        Some(TargetView {
            index: active.index,
            chord: &event.chord,
            shape: active.shape.as_ref(),
            elapsed_ms: self.elapsed_ms().saturating_sub(active.started_at),
            satisfied: active.satisfied,
        })
    }

    /// Whether any notification has been evaluated for the current target.
    pub fn feedback_received(&self) -> bool {
        self.active
            .as_ref()
            .map(|active| active.feedback_received)
            .unwrap_or(false)
    }

    pub fn take_events(&mut self) -> Vec<SessionEvent> {
        std::mem::take(&mut self.outbox)
    }

    pub fn start(&mut self) {
        if self.phase != SessionPhase::Idle {
            return;
        }
        info!(
            events = self.timeline.len(),
            policy = ?self.options.policy,
            "practice session started"
        );
        self.set_phase(SessionPhase::Running);
        if let Some(fret) = self.options.capo {
            self.emit(SessionEvent::Command {
                command: Command::Capo(fret),
            });
        }
        self.advance();
    }

    pub fn pause(&mut self) {
        if self.phase == SessionPhase::Running {
            self.set_phase(SessionPhase::Paused);
        }
    }

    pub fn resume(&mut self) {
        if self.phase == SessionPhase::Paused {
            self.set_phase(SessionPhase::Running);
        }
    }

    /// Ends the session now; the current target is left unscored.
    pub fn finish(&mut self) {
        if matches!(self.phase, SessionPhase::Running | SessionPhase::Paused) {
            self.finished_early = self.cursor < self.timeline.len();
            self.complete();
        }
    }

    /// Advances the virtual clock. Ignored unless running.
    pub fn tick(&mut self, elapsed: Duration) {
        if self.phase != SessionPhase::Running {
            return;
        }
        self.state.elapsed += elapsed;
        self.advance();
    }

    pub fn apply_notification(&mut self, notification: &Notification) -> FeedbackOutcome {
        if self.phase != SessionPhase::Running {
            return FeedbackOutcome::Ignored;
        }
        let Some(index) = self.active.as_ref().map(|active| active.index) else {
            return self.reject_stale(notification);
        };
        let Some(event) = self.timeline.get(index) else {
            return self.reject_stale(notification);
        };
        if !self.label_matches(&notification.chord_label, &event.chord) {
            return self.reject_stale(notification);
        }

        let Some(active) = self.active.as_mut() else {
            return FeedbackOutcome::Ignored;
        };
        let verdict = match &active.shape {
            Some(shape) => self.interpreter.evaluate(shape, &notification.statuses),
            None => self.interpreter.evaluate_without_shape(&notification.statuses),
        };
        active.feedback_received = true;
        let scored = verdict.all_correct && !active.satisfied;
        if scored {
            active.satisfied = true;
        }
        self.state.last_feedback = Some(verdict.clone());
        self.emit(SessionEvent::Feedback {
            index,
            per_string: verdict.per_string,
            all_correct: verdict.all_correct,
        });

        if scored {
            self.state.score.record_hit();
            self.outcomes[index] = EventOutcome::Correct;
            debug!(index, chord = %self.timeline.events()[index].chord, "chord played correctly");
            self.emit_score();
            if self.options.policy == AdvancePolicy::OnSuccess {
                self.close_active(self.elapsed_ms());
                self.advance();
            }
        }
        FeedbackOutcome::Evaluated {
            all_correct: verdict.all_correct,
            scored,
        }
    }

    /// Surfaces a failure detected outside the state machine.
    pub fn report_error(&mut self, error: SessionError) {
        warn!(%error, "practice session error");
        self.emit(SessionEvent::Error { error });
    }

    pub fn report(&self) -> SessionReport {
        let results = self
            .timeline
            .events()
            .iter()
            .zip(&self.outcomes)
            .enumerate()
            .map(|(index, (event, outcome))| EventResult {
                index,
                chord: event.chord.clone(),
                outcome: *outcome,
            })
            .collect();
        SessionReport {
            score: self.state.score,
            accuracy: self.accuracy(),
            elapsed_ms: self.elapsed_ms(),
            finished_early: self.finished_early || self.phase != SessionPhase::Completed,
            results,
        }
    }

    fn advance(&mut self) {
        let now = self.elapsed_ms();
        loop {
            match &self.active {
                Some(active) if now >= active.deadline => {
                    let deadline = active.deadline;
                    self.close_active(deadline);
                }
                Some(_) => break,
                None if self.cursor >= self.timeline.len() => {
                    self.complete();
                    break;
                }
                None if now >= self.next_activation_at => {
                    self.activate(self.next_activation_at);
                }
                None => break,
            }
        }
    }

    fn activate(&mut self, at: u64) {
        let index = self.cursor;
        let Some(event) = self.timeline.get(index).cloned() else {
            return;
        };
        let lookup = self.catalog.lookup(&event.chord).cloned();
        let shape = match lookup {
            Ok(shape) => Some(shape),
            Err(err) => {
                self.report_error(SessionError::UnknownChord(event.chord.to_string()));
                debug!(%err, "showing target without a shape");
                None
            }
        };
        let fingers = self.catalog.fingers(&event.chord).copied();
        self.active = Some(ActiveEvent {
            index,
            started_at: at,
            deadline: at.saturating_add(event.duration_ms),
            satisfied: false,
            feedback_received: false,
            shape: shape.clone(),
        });
        self.state.active_index = Some(index);
        self.state.last_feedback = None;
        debug!(index, chord = %event.chord, at, "target changed");
        self.emit(SessionEvent::TargetChanged {
            index,
            chord: event.chord.clone(),
            finger_hint: event.finger,
            shape,
            fingers,
        });
        self.emit(SessionEvent::Command {
            command: Command::ShowChord(event.chord),
        });
    }

    /// Retires the active event at virtual time `at` and schedules the next.
    fn close_active(&mut self, at: u64) {
        let Some(active) = self.active.take() else {
            return;
        };
        let missed = !active.satisfied;
        if missed {
            self.state.score.record_miss();
            self.outcomes[active.index] = EventOutcome::Missed;
            let chord = self.timeline.events()[active.index].chord.clone();
            debug!(index = active.index, %chord, "chord missed");
            self.emit(SessionEvent::EventMissed {
                index: active.index,
                chord,
            });
            self.emit_score();
        }

        self.cursor = active.index + 1;
        self.state.active_index = None;
        self.next_activation_at = match self.options.policy {
            AdvancePolicy::FixedDuration => self
                .timeline
                .get(self.cursor)
                .map(|event| event.start_ms)
                .unwrap_or(at),
            AdvancePolicy::OnSuccess => {
                let grace = if missed && self.cursor < self.timeline.len() {
                    self.options.grace_delay_ms
                } else {
                    0
                };
                at.saturating_add(self.timeline.gap_after(active.index))
                    .saturating_add(grace)
            }
        };
    }

    fn complete(&mut self) {
        if self.phase == SessionPhase::Completed {
            return;
        }
        self.active = None;
        self.state.active_index = None;
        self.state.completed = true;
        self.set_phase(SessionPhase::Completed);
        let score = self.state.score;
        info!(
            correct = score.correct,
            attempted = score.attempted,
            accuracy = score.accuracy(),
            "practice session completed"
        );
        self.emit(SessionEvent::Completed {
            score,
            accuracy: score.accuracy(),
        });
    }

    fn label_matches(&self, label: &str, target: &ChordId) -> bool {
        let Ok(reported) = ChordId::parse(label) else {
            return false;
        };
        match (
            self.catalog.canonical_key(&reported),
            self.catalog.canonical_key(target),
        ) {
            (Some(reported), Some(target)) => reported == target,
            _ => reported.matches(target),
        }
    }

    fn reject_stale(&mut self, notification: &Notification) -> FeedbackOutcome {
        debug!(label = %notification.chord_label, "discarding stale notification");
        self.emit(SessionEvent::StaleFeedback {
            chord_label: notification.chord_label.clone(),
        });
        FeedbackOutcome::Stale
    }

    fn set_phase(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.emit(SessionEvent::PhaseChanged { phase });
    }

    fn emit_score(&mut self) {
        let score = self.state.score;
        self.emit(SessionEvent::ScoreUpdated {
            correct: score.correct,
            attempted: score.attempted,
            accuracy: score.accuracy(),
            streak: score.streak,
        });
    }

    fn emit(&mut self, event: SessionEvent) {
        self.outbox.push(event);
    }
}
