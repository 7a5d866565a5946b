use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use strumlight_link::{Command, DeviceLink, LinkError, Notification, Subscription};

use crate::analytics::SessionReport;
use crate::session::{PracticeSession, SessionError, SessionEvent, SessionPhase};
use crate::simulate::VerdictGenerator;

const EVENT_CAPACITY: usize = 256;
const CONTROL_CAPACITY: usize = 16;

/// Where per-string feedback comes from.
pub enum FeedbackSource {
    Link(Arc<dyn DeviceLink>),
    Simulated(Box<dyn VerdictGenerator>),
}

/// What the runner does when the device link drops mid-session.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LinkLossPolicy {
    Pause,
    /// Keep the clock running; unanswered chords are missed.
    #[default]
    Continue,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Pause,
    Resume,
    Finish,
    Abort,
}

/// Drives a [`PracticeSession`] in real time on its own task.
pub struct SessionRunner {
    session: PracticeSession,
    link: Option<Arc<dyn DeviceLink>>,
    generator: Option<Box<dyn VerdictGenerator>>,
    fallback: Option<Box<dyn VerdictGenerator>>,
    tick_interval: Duration,
    link_loss: LinkLossPolicy,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionRunner {
    pub fn new(session: PracticeSession, source: FeedbackSource) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (link, generator) = match source {
            FeedbackSource::Link(link) => (Some(link), None),
            FeedbackSource::Simulated(generator) => (None, Some(generator)),
        };
        Self {
            session,
            link,
            generator,
            fallback: None,
            tick_interval: Duration::from_millis(16),
            link_loss: LinkLossPolicy::default(),
            events,
        }
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn on_link_loss(mut self, policy: LinkLossPolicy) -> Self {
        self.link_loss = policy;
        self
    }

    /// Simulated feedback to switch to if the link drops.
    pub fn with_fallback(mut self, generator: Box<dyn VerdictGenerator>) -> Self {
        self.fallback = Some(generator);
        self
    }

    /// Receivers only see events sent after they subscribe, so call this
    /// before [`spawn`](Self::spawn).
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn spawn(self) -> SessionHandle {
        let (control, control_rx) = mpsc::channel(CONTROL_CAPACITY);
        let task = tokio::spawn(self.run(control_rx));
        SessionHandle { control, task }
    }

    async fn run(mut self, mut control: mpsc::Receiver<Control>) -> SessionReport {
        let mut subscription = None;
        let mut lost = None;
        match self.link.as_ref().map(|link| link.subscribe()) {
            Some(Ok(sub)) => subscription = Some(sub),
            Some(Err(err)) => lost = Some(err),
            None => {}
        }

        // The loss policy can only pause a running session.
        self.session.start();
        if let Some(err) = lost {
            self.handle_link_loss(err);
        }
        self.flush().await;

        let mut interval = time::interval(self.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_tick = Instant::now();
        let mut aborted = false;

        while self.session.phase() != SessionPhase::Completed {
            tokio::select! {
                _ = interval.tick() => {
                    let now = Instant::now();
                    self.session.tick(now - last_tick);
                    last_tick = now;
                    self.poll_generator();
                }
                frame = next_frame(&mut subscription) => match frame {
                    Some(Ok(frame)) => self.handle_frame(&frame),
                    Some(Err(err)) => {
                        warn!(%err, "undecodable frame from device");
                        self.session.report_error(SessionError::Decode(err.to_string()));
                    }
                    None => {
                        subscription = None;
                        self.handle_link_loss(LinkError::Disconnected);
                    }
                },
                command = control.recv() => match command {
                    Some(Control::Pause) => self.session.pause(),
                    Some(Control::Resume) => self.session.resume(),
                    Some(Control::Finish) => self.session.finish(),
                    Some(Control::Abort) | None => aborted = true,
                },
            }
            self.flush().await;
            if aborted {
                info!(elapsed_ms = self.session.elapsed_ms(), "practice session aborted");
                break;
            }
        }

        if let Some(subscription) = subscription.take() {
            subscription.cancel();
        }
        self.session.report()
    }

    fn handle_frame(&mut self, frame: &[u8]) {
        match Notification::decode(frame) {
            Ok(notification) => {
                let outcome = self.session.apply_notification(&notification);
                debug!(label = %notification.chord_label, ?outcome, "device feedback");
            }
            Err(err) => {
                warn!(%err, "malformed device notification");
                self.session.report_error(SessionError::Decode(err.to_string()));
            }
        }
    }

    fn handle_link_loss(&mut self, err: LinkError) {
        self.link = None;
        self.session
            .report_error(SessionError::LinkDisconnected(err.to_string()));
        if let Some(fallback) = self.fallback.take() {
            info!("switching to simulated feedback");
            self.generator = Some(fallback);
            return;
        }
        match self.link_loss {
            LinkLossPolicy::Pause => self.session.pause(),
            LinkLossPolicy::Continue => {}
        }
    }

    fn poll_generator(&mut self) {
        if self.session.phase() != SessionPhase::Running {
            return;
        }
        let Some(generator) = self.generator.as_mut() else {
            return;
        };
        let Some(target) = self.session.target_view() else {
            return;
        };
        let Some(statuses) = generator.poll(&target) else {
            return;
        };
        let notification = Notification::new(target.chord.to_string(), statuses);
        self.session.apply_notification(&notification);
    }

    /// Sends queued commands to the device and publishes every event.
    async fn flush(&mut self) {
        loop {
            let events = self.session.take_events();
            if events.is_empty() {
                return;
            }
            for event in events {
                if let SessionEvent::Command { command } = &event {
                    self.send_command(command).await;
                }
                // No receivers is fine; events are advisory.
                let _ = self.events.send(event);
            }
        }
    }

    async fn send_command(&mut self, command: &Command) {
        let Some(link) = &self.link else {
            debug!(%command, "no device attached");
            return;
        };
        if let Err(err) = link.send(&command.to_frame()).await {
            warn!(%command, %err, "device command failed");
            self.session.report_error(SessionError::LinkSend {
                command: command.encode(),
                reason: err.to_string(),
            });
        }
    }
}

async fn next_frame(
    subscription: &mut Option<Subscription>,
) -> Option<Result<Vec<u8>, LinkError>> {
    match subscription {
        Some(subscription) => subscription.next_frame().await,
        None => std::future::pending().await,
    }
}

/// Control side of a spawned session. Dropping it aborts the session.
pub struct SessionHandle {
    control: mpsc::Sender<Control>,
    task: JoinHandle<SessionReport>,
}

impl SessionHandle {
    pub async fn pause(&self) -> anyhow::Result<()> {
        self.send(Control::Pause).await
    }

    pub async fn resume(&self) -> anyhow::Result<()> {
        self.send(Control::Resume).await
    }

    pub async fn finish(&self) -> anyhow::Result<()> {
        self.send(Control::Finish).await
    }

    pub async fn abort(&self) -> anyhow::Result<()> {
        self.send(Control::Abort).await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the session to end and returns its report.
    pub async fn join(self) -> anyhow::Result<SessionReport> {
        let SessionHandle { control, task } = self;
        let report = task.await.context("practice session task failed")?;
        drop(control);
        Ok(report)
    }

    async fn send(&self, control: Control) -> anyhow::Result<()> {
        self.control
            .send(control)
            .await
            .map_err(|_| anyhow!("practice session has already ended"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strumlight_domain::{ChordCatalog, ChordEvent, ChordId, Timeline};
    use strumlight_link::LoopbackLink;

    use crate::feedback::perfect_statuses;
    use crate::session::{AdvancePolicy, EventOutcome, SessionOptions};
    use crate::simulate::{AlwaysCorrect, Silent};

    fn session(policy: AdvancePolicy) -> PracticeSession {
        let timeline = Timeline::new(vec![
            ChordEvent::new(ChordId::parse("G_Major").unwrap(), 0, 2000),
            ChordEvent::new(ChordId::parse("D_Major").unwrap(), 2000, 2000),
        ])
        .unwrap();
        let options = SessionOptions {
            policy,
            ..SessionOptions::default()
        };
        PracticeSession::new(timeline, ChordCatalog::shared(), options)
    }

    fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        seen
    }

    fn correct_frame(label: &str) -> Vec<u8> {
        let shape = ChordCatalog::builtin().lookup_str(label).unwrap();
        Notification::new(label, perfect_statuses(shape)).to_frame()
    }

    #[tokio::test(start_paused = true)]
    async fn simulated_player_completes_song() {
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Simulated(Box::new(AlwaysCorrect::new(300))),
        );
        let mut events = runner.subscribe();
        let report = runner.spawn().join().await.unwrap();
        assert_eq!(report.score.correct, 2);
        assert_eq!(report.score.attempted, 2);
        assert!(!report.finished_early);
        assert!(report.elapsed_ms < 1000);
        let events = drain(&mut events);
        assert!(matches!(events.last(), Some(SessionEvent::Completed { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn commands_reach_the_link_and_feedback_scores() {
        let link = LoopbackLink::new();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        );
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(link.sent_text(), vec!["SHOW:G_Major_CHORD".to_string()]);
        assert_eq!(link.subscriber_count(), 1);

        link.deliver(correct_frame("G Major"));
        time::sleep(Duration::from_millis(100)).await;
        assert_eq!(
            link.sent_text(),
            vec!["SHOW:G_Major_CHORD".to_string(), "SHOW:D_Major_CHORD".to_string()]
        );

        let report = handle.join().await.unwrap();
        assert_eq!(report.results[0].outcome, EventOutcome::Correct);
        assert_eq!(report.results[1].outcome, EventOutcome::Missed);
        assert_eq!(link.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn malformed_frames_surface_as_errors() {
        let link = LoopbackLink::new();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        );
        let mut events = runner.subscribe();
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(50)).await;
        link.deliver("garbage");
        time::sleep(Duration::from_millis(50)).await;
        handle.finish().await.unwrap();
        let report = handle.join().await.unwrap();
        assert!(report.finished_early);
        assert!(drain(&mut events).iter().any(|event| matches!(
            event,
            SessionEvent::Error { error: SessionError::Decode(_) }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sends_are_reported() {
        let link = LoopbackLink::new();
        link.set_fail_sends(true);
        let runner = SessionRunner::new(
            session(AdvancePolicy::FixedDuration),
            FeedbackSource::Link(Arc::new(link.clone())),
        );
        let mut events = runner.subscribe();
        let report = runner.spawn().join().await.unwrap();
        assert_eq!(report.score.attempted, 2);
        let failures = drain(&mut events)
            .into_iter()
            .filter(|event| matches!(
                event,
                SessionEvent::Error { error: SessionError::LinkSend { .. } }
            ))
            .count();
        assert_eq!(failures, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_pauses_when_configured() {
        let link = LoopbackLink::new();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        )
        .on_link_loss(LinkLossPolicy::Pause);
        let mut events = runner.subscribe();
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(100)).await;
        link.disconnect();
        time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_finished());

        handle.finish().await.unwrap();
        let report = handle.join().await.unwrap();
        assert!(report.finished_early);
        assert_eq!(report.score.attempted, 0);
        let events = drain(&mut events);
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error: SessionError::LinkDisconnected(_) }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::PhaseChanged { phase: SessionPhase::Paused }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_policy_holds_when_link_is_down_at_start() {
        let link = LoopbackLink::new();
        link.disconnect();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        )
        .on_link_loss(LinkLossPolicy::Pause);
        let mut events = runner.subscribe();
        let handle = runner.spawn();
        time::sleep(Duration::from_secs(10)).await;
        assert!(!handle.is_finished());
        assert!(link.sent_frames().is_empty());

        handle.finish().await.unwrap();
        let report = handle.join().await.unwrap();
        assert!(report.finished_early);
        assert_eq!(report.score.attempted, 0);
        assert_eq!(report.elapsed_ms, 0);
        let events = drain(&mut events);
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::Error { error: SessionError::LinkDisconnected(_) }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            SessionEvent::PhaseChanged { phase: SessionPhase::Paused }
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn link_loss_switches_to_fallback() {
        let link = LoopbackLink::new();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        )
        .with_fallback(Box::new(AlwaysCorrect::new(0)));
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(100)).await;
        link.disconnect();
        let report = handle.join().await.unwrap();
        assert_eq!(report.score.correct, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_and_resume_hold_the_clock() {
        let runner = SessionRunner::new(
            session(AdvancePolicy::FixedDuration),
            FeedbackSource::Simulated(Box::new(Silent)),
        );
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(500)).await;
        handle.pause().await.unwrap();
        time::sleep(Duration::from_secs(30)).await;
        assert!(!handle.is_finished());
        handle.resume().await.unwrap();
        let report = handle.join().await.unwrap();
        assert_eq!(report.score.attempted, 2);
        assert!(report.elapsed_ms >= 4000 && report.elapsed_ms < 4100);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_cancels_the_subscription() {
        let link = LoopbackLink::new();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        );
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(link.subscriber_count(), 1);
        handle.abort().await.unwrap();
        let report = handle.join().await.unwrap();
        assert!(report.finished_early);
        assert_eq!(report.score.attempted, 0);
        assert_eq!(link.subscriber_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_handle_ends_the_session() {
        let link = LoopbackLink::new();
        let runner = SessionRunner::new(
            session(AdvancePolicy::OnSuccess),
            FeedbackSource::Link(Arc::new(link.clone())),
        );
        let handle = runner.spawn();
        time::sleep(Duration::from_millis(50)).await;
        drop(handle);
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(link.subscriber_count(), 0);
    }
}
