use std::sync::Arc;
use std::time::Duration;

use strumlight_domain::{find_builtin, ChordCatalog, StringStatus, STRING_COUNT};
use strumlight_link::transport::{decode_frame, encode_frame};
use strumlight_link::{Base64Link, Command, LoopbackLink, Notification};
use strumlight_tutor::{
    perfect_statuses, AdvancePolicy, EventOutcome, FeedbackSource, PracticeSession, SessionEvent,
    SessionOptions, SessionRunner,
};
use tokio::task::JoinHandle;

/// Plays the fretboard: answers each `SHOW` command with a base64 status
/// frame, perfect unless the chord is in `fumbles`.
fn fake_device(link: LoopbackLink, fumbles: &'static [&'static str]) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut seen = 0;
        loop {
            let sent = link.sent_frames();
            for frame in &sent[seen..] {
                let decoded = decode_frame(frame).expect("runner sends base64");
                let Ok(Command::ShowChord(chord)) = Command::decode(&decoded) else {
                    continue;
                };
                let label = chord.to_string();
                let statuses = if fumbles.contains(&label.as_str()) {
                    let mut statuses = [StringStatus::Correct; STRING_COUNT];
                    statuses[STRING_COUNT - 1] = StringStatus::TooHigh;
                    statuses
                } else {
                    perfect_statuses(ChordCatalog::builtin().lookup(&chord).unwrap())
                };
                link.deliver(encode_frame(&Notification::new(label, statuses).to_frame()));
            }
            seen = sent.len();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
}

fn song_session(id: &str, policy: AdvancePolicy) -> PracticeSession {
    let song = find_builtin(id).unwrap();
    let options = SessionOptions {
        policy,
        capo: Some(1),
        ..SessionOptions::default()
    };
    PracticeSession::new(song.timeline, ChordCatalog::shared(), options)
}

#[tokio::test(start_paused = true)]
async fn perfect_player_over_base64_link() {
    let loopback = LoopbackLink::new();
    let device = fake_device(loopback.clone(), &[]);
    let runner = SessionRunner::new(
        song_session("smoke-on-the-water", AdvancePolicy::OnSuccess),
        FeedbackSource::Link(Arc::new(Base64Link::new(loopback.clone()))),
    );
    let mut events = runner.subscribe();
    let report = runner.spawn().join().await.unwrap();
    device.abort();

    assert_eq!(report.score.correct, 6);
    assert_eq!(report.score.attempted, 6);
    assert_eq!(report.score.best_streak, 6);
    assert!((report.accuracy - 1.0).abs() < f32::EPSILON);

    let sent: Vec<String> = loopback
        .sent_frames()
        .iter()
        .map(|frame| String::from_utf8(decode_frame(frame).unwrap()).unwrap())
        .collect();
    assert_eq!(sent[0], "CAPO:1");
    assert_eq!(sent[1], "SHOW:G_Major_CHORD");
    assert_eq!(sent[2], "SHOW:Bb_Major_CHORD");
    assert_eq!(sent.len(), 7);
    assert_eq!(loopback.subscriber_count(), 0);

    let mut feedback = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, SessionEvent::Feedback { all_correct: true, .. }) {
            feedback += 1;
        }
    }
    assert_eq!(feedback, 6);
}

#[tokio::test(start_paused = true)]
async fn fumbled_chords_are_missed_in_time() {
    let loopback = LoopbackLink::new();
    let device = fake_device(loopback.clone(), &["C Major"]);
    let runner = SessionRunner::new(
        song_session("wagon-wheel", AdvancePolicy::FixedDuration),
        FeedbackSource::Link(Arc::new(Base64Link::new(loopback.clone()))),
    );
    let report = runner.spawn().join().await.unwrap();
    device.abort();

    assert_eq!(report.score.attempted, 8);
    assert_eq!(report.score.correct, 6);
    assert_eq!(report.score.best_streak, 3);
    assert!(report.elapsed_ms >= 32_000);
    let missed: Vec<String> = report
        .missed_chords()
        .into_iter()
        .map(ToString::to_string)
        .collect();
    assert_eq!(missed, vec!["C Major".to_string()]);
    assert_eq!(report.results[3].outcome, EventOutcome::Missed);
}
