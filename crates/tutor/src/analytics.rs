use serde::{Deserialize, Serialize};
use strumlight_domain::{ChordId, PracticeStatistics};
use time::OffsetDateTime;

use crate::session::{EventOutcome, Score};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EventResult {
    pub index: usize,
    pub chord: ChordId,
    pub outcome: EventOutcome,
}

/// Summary of a finished (or abandoned) practice session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionReport {
    pub score: Score,
    pub accuracy: f32,
    pub elapsed_ms: u64,
    pub finished_early: bool,
    pub results: Vec<EventResult>,
}

impl SessionReport {
    pub fn missed_chords(&self) -> Vec<&ChordId> {
        let mut missed: Vec<&ChordId> = Vec::new();
        for result in &self.results {
            if result.outcome == EventOutcome::Missed
                && !missed.iter().any(|known| known.matches(&result.chord))
            {
                missed.push(&result.chord);
            }
        }
        missed
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionAnalytics {
    pub report: SessionReport,
}

impl SessionAnalytics {
    pub fn new(report: SessionReport) -> Self {
        Self { report }
    }

    pub fn update_statistics(&self, stats: &mut PracticeStatistics) {
        self.update_statistics_at(stats, OffsetDateTime::now_utc());
    }

    pub fn update_statistics_at(&self, stats: &mut PracticeStatistics, at: OffsetDateTime) {
        let sessions = stats.sessions as f32;
        stats.average_accuracy =
            (stats.average_accuracy * sessions + self.report.accuracy) / (sessions + 1.0);
        stats.best_streak = stats.best_streak.max(self.report.score.best_streak);
        stats.sessions += 1;
        stats.last_practiced = Some(at);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn report(accuracy: f32, best_streak: u32) -> SessionReport {
        SessionReport {
            score: Score {
                correct: 0,
                attempted: 0,
                streak: 0,
                best_streak,
            },
            accuracy,
            elapsed_ms: 0,
            finished_early: false,
            results: Vec::new(),
        }
    }

    #[test]
    fn analytics_updates_stats() {
        let mut stats = PracticeStatistics::new();
        SessionAnalytics::new(report(1.0, 4)).update_statistics(&mut stats);
        SessionAnalytics::new(report(0.5, 2)).update_statistics(&mut stats);
        assert_relative_eq!(stats.average_accuracy, 0.75);
        assert_eq!(stats.best_streak, 4);
        assert_eq!(stats.sessions, 2);
        assert!(stats.last_practiced.is_some());
    }

    #[test]
    fn missed_chords_are_listed_once() {
        let g = ChordId::parse("G Major").unwrap();
        let c = ChordId::parse("C Major").unwrap();
        let mut report = report(0.0, 0);
        report.results = vec![
            EventResult { index: 0, chord: g.clone(), outcome: EventOutcome::Missed },
            EventResult { index: 1, chord: c.clone(), outcome: EventOutcome::Correct },
            EventResult { index: 2, chord: g.clone(), outcome: EventOutcome::Missed },
        ];
        assert_eq!(report.missed_chords(), vec![&g]);
    }
}
