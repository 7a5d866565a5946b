pub mod analytics;
pub mod config;
pub mod feedback;
pub mod runner;
pub mod session;
pub mod simulate;

pub use analytics::{EventResult, SessionAnalytics, SessionReport};
pub use config::{SessionConfig, SimulationConfig};
pub use feedback::{perfect_statuses, FeedbackInterpreter, OpenStringRule, Verdict};
pub use runner::{Control, FeedbackSource, LinkLossPolicy, SessionHandle, SessionRunner};
pub use session::{
    AdvancePolicy, EventOutcome, FeedbackOutcome, PracticeSession, Score, SessionError,
    SessionEvent, SessionOptions, SessionPhase, SessionState, TargetView,
};
pub use simulate::{AlwaysCorrect, RandomVerdicts, Silent, VerdictGenerator};
