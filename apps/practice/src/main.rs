use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use strumlight_domain::io::read_document;
use strumlight_domain::{
    builtin_songs, find_builtin, ChordCatalog, ChordId, GuitarString, PracticeStatistics,
    StringFret, Timeline, TimelineDocument,
};
use strumlight_tutor::{
    AdvancePolicy, FeedbackSource, PracticeSession, SessionAnalytics, SessionConfig,
    SessionRunner, SimulationConfig,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Chord practice sessions for the Strumlight fretboard", long_about = None)]
struct Cli {
    /// Log at debug level when RUST_LOG is unset
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a practice session with simulated feedback
    Run(RunArgs),
    /// Show the catalog shape and fingering for a chord
    Chord {
        /// Chord name such as "G Major" or "A_7sus4"
        name: String,
    },
    /// Check a timeline or song file against the chord catalog
    Validate { path: PathBuf },
    /// List the bundled songs
    Songs,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Built-in song id, see `songs`
    #[arg(long, conflicts_with = "timeline", required_unless_present = "timeline")]
    song: Option<String>,
    /// JSON or YAML file holding a song or a bare event list
    #[arg(long)]
    timeline: Option<PathBuf>,
    /// Session settings (JSON or YAML)
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,
    #[arg(long, value_enum)]
    simulate: Option<SimulateArg>,
    /// Chance of playing each chord correctly with `--simulate random`
    #[arg(long, default_value_t = 0.8)]
    success_rate: f64,
    #[arg(long)]
    seed: Option<u64>,
    /// Simulated time to react to a new chord
    #[arg(long, default_value_t = 400)]
    reaction_ms: u64,
    #[arg(long)]
    capo: Option<u8>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PolicyArg {
    OnSuccess,
    FixedDuration,
}

impl From<PolicyArg> for AdvancePolicy {
    fn from(policy: PolicyArg) -> Self {
        match policy {
            PolicyArg::OnSuccess => AdvancePolicy::OnSuccess,
            PolicyArg::FixedDuration => AdvancePolicy::FixedDuration,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SimulateArg {
    Always,
    Never,
    Random,
}

impl RunArgs {
    fn simulation(&self, mode: SimulateArg) -> SimulationConfig {
        match mode {
            SimulateArg::Always => SimulationConfig::AlwaysCorrect {
                reaction_ms: self.reaction_ms,
            },
            SimulateArg::Never => SimulationConfig::Silent,
            SimulateArg::Random => SimulationConfig::Random {
                success_rate: self.success_rate,
                reaction_ms: self.reaction_ms,
                seed: self.seed,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let filter = if cli.verbose && std::env::var_os("RUST_LOG").is_none() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run(args) => run(args).await,
        Commands::Chord { name } => show_chord(&name),
        Commands::Validate { path } => validate(&path),
        Commands::Songs => {
            list_songs();
            Ok(())
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => SessionConfig::from_path(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => SessionConfig::default(),
    };
    if let Some(policy) = args.policy {
        config.policy = policy.into();
    }
    if let Some(capo) = args.capo {
        config.capo = Some(capo);
    }
    if let Some(mode) = args.simulate {
        config.simulation = Some(args.simulation(mode));
    }
    config.validate()?;

    let timeline = load_timeline(&args)?;
    let catalog = ChordCatalog::shared();
    for chord in timeline.missing_chords(&catalog) {
        warn!(%chord, "chord is not in the catalog; any all-correct report will count");
    }

    let generator = config
        .simulation
        .clone()
        .unwrap_or_else(|| args.simulation(SimulateArg::Always))
        .build();
    info!(events = timeline.len(), policy = ?config.policy, "starting practice");
    let session = PracticeSession::new(timeline, catalog, config.options());
    let runner = SessionRunner::new(session, FeedbackSource::Simulated(generator))
        .tick_interval(config.tick_interval())
        .on_link_loss(config.link_loss);

    let mut events = runner.subscribe();
    let handle = runner.spawn();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("{line}"),
                    Err(err) => warn!(%err, "failed to encode session event"),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "event output fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = handle.join().await?;
    printer.await?;
    println!("{}", serde_json::to_string_pretty(&report)?);

    let mut stats = PracticeStatistics::new();
    SessionAnalytics::new(report).update_statistics(&mut stats);
    info!(
        average_accuracy = stats.average_accuracy,
        best_streak = stats.best_streak,
        "session finished"
    );
    Ok(())
}

fn load_timeline(args: &RunArgs) -> Result<Timeline> {
    match (&args.song, &args.timeline) {
        (Some(id), _) => find_builtin(id)
            .map(|song| song.timeline)
            .with_context(|| format!("no built-in song {id:?}, see `songs`")),
        (None, Some(path)) => {
            let document: TimelineDocument = read_document(path)
                .with_context(|| format!("failed to load timeline {}", path.display()))?;
            Ok(document.into_timeline())
        }
        (None, None) => bail!("pass --song or --timeline"),
    }
}

fn show_chord(name: &str) -> Result<()> {
    let catalog = ChordCatalog::builtin();
    let id = ChordId::parse(name)?;
    let key = catalog
        .canonical_key(&id)
        .with_context(|| format!("{name:?} is not in the chord catalog"))?;
    let shape = catalog.lookup(&id)?;
    let fingers = catalog.fingers(&id);
    let window = shape.fret_window();

    println!(
        "{key} (frets {}-{})",
        window.start,
        window.start + window.span - 1
    );
    for string in GuitarString::ALL {
        let fret = match shape.get(string) {
            StringFret::Muted => "x".to_string(),
            StringFret::Open => "o".to_string(),
            StringFret::Fretted(fret) => fret.to_string(),
        };
        let finger = fingers
            .and_then(|fingers| fingers.get(string))
            .map(|finger| format!("finger {finger}"))
            .unwrap_or_default();
        println!("{:<7}{fret:>3}  {finger}", string.label());
    }
    Ok(())
}

fn validate(path: &Path) -> Result<()> {
    let document: TimelineDocument = read_document(path)
        .with_context(|| format!("failed to load timeline {}", path.display()))?;
    let title = document.title().unwrap_or("untitled").to_string();
    let timeline = document.into_timeline();
    println!(
        "{title}: {} events, {:.1}s",
        timeline.len(),
        timeline.total_ms() as f64 / 1000.0
    );

    let missing = timeline.missing_chords(ChordCatalog::builtin());
    if missing.is_empty() {
        println!("all chords are in the catalog");
        return Ok(());
    }
    for chord in &missing {
        println!("missing: {chord}");
    }
    bail!("{} chord(s) missing from the catalog", missing.len())
}

fn list_songs() {
    for song in builtin_songs() {
        println!(
            "{:<20} {} by {} ({:?}, {} bpm, {} chords)",
            song.id,
            song.title,
            song.artist,
            song.difficulty,
            song.tempo_bpm,
            song.timeline.len()
        );
    }
}
