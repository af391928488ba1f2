mod input;

use chrono::Utc;
use clap::{Parser, Subcommand};
use input::{parse_command, Command};
use repflow_core::config::database_path;
use repflow_core::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "repflow")]
#[command(about = "Workout session tracker", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Import workouts and exercises from a JSON library file
    Import {
        file: PathBuf,
    },

    /// List stored workouts
    Workouts,

    /// Show the step-by-step plan for a workout
    Plan {
        workout: String,
    },

    /// Start, or resume, a session for a workout
    Start {
        workout: String,

        /// Log every step with its defaults and finish (for testing)
        #[arg(long)]
        auto_complete: bool,

        /// Skip rest countdowns
        #[arg(long)]
        no_rest: bool,
    },

    /// Show finished sessions
    History {
        /// Also export them to this CSV file
        #[arg(long)]
        csv: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    repflow_core::logging::init_with_level("warn");

    let cli = Cli::parse();

    let config = Config::load()?;
    let data_dir = cli.data_dir.unwrap_or_else(|| config.data.data_dir.clone());
    let store = FileStore::new(database_path(&data_dir));

    match cli.command {
        Commands::Import { file } => cmd_import(&store, file),
        Commands::Workouts => cmd_workouts(&store),
        Commands::Plan { workout } => cmd_plan(&store, &workout),
        Commands::Start {
            workout,
            auto_complete,
            no_rest,
        } => cmd_start(store, &workout, auto_complete, no_rest, &config),
        Commands::History { csv } => cmd_history(&store, csv),
    }
}

fn cmd_import(store: &FileStore, file: PathBuf) -> Result<()> {
    let library = Library::load(&file)?;
    let exercises = library.exercises.len();
    let workouts = store.update(|db| db.import(library))?;

    println!(
        "✓ Imported {} workouts and {} exercises",
        workouts, exercises
    );
    Ok(())
}

fn cmd_workouts(store: &FileStore) -> Result<()> {
    let db = store.load()?;
    if db.workouts.is_empty() {
        println!("No workouts stored. Import some with `repflow import <file>`.");
        return Ok(());
    }

    for workout in db.workouts.values() {
        println!(
            "  {:<20} {} ({} steps)",
            workout.id,
            workout.name,
            plan_workout(workout).len()
        );
    }
    Ok(())
}

fn cmd_plan(store: &FileStore, workout_id: &str) -> Result<()> {
    let db = store.load()?;
    let workout = db
        .workouts
        .get(workout_id)
        .ok_or_else(|| Error::NotFound(format!("workout '{}'", workout_id)))?;

    println!("\n  {}", workout.name);
    let steps = plan_workout(workout);
    let mut last_block = None;
    for (i, step) in steps.iter().enumerate() {
        if last_block != Some(&step.block.id) {
            let kind = if step.block.circuit { "circuit" } else { "straight sets" };
            println!("\n  Block {} ({})", step.block.position + 1, kind);
            last_block = Some(&step.block.id);
        }
        println!(
            "  {:>3}. {} - set {} of {}  [{}]",
            i + 1,
            db.exercise_name(&step.exercise.exercise_id),
            step.set_index + 1,
            step.total_sets,
            step.exercise.target
        );
    }
    println!();
    Ok(())
}

fn cmd_history(store: &FileStore, csv: Option<PathBuf>) -> Result<()> {
    let db = store.load()?;
    let sessions = db.finished_sessions();

    if sessions.is_empty() {
        println!("No finished sessions yet.");
    }

    for session in &sessions {
        let workout = session.workout_id.as_deref().unwrap_or("?");
        let name = db.workouts.get(workout).map_or(workout, |w| w.name.as_str());
        let summary = session.summary.clone().unwrap_or_default();
        println!(
            "  {}  {:<24} {:>8}  {:>3} sets  {:>9.1} kg  {}",
            session.started_at.format("%Y-%m-%d %H:%M"),
            name,
            format_duration(summary.duration_seconds),
            db.session_records(session.id).len(),
            summary.volume_kg,
            if session.completed { "complete" } else { "ended early" }
        );
    }

    if let Some(path) = csv {
        let count = repflow_core::history::export_csv(sessions.iter().copied(), &path)?;
        println!("✓ Exported {} sessions to {}", count, path.display());
    }
    Ok(())
}

/// Fires a terminal bell and message after the delay, from a detached thread
///
/// Cancelling bumps a generation counter; a sleeping thread whose generation
/// is stale wakes up and stays quiet.
#[derive(Default)]
struct TerminalNotifier {
    generation: Arc<AtomicU64>,
}

impl Notifier for TerminalNotifier {
    fn schedule(&mut self, message: &str, delay: Duration) {
        let message = message.to_string();
        let generation = Arc::clone(&self.generation);
        let scheduled = generation.load(Ordering::SeqCst);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            if generation.load(Ordering::SeqCst) == scheduled {
                eprintln!("\x07{}", message);
            }
        });
    }

    fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

fn cmd_start(
    store: FileStore,
    workout_id: &str,
    auto_complete: bool,
    no_rest: bool,
    config: &Config,
) -> Result<()> {
    let names = store.load()?;
    let mut options = SessionOptions::from(&config.session);
    if auto_complete || no_rest {
        options.notify_rest = false;
    }

    let mut session =
        WorkoutSession::start(store, TerminalNotifier::default(), options, workout_id, Utc::now())?;

    if session.position() > 0 && !session.is_complete() {
        println!(
            "Resuming at step {} of {}",
            session.position() + 1,
            session.steps().len()
        );
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();

    while !session.is_complete() {
        let Some(step) = session.current_step().cloned() else {
            break;
        };
        let Some(defaults) = session.defaults() else {
            break;
        };

        display_step(&session, &step, &defaults, &names);

        let command = if auto_complete {
            Command::Accept
        } else {
            print!("> ");
            io::stdout().flush()?;
            match lines.next() {
                Some(line) => match parse_command(&line?, config.units.load) {
                    Ok(command) => command,
                    Err(e) => {
                        println!("  {}", e);
                        continue;
                    }
                },
                None => Command::Quit,
            }
        };

        let now = Utc::now();
        match command {
            Command::Accept => {
                advance(&mut session, defaults.into(), no_rest || auto_complete, config)?
            }
            Command::Log(edits) => {
                let mut entry = SetEntry::from(defaults);
                entry.measurements.overlay(&edits.measurements);
                if let Some(note) = edits.note {
                    entry.note = note;
                }
                advance(&mut session, entry, no_rest, config)?;
            }
            Command::Back => session.back()?,
            Command::GoTo(index) => {
                if let Err(e) = session.go_to(index) {
                    println!("  {}", e);
                }
            }
            Command::Swap(exercise_id) => match session.swap_exercise(&exercise_id) {
                Ok(()) => println!("  ✓ Swapped in {}", names.exercise_name(&exercise_id)),
                Err(e) => println!("  ✗ Swap failed: {}", e),
            },
            Command::Pause => {
                if session.is_paused() {
                    session.resume(now);
                    println!("  Resumed");
                } else {
                    session.pause(now);
                    println!("  Paused at {}", format_duration(session.elapsed_seconds()));
                }
            }
            Command::Quit => {
                if let Err(e) = session.finish(now) {
                    println!("  ! Could not store the session summary ({}); retrying on exit", e);
                }
                break;
            }
            Command::Help => println!("{}", input::HELP),
        }

        for notice in session.take_notices() {
            match notice {
                Notice::SaveFailed { key, error } => {
                    println!("  ! Could not save {} ({}); will retry", key, error)
                }
                Notice::FinalizeFailed { error } => {
                    println!("  ! Could not store the session summary ({}); retrying on exit", error)
                }
            }
        }
    }

    if let Some(summary) = session.session().summary.clone() {
        display_summary(&summary, session.session().completed);
    }
    session.teardown(Utc::now());
    Ok(())
}

fn advance(
    session: &mut WorkoutSession<FileStore, TerminalNotifier>,
    entry: SetEntry,
    skip_rest: bool,
    config: &Config,
) -> Result<()> {
    match session.advance(entry, Utc::now())? {
        Advance::Next {
            rest_seconds: Some(_),
            ..
        } if skip_rest => session.skip_rest(),
        Advance::Next {
            rest_seconds: Some(_),
            ..
        } => run_rest(session, config)?,
        Advance::Next { .. } | Advance::Ignored => {}
        Advance::Finished(_) => println!("\n✓ Session complete!"),
    }
    Ok(())
}

/// Block while the rest countdown runs, redrawing it each tick
fn run_rest(
    session: &mut WorkoutSession<FileStore, TerminalNotifier>,
    config: &Config,
) -> Result<()> {
    let interval = Duration::from_millis(config.session.tick_millis);
    let mut out = io::stdout();
    loop {
        let tick = session.tick(Utc::now());
        match tick.rest {
            RestTick::Counting { remaining } => {
                write!(out, "\r  Rest {:>4}s   ", remaining)?;
            }
            RestTick::Alert { remaining } => {
                write!(out, "\r\x07  Rest {:>4}s   ", remaining)?;
            }
            RestTick::Finished | RestTick::Idle => {
                writeln!(out, "\r  Rest over      ")?;
                return Ok(());
            }
        }
        out.flush()?;
        std::thread::sleep(interval);
    }
}

fn display_step(
    session: &WorkoutSession<FileStore, TerminalNotifier>,
    step: &Step,
    defaults: &InputDefaults,
    names: &Database,
) {
    let source = match defaults.source {
        DefaultsSource::Target => "target",
        DefaultsSource::CarriedForward => "from last set",
        DefaultsSource::Saved => "saved",
    };

    println!(
        "\n[{}/{}] {}  set {} of {}{}   {}",
        session.position() + 1,
        session.steps().len(),
        names.exercise_name(&step.exercise.exercise_id),
        step.set_index + 1,
        step.total_sets,
        if step.block.circuit { " (circuit)" } else { "" },
        format_duration(session.elapsed_seconds())
    );
    println!("  {} ({})", defaults.measurements, source);
    if !defaults.note.is_empty() {
        println!("  note: {}", defaults.note);
    }
}

fn display_summary(summary: &SessionSummary, completed: bool) {
    println!("\n╭─────────────────────────────────────────╮");
    println!(
        "│  {}",
        if completed { "WORKOUT COMPLETE" } else { "WORKOUT ENDED" }
    );
    println!("╰─────────────────────────────────────────╯");
    println!("  Duration: {}", format_duration(summary.duration_seconds));
    println!("  Volume:   {:.1} kg", summary.volume_kg);
    if summary.work_joules > 0.0 {
        println!("  Work:     {:.0} J", summary.work_joules);
        println!("  Power:    {:.1} W", summary.average_power_watts);
    }
    println!();
}

fn format_duration(seconds: i64) -> String {
    let seconds = seconds.max(0);
    format!("{}:{:02}", seconds / 60, seconds % 60)
}
