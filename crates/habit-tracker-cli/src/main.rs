//! Habit Tracker - a command line client for the personal habit tracker API.
//!
//! Each command runs against the saved session. Commands that show habit
//! data go through the route guard, so an expired session sends the user
//! back to `login` with an explanation. Read-only views let their first
//! request double as the session check; changes are verified first.

use std::future::Future;
use std::io;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use futures::future::join_all;
use tracing::{debug, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use habit_tracker_core::{
    ApiError, Config, Frequency, Habit, HabitDraft, HabitId, HabitTracker, Navigation, Route,
    SessionState,
};

/// Environment variable read for the password before prompting
const PASSWORD_ENV: &str = "HABIT_TRACKER_PASSWORD";

#[derive(Parser)]
#[command(name = "habit-tracker")]
#[command(version, about = "Track your habits from the terminal", long_about = None)]
struct Cli {
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Log in with your username or email
    Login { identifier: String },
    /// Create an account and log into it
    Register { username: String, email: String },
    /// Log out and forget the saved session
    Logout,
    /// Show who is logged in
    Status,
    /// List your habits with their streaks
    Habits,
    /// Create a habit
    Add {
        name: String,
        #[arg(short, long, default_value = "")]
        description: String,
        #[arg(short, long, default_value = "daily")]
        frequency: Frequency,
    },
    /// Change a habit
    Edit {
        id: HabitId,
        #[arg(short, long)]
        name: Option<String>,
        #[arg(short, long)]
        description: Option<String>,
        #[arg(short, long)]
        frequency: Option<Frequency>,
    },
    /// Delete a habit
    Rm { id: HabitId },
    /// Log a completion of a habit
    Done { id: HabitId },
    /// Show completions of one habit, or of all habits
    History { id: Option<HabitId> },
    /// Show totals and trends
    Analysis,
}

/// Initialize the tracing subscriber for logging
fn init_tracing(log_file: Option<&PathBuf>) -> Result<Option<WorkerGuard>> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    match log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or_else(|| std::path::Path::new("."));
            let name = path.file_name().context("Log file path has no file name")?;
            let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(writer).with_ansi(false))
                .with(filter)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(fmt::layer().with_writer(io::stderr))
                .with(filter)
                .init();
            Ok(None)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();
    let log_guard = init_tracing(cli.log_file.as_ref())?;
    info!("Habit Tracker starting");

    if let Err(e) = run(cli.command).await {
        let message = match e.downcast_ref::<ApiError>() {
            Some(api_error) => api_error.user_message(),
            None => format!("{:#}", e),
        };
        eprintln!("Error: {}", message);
        // exit() skips destructors; flush buffered log lines first.
        drop(log_guard);
        std::process::exit(1);
    }
    Ok(())
}

async fn run(command: Command) -> Result<()> {
    let mut config = Config::load().unwrap_or_else(|e| {
        debug!(error = %e, "Failed to load config, using defaults");
        Config::default()
    });
    let app = HabitTracker::from_config(&config)?;

    match command {
        Command::Login { identifier } => {
            let password = read_password()?;
            let user = app.sessions.login(&identifier, &password).await?;
            config.last_identifier = Some(identifier);
            if let Err(e) = config.save() {
                debug!(error = %e, "Failed to save config");
            }
            println!("Logged in as {} <{}>", user.username, user.email);
        }
        Command::Register { username, email } => {
            let password = read_password()?;
            let user = app.sessions.register(&username, &email, &password).await?;
            println!("Welcome, {}! You are now logged in.", user.username);
        }
        Command::Logout => {
            app.sessions.logout().await;
            println!("Logged out");
        }
        Command::Status => {
            let session = app.sessions.snapshot().await;
            match (app.sessions.state().await, session.user()) {
                (SessionState::Authenticated, Some(user)) => {
                    println!("Logged in as {} <{}>", user.username, user.email)
                }
                _ => match &config.last_identifier {
                    Some(last) => println!("Not logged in (last login: {})", last),
                    None => println!("Not logged in"),
                },
            }
        }
        Command::Habits => {
            let habits = load(&app, Route::Dashboard, || app.habits.list_habits()).await?;
            print_habits(&habits);
        }
        Command::Add {
            name,
            description,
            frequency,
        } => {
            enter(&app, Route::Dashboard).await?;
            let draft = HabitDraft::new(name).description(description).frequency(frequency);
            let habit = app.habits.create_habit(&draft).await?;
            println!("Created habit #{} {}", habit.id, habit.name);
        }
        Command::Edit {
            id,
            name,
            description,
            frequency,
        } => {
            let habits = load(&app, Route::Dashboard, || app.habits.list_habits()).await?;
            let Some(current) = habits.iter().find(|h| h.id == id) else {
                bail!("No habit with id {}", id);
            };
            let mut draft = HabitDraft::from(current);
            if let Some(name) = name {
                draft.name = name;
            }
            if let Some(description) = description {
                draft.description = description;
            }
            if let Some(frequency) = frequency {
                draft.frequency = frequency;
            }
            let habit = app.habits.update_habit(id, &draft).await?;
            println!("Updated habit #{} {}", habit.id, habit.name);
        }
        Command::Rm { id } => {
            enter(&app, Route::Dashboard).await?;
            app.habits.delete_habit(id).await?;
            println!("Deleted habit #{}", id);
        }
        Command::Done { id } => {
            enter(&app, Route::Dashboard).await?;
            app.habits.log_activity(id).await?;
            println!("Logged habit #{}", id);
        }
        Command::History { id } => {
            print_history(&app, id).await?;
        }
        Command::Analysis => {
            let analysis = load(&app, Route::Analysis, || app.habits.analysis()).await?;
            if analysis.habits.is_empty() {
                println!("No habits found. Create some with `habit-tracker add` to see analysis.");
                return Ok(());
            }
            println!("{:<24} {:>6}  {}", "Habit", "Total", analysis.trends.labels.join(" "));
            for habit in &analysis.habits {
                let series: Vec<String> = analysis.series(habit.id).iter().map(u32::to_string).collect();
                println!("{:<24} {:>6}  {}", habit.name, habit.total_activities, series.join(" "));
            }
        }
    }
    Ok(())
}

/// Navigate to a protected view, failing with the redirect message if the
/// guard sends us to login instead.
async fn enter(app: &HabitTracker, route: Route) -> Result<()> {
    match app.guard.enter(route).await {
        Navigation::Allow(_) => Ok(()),
        Navigation::Redirect { reason, .. } => {
            bail!("{} (run `habit-tracker login <username>`)", reason.message())
        }
    }
}

/// Open a protected view through its first request, with the login hint on
/// a redirect.
async fn load<T, F, Fut>(app: &HabitTracker, route: Route, request: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    match app.guard.load(route, request).await {
        Ok(value) => Ok(value),
        Err(e @ (ApiError::SessionExpired | ApiError::Unauthenticated)) => {
            bail!("{} (run `habit-tracker login <username>`)", e.user_message())
        }
        Err(e) => Err(e.into()),
    }
}

fn read_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        return Ok(password);
    }
    rpassword::prompt_password("Password: ").context("Failed to read password")
}

fn print_habits(habits: &[Habit]) {
    if habits.is_empty() {
        println!("No habits yet. Add one with `habit-tracker add <name>`.");
        return;
    }
    println!("{:>4}  {:<24} {:<8} {:>6}  {}", "ID", "Name", "Every", "Streak", "Description");
    for habit in habits {
        println!(
            "{:>4}  {:<24} {:<8} {:>6}  {}",
            habit.id,
            habit.name,
            habit.frequency,
            habit.streak,
            habit.description.as_deref().unwrap_or("")
        );
    }
}

async fn print_history(app: &HabitTracker, id: Option<HabitId>) -> Result<()> {
    let (targets, first) = match id {
        Some(id) => {
            let activities = load(app, Route::Dashboard, || app.habits.history(id)).await?;
            (vec![(id, format!("#{}", id))], Some(activities))
        }
        None => {
            let habits = load(app, Route::Dashboard, || app.habits.list_habits()).await?;
            let targets: Vec<(HabitId, String)> = habits.into_iter().map(|h| (h.id, h.name)).collect();
            (targets, None)
        }
    };

    let results = match first {
        Some(activities) => vec![Ok(activities)],
        None => join_all(targets.iter().map(|(id, _)| app.habits.history(*id))).await,
    };

    for ((_, label), result) in targets.iter().zip(results) {
        let activities = result?;
        println!("{} ({} completions)", label, activities.len());
        for activity in activities {
            println!("  {}", activity.completed_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"));
        }
    }
    Ok(())
}
