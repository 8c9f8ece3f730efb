use accesswatch::config::Config;
use accesswatch::schedule::{calc, Frequency, MonitoredSchedule, ScheduleError, ScheduleSpec};
use accesswatch::storage::{self, schedules};
use anyhow::{anyhow, Context, Result};
use chrono::{NaiveTime, Utc};
use chrono_tz::Tz;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(
    name = "accesswatch",
    about = "Continuous accessibility-compliance monitoring for websites",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the daemon (API server + batch trigger endpoints)
    Serve,

    /// Process one batch of due schedules and print the summary
    RunBatch,

    /// Force an immediate out-of-schedule scan for one schedule
    Scan {
        /// Schedule id
        #[arg(long)]
        id: Uuid,
    },

    /// Manage monitoring schedules
    Schedule {
        #[command(subcommand)]
        action: ScheduleAction,
    },

    /// Print the trend report for one schedule
    Trends {
        /// Schedule id
        #[arg(long)]
        id: Uuid,

        /// History window in days
        #[arg(long, default_value = "90")]
        days: i64,
    },

    /// Inspect or resolve alerts
    Alerts {
        #[command(subcommand)]
        action: AlertAction,
    },
}

#[derive(Subcommand)]
enum ScheduleAction {
    /// List all schedules
    List,

    /// Add a new schedule
    Add {
        /// Target URL to monitor
        #[arg(long)]
        url: String,

        /// weekly or biweekly
        #[arg(long, default_value = "weekly")]
        frequency: String,

        /// Day of week, 0-6 (0 = Sunday)
        #[arg(long)]
        day: u8,

        /// Time of day, HH:MM
        #[arg(long)]
        time: String,

        /// IANA timezone, e.g. America/New_York
        #[arg(long, default_value = "UTC")]
        timezone: String,

        /// Score threshold recorded with the schedule
        #[arg(long, default_value = "80")]
        threshold: f64,

        /// Notification recipient (repeatable, max 5)
        #[arg(long = "recipient")]
        recipients: Vec<String>,
    },

    /// Remove a schedule
    Remove {
        /// Schedule id
        #[arg(long)]
        id: Uuid,
    },

    /// Preview what will run in the next N hours
    DryRun {
        /// Hours to preview
        #[arg(long, default_value = "168")]
        hours: u64,
    },
}

#[derive(Subcommand)]
enum AlertAction {
    /// List alerts
    List {
        /// Only unresolved alerts
        #[arg(long)]
        unresolved: bool,

        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Resolve an alert
    Resolve {
        /// Alert id
        #[arg(long)]
        id: Uuid,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve => {
            tracing::info!(bind = %config.bind, "Starting accesswatch daemon");
            accesswatch::serve(config).await?;
        }
        Commands::RunBatch => {
            let pool = storage::open_pool(&config.db_path)?;
            let runner = accesswatch::build_runner(pool, &config)?;
            let summary = runner.run_batch().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Scan { id } => {
            let pool = storage::open_pool(&config.db_path)?;
            let runner = accesswatch::build_runner(pool, &config)?;
            match runner.manual_scan(id).await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => return Err(anyhow!("Schedule '{id}' not found")),
            }
        }
        Commands::Schedule { action } => {
            let pool = storage::open_pool(&config.db_path)?;
            run_schedule_action(&pool, action)?;
        }
        Commands::Trends { id, days } => {
            let pool = storage::open_pool(&config.db_path)?;
            match accesswatch::trend::report_for_schedule(&pool, id, days)? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("Not enough scan history for a trend report."),
            }
        }
        Commands::Alerts { action } => {
            let pool = storage::open_pool(&config.db_path)?;
            let engine = accesswatch::alerts::AlertEngine::new(pool);
            match action {
                AlertAction::List { unresolved, limit } => {
                    let alerts = engine.list(unresolved, limit)?;
                    if alerts.is_empty() {
                        println!("No alerts.");
                    } else {
                        println!(
                            "{:<36} | {:<18} | {:<8} | Message",
                            "Id", "Type", "Severity"
                        );
                        for a in alerts {
                            println!(
                                "{:<36} | {:<18} | {:<8} | {}",
                                a.id, a.alert_type, a.severity, a.message
                            );
                        }
                    }
                }
                AlertAction::Resolve { id } => {
                    if engine.resolve(id)? {
                        println!("Alert '{id}' resolved.");
                    } else {
                        return Err(anyhow!("Alert '{id}' not found or already resolved"));
                    }
                }
            }
        }
    }

    Ok(())
}

fn run_schedule_action(pool: &storage::Pool, action: ScheduleAction) -> Result<()> {
    match action {
        ScheduleAction::List => {
            let list = schedules::list_schedules(pool)?;
            if list.is_empty() {
                println!("No schedules found.");
            } else {
                println!(
                    "{:<36} | {:<30} | {:<9} | {:<8} | Next run",
                    "Id", "URL", "Frequency", "Enabled"
                );
                for s in list {
                    println!(
                        "{:<36} | {:<30} | {:<9} | {:<8} | {}",
                        s.id,
                        s.url,
                        s.frequency,
                        s.enabled,
                        s.next_run_at
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| "-".into())
                    );
                }
            }
        }
        ScheduleAction::Add {
            url,
            frequency,
            day,
            time,
            timezone,
            threshold,
            recipients,
        } => {
            let spec = ScheduleSpec {
                url,
                frequency: frequency.parse::<Frequency>()?,
                day_of_week: day,
                time_of_day: NaiveTime::parse_from_str(&time, "%H:%M")
                    .map_err(|_| ScheduleError::InvalidTimeOfDay(time.clone()))?,
                timezone: timezone
                    .parse::<Tz>()
                    .map_err(|_| ScheduleError::InvalidTimezone(timezone.clone()))?,
                starts_at: None,
                ends_at: None,
                score_threshold: threshold,
                recipients,
            };
            let schedule = MonitoredSchedule::from_spec(spec, Utc::now())?;
            schedules::insert_schedule(pool, &schedule).context("Failed to insert schedule")?;
            println!(
                "Schedule '{}' added; first run at {}.",
                schedule.id,
                schedule
                    .next_run_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".into())
            );
        }
        ScheduleAction::Remove { id } => {
            if schedules::remove_schedule(pool, id)? {
                println!("Schedule '{id}' removed.");
            } else {
                return Err(anyhow!("Schedule '{id}' not found"));
            }
        }
        ScheduleAction::DryRun { hours } => {
            let now = Utc::now();
            let end = now + chrono::Duration::hours(hours as i64);
            let mut preview = Vec::new();
            for s in schedules::list_schedules(pool)? {
                if !s.enabled {
                    continue;
                }
                // Walk occurrences forward until they leave the window
                let mut cursor = now;
                loop {
                    match s.next_run_after(cursor) {
                        calc::NextRun::At(next) if next <= end => {
                            preview.push((next, s.id, s.url.clone()));
                            cursor = next;
                        }
                        _ => break,
                    }
                }
            }
            preview.sort_by_key(|p| p.0);
            if preview.is_empty() {
                println!("No runs scheduled in next {hours} hours.");
            } else {
                println!("Upcoming runs (next {hours} hours):");
                for (at, id, url) in preview {
                    println!("{} : {} ({})", at.to_rfc3339(), url, id);
                }
            }
        }
    }
    Ok(())
}
