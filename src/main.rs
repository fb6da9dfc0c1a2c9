use std::path::PathBuf;

use anyhow::Context;
use chrono::{Duration, NaiveDate, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod db;
mod import;
mod models;
mod report;
mod risk;
mod roster;
mod store;

use models::{AssessmentCategory, AssessmentEntry, AttendanceStatus, NewStudent};
use risk::{Policy, RiskTier};
use roster::{AttendanceMark, Roster};
use store::{JsonFileStore, StudentRepository};

#[derive(Parser)]
#[command(name = "risk-monitor")]
#[command(about = "Academic risk monitoring for class rosters", long_about = None)]
struct Cli {
    /// Where the roster is stored
    #[arg(long, value_enum, default_value_t = Backend::File, global = true)]
    store: Backend,
    /// Roster file used by the file store
    #[arg(long, default_value = "students.json", global = true)]
    data: PathBuf,
    /// Average score ratio below which grades add risk
    #[arg(long, default_value_t = risk::DEFAULT_PASSING_THRESHOLD, global = true)]
    passing_threshold: f64,
    /// Effective absence rate above which a student is a chronic absentee
    #[arg(long, default_value_t = risk::DEFAULT_ATTENDANCE_ABSENCE_LIMIT, global = true)]
    absence_limit: f64,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    File,
    Postgres,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the Postgres schema
    InitDb,
    /// Load a small demo roster
    Seed,
    /// Add one student to the roster
    AddStudent {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "BS IT")]
        course: String,
        #[arg(long, default_value_t = 1)]
        year_level: i32,
        #[arg(long, default_value = "A")]
        block: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long, default_value = "")]
        gender: String,
        #[arg(long)]
        birthday: Option<NaiveDate>,
        #[arg(long, default_value = "")]
        contact: String,
    },
    /// Remove a student and their history
    RemoveStudent {
        #[arg(long)]
        student_id: String,
    },
    /// Import students from a CSV file
    ImportRoster {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = import::DEFAULT_EMAIL_DOMAIN)]
        email_domain: String,
    },
    /// Import assessment scores from a CSV file
    ImportGrades {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Import attendance marks from a CSV file
    ImportAttendance {
        #[arg(long)]
        csv: PathBuf,
    },
    /// Record one assessment score
    RecordGrade {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        category: AssessmentCategory,
        #[arg(long)]
        name: String,
        #[arg(long)]
        score: f64,
        #[arg(long, default_value_t = 100.0)]
        max_score: f64,
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Record one attendance mark
    RecordAttendance {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        status: AttendanceStatus,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long)]
        time_slot: Option<String>,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Log an intervention, optionally scheduled some minutes from now
    Intervene {
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        kind: String,
        #[arg(long, default_value = "")]
        notes: String,
        #[arg(long)]
        in_minutes: Option<i64>,
    },
    /// Rank students by failure probability
    Score {
        #[arg(long)]
        block: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// List students above the low risk tier
    Alerts {
        #[arg(long)]
        tier: Option<RiskTier>,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Show one student's risk breakdown
    Show {
        #[arg(long)]
        student_id: String,
    },
    /// Generate a markdown report
    Report {
        #[arg(long)]
        block: Option<String>,
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Write the scored roster as JSON
    Export {
        #[arg(long, default_value = "roster-export.json")]
        out: PathBuf,
    },
}

impl Commands {
    fn mutates(&self) -> bool {
        !matches!(
            self,
            Commands::InitDb
                | Commands::Score { .. }
                | Commands::Alerts { .. }
                | Commands::Show { .. }
                | Commands::Report { .. }
                | Commands::Export { .. }
        )
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    let cli = Cli::parse();
    let policy = Policy::new(cli.passing_threshold, cli.absence_limit)?;

    match cli.store {
        Backend::File => {
            if matches!(cli.command, Commands::InitDb) {
                anyhow::bail!("init-db only applies to --store postgres");
            }
            let store = JsonFileStore::new(cli.data);
            info!(path = %store.path().display(), "using file store");
            run(&store, policy, cli.command).await
        }
        Backend::Postgres => {
            let database_url = std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set to use the postgres store")?;
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(&database_url)
                .await
                .context("failed to connect to Postgres")?;

            if matches!(cli.command, Commands::InitDb) {
                db::init_db(&pool).await?;
                println!("Schema ready.");
                return Ok(());
            }
            let store = db::PgStore::new(pool);
            run(&store, policy, cli.command).await
        }
    }
}

async fn run<R: StudentRepository>(
    repo: &R,
    policy: Policy,
    command: Commands,
) -> anyhow::Result<()> {
    let students = repo.load_students().await?;
    let mut roster = Roster::new(students, policy);
    let mutates = command.mutates();
    info!(students = roster.students().len(), "roster loaded");

    match command {
        Commands::InitDb => {}
        Commands::Seed => {
            import::seed_demo(&mut roster)?;
            println!("Seed data inserted.");
        }
        Commands::AddStudent {
            student_id,
            name,
            course,
            year_level,
            block,
            email,
            gender,
            birthday,
            contact,
        } => {
            let (first_name, middle_name, last_name) = import::split_full_name(&name);
            let email = email.unwrap_or_else(|| {
                format!("{}@{}", student_id.to_lowercase(), import::DEFAULT_EMAIL_DOMAIN)
            });
            roster.add_student(NewStudent {
                student_id: student_id.clone(),
                first_name,
                middle_name,
                last_name,
                email,
                course,
                year_level,
                block,
                gender,
                birthday,
                contact,
            })?;
            println!("Added {student_id}.");
        }
        Commands::RemoveStudent { student_id } => {
            let removed = roster.remove_student(&student_id)?;
            println!("Removed {} ({}).", removed.full_name(), removed.student_id);
        }
        Commands::ImportRoster { csv, email_domain } => {
            let summary = import::import_roster_csv(&mut roster, &csv, &email_domain)?;
            println!(
                "Imported {} students from {} ({} skipped).",
                summary.applied,
                csv.display(),
                summary.skipped
            );
        }
        Commands::ImportGrades { csv } => {
            let summary = import::import_grades_csv(&mut roster, &csv)?;
            println!(
                "Recorded {} scores from {} ({} skipped).",
                summary.applied,
                csv.display(),
                summary.skipped
            );
        }
        Commands::ImportAttendance { csv } => {
            let summary = import::import_attendance_csv(&mut roster, &csv)?;
            println!(
                "Recorded {} attendance marks from {} ({} skipped).",
                summary.applied,
                csv.display(),
                summary.skipped
            );
        }
        Commands::RecordGrade {
            student_id,
            category,
            name,
            score,
            max_score,
            date,
        } => {
            let entry = AssessmentEntry {
                category,
                name,
                max_score,
                date: date.unwrap_or_else(|| Utc::now().date_naive()),
            };
            roster.record_assessment(&student_id, &entry, score)?;
            print_risk(&roster, &student_id);
        }
        Commands::RecordAttendance {
            student_id,
            status,
            date,
            time_slot,
            reason,
        } => {
            let date = date.unwrap_or_else(|| Utc::now().date_naive());
            let mark = AttendanceMark {
                student_id: student_id.clone(),
                status,
                reason,
            };
            roster.record_attendance(date, time_slot.as_deref(), &[mark])?;
            print_risk(&roster, &student_id);
        }
        Commands::Intervene {
            student_id,
            kind,
            notes,
            in_minutes,
        } => {
            let scheduled_for = in_minutes.map(|minutes| Utc::now() + Duration::minutes(minutes));
            roster.add_intervention(&student_id, &kind, &notes, scheduled_for)?;
            println!("Logged {kind} for {student_id}.");
        }
        Commands::Score { block, limit } => {
            let mut ranked: Vec<_> = roster
                .students()
                .iter()
                .filter(|s| block.as_deref().map_or(true, |b| s.block == b))
                .collect();
            if ranked.is_empty() {
                println!("No students on the roster.");
                return Ok(());
            }
            ranked.sort_by(|a, b| {
                b.risk
                    .probability
                    .partial_cmp(&a.risk.probability)
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            println!("Top students by failure probability:");
            for student in ranked.iter().take(limit) {
                println!("- {}", report::summary_line(student));
            }
            let counts = roster.tier_counts();
            println!(
                "Roster mix: {} high, {} moderate, {} early warning, {} low.",
                counts.high, counts.moderate, counts.early_warning, counts.low
            );
        }
        Commands::Alerts { tier, limit } => {
            let alerts = roster.alerts(tier);
            if alerts.is_empty() {
                println!("No active alerts.");
            }
            for student in alerts.iter().take(limit) {
                println!(
                    "- {} {}: {}",
                    student.risk.tier.alert_heading(),
                    report::summary_line(student),
                    student.risk.tier.alert_message()
                );
            }
            for (student, log) in roster.upcoming_interventions(Utc::now()) {
                if let Some(at) = log.scheduled_for {
                    println!(
                        "Upcoming: {} at {} ({})",
                        student.full_name(),
                        at.format("%H:%M UTC"),
                        log.kind
                    );
                }
            }
        }
        Commands::Show { student_id } => {
            let student = roster
                .find(&student_id)
                .with_context(|| format!("no student with id {student_id}"))?;
            let grades = risk::grade_factor(&student.assessments, roster.policy());
            let presence = risk::attendance_factor(&student.attendance, roster.policy());

            println!("{}", report::summary_line(student));
            println!(
                "Grade factor {:.2} over {} assessments, attendance factor {:.2} over {} sessions",
                grades.value,
                student.assessments.len(),
                presence.value,
                student.attendance.len()
            );
            for assessment in student.assessments.iter().rev().take(3) {
                println!(
                    "  {} {} on {}: {}/{}",
                    assessment.category,
                    assessment.name,
                    assessment.date,
                    assessment.score,
                    assessment.max_score
                );
            }
            println!("Advice: {}", report::advisory(student));
        }
        Commands::Report { block, limit, out } => {
            let report = report::build_report(&roster, block.as_deref(), limit, Utc::now());
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export { out } => {
            let body = serde_json::to_string_pretty(roster.students())?;
            std::fs::write(&out, body)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Exported {} students to {}.", roster.students().len(), out.display());
        }
    }

    if mutates {
        repo.save_students(roster.students()).await?;
    }

    Ok(())
}

fn print_risk(roster: &Roster, student_id: &str) {
    if let Some(student) = roster.find(student_id) {
        println!("{}", report::summary_line(student));
    }
}
