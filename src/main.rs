mod auth;
mod config;
mod convert;
mod db;
mod errors;
mod fetch;
mod ingest;
mod models;
mod parse;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use auth::Authenticator;
use config::Config;
use db::Database;
use models::{ApplicationUpdate, NewApplication, ScrapedPosting, Status, TrackedApplication, User};

#[derive(Parser)]
#[command(name = "jobtrack")]
#[command(about = "Track job applications and pull in postings from job boards")]
struct Cli {
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Create a user account
    Register {
        email: String,

        /// Password (at least 8 characters)
        #[arg(long, env = "JOBTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Log in and print an access token
    Login {
        email: String,

        #[arg(long, env = "JOBTRACK_PASSWORD", hide_env_values = true)]
        password: String,
    },

    /// Manage tracked applications
    App {
        #[command(flatten)]
        auth: TokenArg,

        #[command(subcommand)]
        command: AppCommands,
    },

    /// Search a job source and store new postings
    Scrape {
        /// Search terms, e.g. "software engineer intern"
        query: String,

        /// Location filter
        #[arg(short, long, default_value = "")]
        location: String,

        /// Maximum number of postings to pull
        #[arg(short, long, default_value = "20")]
        max: usize,

        /// Job source (mock, indeed)
        #[arg(short, long, default_value = "mock")]
        source: String,
    },

    /// Browse scraped postings
    Postings {
        #[command(subcommand)]
        command: PostingCommands,
    },

    /// Turn a scraped posting into a tracked application
    Convert {
        /// Scraped posting ID
        posting_id: i64,

        #[command(flatten)]
        auth: TokenArg,
    },
}

#[derive(Args)]
struct TokenArg {
    /// Access token from `jobtrack login`
    #[arg(long, env = "JOBTRACK_TOKEN", hide_env_values = true)]
    token: String,
}

#[derive(Subcommand)]
enum AppCommands {
    /// Add an application
    Add {
        company: String,
        position: String,

        #[command(flatten)]
        fields: AppFields,
    },

    /// List your applications
    List {
        /// Filter by status
        #[arg(short, long, value_parser = parse_status)]
        status: Option<Status>,
    },

    /// Show one application
    Show { id: i64 },

    /// Change some fields of an application
    Update {
        id: i64,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        position: Option<String>,

        #[command(flatten)]
        fields: AppFields,
    },

    /// Delete an application
    Delete { id: i64 },
}

#[derive(Args)]
struct AppFields {
    /// wishlist, applied, phone_screen, interview, offer, rejected, accepted
    #[arg(short, long, value_parser = parse_status)]
    status: Option<Status>,

    /// Link to the job posting
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    notes: Option<String>,

    /// Date applied (YYYY-MM-DD or RFC 3339)
    #[arg(long, value_parser = parse_date)]
    applied: Option<DateTime<Utc>>,

    /// Salary range, e.g. "$120k-$150k"
    #[arg(long)]
    salary: Option<String>,
}

#[derive(Subcommand)]
enum PostingCommands {
    /// List scraped postings, newest first
    List {
        /// Filter by source (mock, indeed)
        #[arg(short, long)]
        source: Option<String>,

        #[arg(long, default_value = "0")]
        skip: usize,

        #[arg(long, default_value = "100")]
        limit: usize,
    },

    /// Show a scraped posting
    Show { id: i64 },
}

fn parse_status(s: &str) -> Result<Status, String> {
    s.parse::<Status>().map_err(|e| e.to_string())
}

fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| format!("invalid date '{}', expected YYYY-MM-DD", s))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("jobtrack=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env()?;
    let db = Database::open(&config.database_path).with_context(|| {
        format!("Failed to open database at {}", config.database_path.display())
    })?;

    match cli.command {
        Commands::Init => {
            db.init()?;
            if let Some(path) = db.path() {
                println!("Database initialized at {}", path.display());
            }
        }

        Commands::Register { email, password } => {
            db.ensure_initialized()?;
            let user = auth::register(&db, &email, &password)?;
            println!("Registered {} (user #{})", user.email, user.id);
        }

        Commands::Login { email, password } => {
            db.ensure_initialized()?;
            let authenticator = Authenticator::new(&config.secret_key, config.token_ttl_minutes);
            let token = authenticator.login(&db, &email, &password)?;
            if cli.json {
                print_json(&serde_json::json!({ "access_token": token, "token_type": "bearer" }))?;
            } else {
                println!("{}", token);
            }
        }

        Commands::App { auth, command } => {
            db.ensure_initialized()?;
            let user = current_user(&db, &config, &auth)?;
            run_app_command(&db, &user, command, cli.json)?;
        }

        Commands::Scrape {
            query,
            location,
            max,
            source,
        } => {
            db.ensure_initialized()?;
            let source = fetch::resolve_source(&source, &config)?;
            let report = ingest::ingest(&db, source.as_ref(), &query, &location, max)?;

            if cli.json {
                print_json(&report)?;
            } else {
                println!("\nResults:");
                println!("  Stored:     {}", report.stored_count);
                println!("  Duplicates: {}", report.duplicate_count);
                if report.skipped_count > 0 {
                    println!("  Skipped:    {}", report.skipped_count);
                }
                if !report.stored_items.is_empty() {
                    println!();
                    print_postings(&report.stored_items);
                }
            }
        }

        Commands::Postings { command } => {
            db.ensure_initialized()?;
            match command {
                PostingCommands::List {
                    source,
                    skip,
                    limit,
                } => {
                    let page = db.list_postings(source.as_deref(), skip, limit)?;
                    if cli.json {
                        print_json(&page)?;
                    } else if page.items.is_empty() {
                        println!("No postings found.");
                    } else {
                        print_postings(&page.items);
                        println!("\nShowing {} of {}", page.items.len(), page.count);
                    }
                }

                PostingCommands::Show { id } => {
                    let posting = db
                        .get_posting(id)?
                        .ok_or_else(|| anyhow!("Posting #{} not found.", id))?;
                    if cli.json {
                        print_json(&posting)?;
                    } else {
                        print_posting_detail(&posting);
                    }
                }
            }
        }

        Commands::Convert { posting_id, auth } => {
            db.ensure_initialized()?;
            let user = current_user(&db, &config, &auth)?;
            let app = convert::convert(&db, posting_id, user.id)?;
            if cli.json {
                print_json(&app)?;
            } else {
                println!(
                    "Created application #{} from posting #{}: {} at {}",
                    app.id, posting_id, app.position, app.company
                );
            }
        }
    }

    Ok(())
}

fn current_user(db: &Database, config: &Config, auth: &TokenArg) -> Result<User> {
    let authenticator = Authenticator::new(&config.secret_key, config.token_ttl_minutes);
    authenticator
        .authenticate(db, &auth.token)
        .context("Log in again with 'jobtrack login'")
}

fn run_app_command(db: &Database, user: &User, command: AppCommands, json: bool) -> Result<()> {
    match command {
        AppCommands::Add {
            company,
            position,
            fields,
        } => {
            let new = NewApplication {
                company,
                position,
                status: fields.status,
                job_url: fields.url,
                notes: fields.notes,
                applied_date: fields.applied,
                salary_range: fields.salary,
            };
            let app = db.create_application(user.id, &new)?;
            if json {
                print_json(&app)?;
            } else {
                println!("Added application #{} ({})", app.id, app.status);
            }
        }

        AppCommands::List { status } => {
            let apps = db.list_applications(user.id, status)?;
            if json {
                print_json(&serde_json::json!({ "count": apps.len(), "applications": apps }))?;
            } else if apps.is_empty() {
                println!("No applications found.");
            } else {
                println!(
                    "{:<6} {:<13} {:<28} {:<22} {:<11}",
                    "ID", "STATUS", "POSITION", "COMPANY", "APPLIED"
                );
                println!("{}", "-".repeat(84));
                for app in apps {
                    println!(
                        "{:<6} {:<13} {:<28} {:<22} {:<11}",
                        app.id,
                        app.status,
                        truncate(&app.position, 26),
                        truncate(&app.company, 20),
                        app.applied_date
                            .map(|d| d.format("%Y-%m-%d").to_string())
                            .unwrap_or_else(|| "-".to_string())
                    );
                }
            }
        }

        AppCommands::Show { id } => {
            let app = db.get_application(user.id, id)?;
            if json {
                print_json(&app)?;
            } else {
                print_application_detail(&app);
            }
        }

        AppCommands::Update {
            id,
            company,
            position,
            fields,
        } => {
            let update = ApplicationUpdate {
                company,
                position,
                status: fields.status,
                job_url: fields.url,
                notes: fields.notes,
                applied_date: fields.applied,
                salary_range: fields.salary,
            };
            if update.is_empty() {
                return Err(anyhow!("Nothing to update. Pass at least one field, e.g. --status"));
            }
            let app = db.update_application(user.id, id, &update)?;
            if json {
                print_json(&app)?;
            } else {
                println!("Updated application #{} ({})", app.id, app.status);
            }
        }

        AppCommands::Delete { id } => {
            db.delete_application(user.id, id)?;
            println!("Deleted application #{}", id);
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_postings(postings: &[ScrapedPosting]) {
    println!(
        "{:<6} {:<8} {:<30} {:<20} {:<20}",
        "ID", "SOURCE", "TITLE", "COMPANY", "LOCATION"
    );
    println!("{}", "-".repeat(88));
    for posting in postings {
        println!(
            "{:<6} {:<8} {:<30} {:<20} {:<20}",
            posting.id,
            truncate(&posting.source, 8),
            truncate(&posting.title, 28),
            truncate(&posting.company, 18),
            truncate(posting.location.as_deref().unwrap_or("-"), 18)
        );
    }
}

fn print_posting_detail(posting: &ScrapedPosting) {
    println!("Posting #{}", posting.id);
    println!("Title: {}", posting.title);
    println!("Company: {}", posting.company);
    if let Some(location) = &posting.location {
        println!("Location: {}", location);
    }
    println!("URL: {}", posting.url);
    println!("Source: {}", posting.source);
    if let Some(posted) = &posting.posted_date {
        println!("Posted: {}", posted);
    }
    println!("Scraped: {}", posting.scraped_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(description) = &posting.description {
        println!("\n--- Description ---");
        for line in textwrap::wrap(description, 80) {
            println!("{}", line);
        }
    }
}

fn print_application_detail(app: &TrackedApplication) {
    println!("Application #{}", app.id);
    println!("Company: {}", app.company);
    println!("Position: {}", app.position);
    println!("Status: {}", app.status);
    if let Some(url) = &app.job_url {
        println!("URL: {}", url);
    }
    if let Some(applied) = &app.applied_date {
        println!("Applied: {}", applied.format("%Y-%m-%d"));
    }
    if let Some(salary) = &app.salary_range {
        println!("Salary: {}", salary);
    }
    println!("Created: {}", app.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Updated: {}", app.updated_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(notes) = &app.notes {
        println!("\n--- Notes ---");
        for line in textwrap::wrap(notes, 80) {
            println!("{}", line);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
