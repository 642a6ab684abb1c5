//! Classbook CLI - Sign in, browse and reserve classes.
//!
//! # Usage
//!
//! ```bash
//! # Create an account, then log in
//! classbook signup -n "Ada Lovelace" -e ada@example.com -p 'correct horse'
//! classbook login -e ada@example.com -p 'correct horse'
//!
//! # Browse the week around a day and reserve a seat
//! classbook classes week --date 2025-03-04
//! classbook classes reserve 42
//!
//! # Create a class
//! classbook classes create -t Yoga --start "2025-03-04 09:00" -c 12
//! ```
//!
//! # Environment Variables
//!
//! - `CLASSBOOK_API_URL` - Class server base URL (default: `http://localhost:5500`)
//! - `CLASSBOOK_STATE_FILE` - Where the session is stored
//! - `CLASSBOOK_LOG_FORMAT` - Set to `json` for structured logs
//! - `RUST_LOG` - Log filter

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::io::Write;

use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use classbook_client::{ClassesApi, ClientConfig, ClientError, SessionManager};
use classbook_core::ClassId;
use secrecy::SecretString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Parser)]
#[command(name = "classbook")]
#[command(author, version, about = "Class scheduling from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account
    Signup {
        /// Display name (at least 2 characters)
        #[arg(short, long)]
        name: String,

        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password (at least 8 characters)
        #[arg(short, long)]
        password: String,
    },
    /// Log in and store the session
    Login {
        /// Email address
        #[arg(short, long)]
        email: String,

        /// Password
        #[arg(short, long)]
        password: String,
    },
    /// Log out and forget the stored session
    Logout,
    /// Show the logged-in user
    Whoami,
    /// Show what the session store holds
    Status,
    /// Browse, create and reserve classes
    Classes {
        #[command(subcommand)]
        action: ClassesAction,
    },
}

#[derive(Subcommand)]
enum ClassesAction {
    /// List classes, optionally only those on one day
    List {
        /// Day to list (YYYY-MM-DD)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Show seven days of classes
    Week {
        /// Day to centre the week on (default: the Sunday-start week of today)
        #[arg(short, long)]
        date: Option<NaiveDate>,
    },
    /// Create a class
    Create {
        /// Class title
        #[arg(short, long)]
        title: String,

        /// Class description
        #[arg(short, long, default_value = "")]
        description: String,

        /// Start time: RFC 3339, or "YYYY-MM-DD HH:MM" in local time
        #[arg(short, long, value_parser = commands::classes::parse_start)]
        start: DateTime<Utc>,

        /// Number of seats (1-30)
        #[arg(short, long)]
        capacity: u32,
    },
    /// Reserve a seat in a class
    Reserve {
        /// ID of the class
        class_id: ClassId,
    },
}

#[tokio::main]
async fn main() {
    // Load .env file if present (ignore errors if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        let needs_login = e
            .downcast_ref::<ClientError>()
            .is_some_and(ClientError::requires_login);

        if needs_login {
            let _ = writeln!(
                std::io::stderr().lock(),
                "{e}. Please log in again with `classbook login`."
            );
        } else {
            tracing::error!("Command failed: {e}");
        }
        std::process::exit(1);
    }
}

/// Log to stderr so command output on stdout stays clean.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "classbook_cli=info,classbook_client=info".into());

    let json = std::env::var("CLASSBOOK_LOG_FORMAT").is_ok_and(|format| format == "json");
    let json_layer = json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .flatten_event(true)
            .with_writer(std::io::stderr)
    });
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .init();
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = ClientConfig::from_env()?;
    tracing::debug!(api_url = %config.api_url, state_file = %config.state_file.display(), "Configuration loaded");

    let session = SessionManager::from_config(&config)?;
    if let Err(e) = session.sweep_partial_credentials().await {
        tracing::warn!(error = %e, "Could not check stored credentials");
    }

    let mut out = std::io::stdout().lock();
    match cli.command {
        Commands::Signup {
            name,
            email,
            password,
        } => {
            commands::auth::signup(&session, &mut out, &name, &email, &SecretString::from(password))
                .await
        }
        Commands::Login { email, password } => {
            commands::auth::login(&session, &mut out, &email, &SecretString::from(password)).await
        }
        Commands::Logout => commands::auth::logout(&session, &mut out).await,
        Commands::Whoami => commands::auth::whoami(&session, &mut out).await,
        Commands::Status => commands::auth::status(&session, &mut out).await,
        Commands::Classes { action } => {
            let api = ClassesApi::new(session);
            match action {
                ClassesAction::List { date } => commands::classes::list(&api, &mut out, date).await,
                ClassesAction::Week { date } => commands::classes::week(&api, &mut out, date).await,
                ClassesAction::Create {
                    title,
                    description,
                    start,
                    capacity,
                } => {
                    let form = classbook_client::ClassForm {
                        title,
                        description,
                        start,
                        capacity,
                    };
                    commands::classes::create(&api, &mut out, form).await
                }
                ClassesAction::Reserve { class_id } => {
                    commands::classes::reserve(&api, &mut out, class_id).await
                }
            }
        }
    }
}
