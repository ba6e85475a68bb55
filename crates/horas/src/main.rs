use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::{self, BufRead, Write};
use std::net::IpAddr;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

mod auth;
mod config;
mod db;
mod error;
mod forms;
mod hours;
mod html;
mod month;
mod report;
mod server;
mod types;

use config::Config;
use month::YearMonth;
use report::{MonthlyReport, ReportFormat};

#[derive(Parser, Debug)]
#[command(name = "horas")]
#[command(about = "Track worked hours per service and export monthly reports")]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,

    /// SQLite database file (overrides HORAS_DATABASE)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the web server (default)
    Serve {
        /// Port to listen on (overrides HORAS_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides HORAS_BIND)
        #[arg(short, long)]
        bind: Option<IpAddr>,
    },

    /// Create or migrate the database, seeding the admin account if configured
    InitDb,

    /// Add a user who can log in
    CreateUser {
        username: String,

        /// Password; prompted for when omitted
        #[arg(long)]
        password: Option<String>,
    },

    /// Print an Argon2 hash for a password
    HashPassword {
        #[arg(long)]
        password: Option<String>,
    },

    /// Write a monthly report without starting the server
    Report {
        /// Username whose services are reported
        #[arg(short, long)]
        user: String,

        /// Month as YYYY-MM (defaults to the current month)
        #[arg(short, long)]
        month: Option<YearMonth>,

        #[arg(short, long, value_enum, default_value = "pdf")]
        format: ReportFormat,

        /// Output file (defaults to the report's download name)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Calculate the worked hours of a single shift
    Hours {
        /// Entry time, HH:MM
        entry: String,

        /// Exit time, HH:MM (earlier than entry means the next day)
        exit: String,

        /// Break length in minutes
        #[arg(long = "break", default_value_t = 0)]
        break_minutes: u32,

        /// Keep the break inside the worked hours
        #[arg(long)]
        no_discount_break: bool,
    },
}

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},hyper=warn,tower_http=warn", log_level))
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_max_level(Level::TRACE)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(&args.log_level);

    let mut config = Config::from_env()?;
    if let Some(database) = args.database {
        config.database = database;
    }

    match args.command {
        // Default to serve if no command specified
        None => server::serve(&config).await?,
        Some(Commands::Serve { port, bind }) => {
            if let Some(port) = port {
                config.port = port;
            }
            if let Some(bind) = bind {
                config.bind = bind;
            }
            server::serve(&config).await?;
        }
        Some(Commands::InitDb) => init_db(&config)?,
        Some(Commands::CreateUser { username, password }) => {
            let password = match password {
                Some(password) => password,
                None => prompt_new_password()?,
            };
            create_user(&config, &username, &password)?;
        }
        Some(Commands::HashPassword { password }) => {
            let password = match password {
                Some(password) => password,
                None => prompt("Password: ")?,
            };
            if password.is_empty() {
                bail!("Password cannot be empty");
            }
            println!("{}", auth::hash_password(&password)?);
        }
        Some(Commands::Report {
            user,
            month,
            format,
            output,
        }) => {
            let month = month.unwrap_or_else(YearMonth::current);
            write_report(&config, &user, month, format, output)?;
        }
        Some(Commands::Hours {
            entry,
            exit,
            break_minutes,
            no_discount_break,
        }) => {
            hours::parse_clock(&entry)?;
            hours::parse_clock(&exit)?;
            let worked =
                hours::calculate_worked_hours(&entry, &exit, break_minutes, !no_discount_break);
            println!("{:.2}", worked);
        }
    }

    Ok(())
}

fn init_db(config: &Config) -> Result<()> {
    let conn = db::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    info!(path = %config.database.display(), "Database ready");

    let Some(admin) = &config.admin else {
        info!(
            users = db::count_users(&conn)?,
            "No HORAS_ADMIN_USER/HORAS_ADMIN_PASSWORD set, skipping initial user"
        );
        return Ok(());
    };

    if db::find_user_by_username(&conn, &admin.username)?.is_some() {
        info!(username = %admin.username, "Initial user already exists");
    } else {
        let hash = auth::hash_password(&admin.password)?;
        let id = db::create_user(&conn, &admin.username, &hash)?;
        info!(id = id, username = %admin.username, "Initial user created");
    }
    Ok(())
}

fn create_user(config: &Config, username: &str, password: &str) -> Result<()> {
    let username = username.trim();
    if username.is_empty() {
        bail!("Username cannot be empty");
    }
    if password.is_empty() {
        bail!("Password cannot be empty");
    }

    let conn = db::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    let hash = auth::hash_password(password)?;
    let id = db::create_user(&conn, username, &hash)?;
    info!(id = id, username = %username, "User created");
    Ok(())
}

fn write_report(
    config: &Config,
    username: &str,
    month: YearMonth,
    format: ReportFormat,
    output: Option<PathBuf>,
) -> Result<()> {
    let conn = db::open(&config.database)
        .with_context(|| format!("Failed to open database {}", config.database.display()))?;
    let Some(user) = db::find_user_by_username(&conn, username.trim())? else {
        bail!("No user named '{}'", username.trim());
    };

    let services = db::list_services_for_month(&conn, user.id, month)?;
    let report = MonthlyReport::new(&user.username, month, services);
    let bytes = report.render(format)?;

    let path = output.unwrap_or_else(|| PathBuf::from(report.file_name(format)));
    std::fs::write(&path, &bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!(
        path = %path.display(),
        services = report.services.len(),
        total_hours = report.total_hours,
        "Report saved"
    );
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    eprint!("{}", label);
    io::stderr().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn prompt_new_password() -> Result<String> {
    let password = prompt("Password: ")?;
    let confirm = prompt("Repeat password: ")?;
    if password != confirm {
        bail!("Passwords do not match");
    }
    Ok(password)
}
