//! hrdesk - command-line client for the HR dashboard.
//!
//! Signs in against the dashboard API, keeps the session in the configured
//! token store between runs, and exercises authenticated endpoints.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use hrdesk_core::{Config, LoginRequest, NotificationCenter, SessionManager};

const USAGE: &str = "\
Usage: hrdesk <command> [args]

Commands:
  login [username]          Sign in (prompts for the password)
  logout                    Sign out and forget stored tokens
  whoami                    Show the signed-in user
  can <permission>          Exit 0 if the signed-in user has the permission
  notifications             List notifications
  forgot-password <email>   Request a password reset token
  reset-password <token>    Set a new password with a reset token";

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr, and additionally to a daily rolling file when
/// `log_dir` is configured. The returned guard must live until exit so
/// buffered file output is flushed.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=hrdesk_core=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hrdesk.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let mut config = Config::load()?;
    let _guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        println!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    };
    if matches!(command, "-h" | "--help" | "help") {
        println!("{}", USAGE);
        return Ok(ExitCode::SUCCESS);
    }

    let session = SessionManager::from_config(&config)?;
    session.initialize().await;
    info!(command, authenticated = session.is_authenticated(), "hrdesk starting");

    match command {
        "login" => login(&session, &mut config, args.get(1).cloned()).await?,
        "logout" => {
            session.logout().await;
            println!("Signed out.");
        }
        "whoami" => whoami(&session),
        "can" => {
            let permission = args.get(1).context("Missing <permission>")?;
            return Ok(permission_status(&session, permission));
        }
        "notifications" => notifications(&session).await?,
        "forgot-password" => {
            let email = args.get(1).context("Missing <email>")?;
            let response = session
                .forgot_password(email)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", response.message);
            if let Some(token) = response.reset_token {
                println!("Reset token: {}", token);
            }
        }
        "reset-password" => {
            let token = args.get(1).context("Missing <token>")?;
            let password = rpassword::prompt_password("New password: ")?;
            let message = session
                .reset_password(token, &password)
                .await
                .map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{}", message);
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
    Ok(ExitCode::SUCCESS)
}

async fn login(
    session: &SessionManager,
    config: &mut Config,
    username: Option<String>,
) -> Result<()> {
    let username = match username.or_else(|| config.last_username.clone()) {
        Some(name) => name,
        None => prompt("Username: ")?,
    };
    let password = rpassword::prompt_password(format!("Password for {}: ", username))?;

    let user = session
        .login(&LoginRequest::new(username.clone(), password))
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    config.last_username = Some(username);
    if let Err(e) = config.save() {
        tracing::warn!(error = %e, "Failed to save config");
    }

    println!("Signed in as {}.", user.display_name());
    Ok(())
}

/// Exit status for `can`: failure when the user lacks the permission.
fn permission_status(session: &SessionManager, permission: &str) -> ExitCode {
    if session.has_permission(permission) {
        println!("yes");
        ExitCode::SUCCESS
    } else {
        println!("no");
        ExitCode::FAILURE
    }
}

fn whoami(session: &SessionManager) {
    let Some(user) = session.user() else {
        println!("Not signed in.");
        return;
    };

    println!("{} ({})", user.display_name(), user.username);
    if let Some(email) = &user.email {
        println!("Email:       {}", email);
    }
    let roles: Vec<&str> = user.roles.iter().map(|r| r.name.as_str()).collect();
    println!("Roles:       {}", roles.join(", "));
    println!("Permissions: {}", user.permissions.join(", "));
}

async fn notifications(session: &SessionManager) -> Result<()> {
    if !session.is_authenticated() {
        bail!("Not signed in. Run `hrdesk login` first.");
    }

    let center = NotificationCenter::new(session.clone());
    if !center.refresh().await {
        bail!("Could not load notifications");
    }

    let items = center.items();
    if items.is_empty() {
        println!("No notifications.");
        return Ok(());
    }
    for item in &items {
        let marker = if item.is_read { " " } else { "*" };
        let when = item
            .timestamp
            .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        println!("{} {:>5}  {:16}  {}", marker, item.id, when, item.message);
    }
    println!("\n{} unread", center.unread_count());
    Ok(())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    let value = line.trim().to_string();
    if value.is_empty() {
        bail!("No input");
    }
    Ok(value)
}
