// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use std::env;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use expense_dashboard::config::APP_DIR;
use expense_dashboard::export::export_to_path;
use expense_dashboard::{sign_in, sign_out, Backend, Preferences, RestBackend};

const DEFAULT_LOG_FILTER: &str = "expense_dashboard=info";
const LOG_FILE: &str = "expense-dashboard.log";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("ui");

    if command == "ui" {
        init_file_logging()?;
    } else {
        init_stderr_logging();
    }

    match command {
        "login" => {
            let (Some(email), Some(password)) = (args.get(2), args.get(3)) else {
                bail!("usage: expense-dashboard login <email> <password>");
            };
            run_login(email, password)?;
        }
        "logout" => run_logout()?,
        "export" => {
            let Some(path) = args.get(2) else {
                bail!("usage: expense-dashboard export <file.csv>");
            };
            run_export(Path::new(path))?;
        }
        "ui" => run_ui_mode()?,
        other => bail!("unknown command '{}' (expected login, logout, export or ui)", other),
    }

    Ok(())
}

fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// The terminal belongs to the dashboard, so logs go to a file
fn init_file_logging() -> Result<()> {
    let dir = dirs::config_dir()
        .map(|d| d.join(APP_DIR))
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    let file = File::options()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("opening log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

fn preferences_path() -> Result<PathBuf> {
    Preferences::default_path().context("no user config directory on this system")
}

/// Backend from the environment, with the last saved session restored
fn connect() -> Result<(RestBackend, Preferences, PathBuf)> {
    let backend = RestBackend::from_env().context("configuring backend")?;
    let path = preferences_path()?;
    let prefs = Preferences::load(&path)?;
    if let Some(session) = prefs.session.clone() {
        backend.restore_session(session);
    }
    Ok((backend, prefs, path))
}

/// Persist whatever session the backend holds now
fn save_session(backend: &RestBackend, prefs: &mut Preferences, path: &Path) -> Result<()> {
    prefs.session = backend.session();
    prefs.save(path)
}

fn run_login(email: &str, password: &str) -> Result<()> {
    println!("🔐 Signing in as {}...", email.trim());
    let (backend, mut prefs, path) = connect()?;

    match sign_in(&backend, email, password) {
        Ok(_) => {
            save_session(&backend, &mut prefs, &path)?;
            println!("✓ Signed in, session saved to {}", path.display());
            Ok(())
        }
        Err(e) => {
            // sign_in already signed out a session the gate refused
            prefs.forget_session();
            prefs.save(&path)?;
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

fn run_logout() -> Result<()> {
    let (backend, mut prefs, path) = connect()?;
    if let Err(e) = sign_out(&backend) {
        tracing::warn!(error = %e, "remote sign-out failed; dropping local session anyway");
    }
    prefs.forget_session();
    prefs.save(&path)?;
    println!("👋 Signed out");
    Ok(())
}

fn run_export(target: &Path) -> Result<()> {
    println!("📤 Exporting expenses...");
    let (backend, mut prefs, path) = connect()?;

    let count = export_to_path(&backend, target)?;
    save_session(&backend, &mut prefs, &path)?;

    println!("✓ Wrote {} expenses to {}", count, target.display());
    Ok(())
}

#[cfg(feature = "tui")]
fn run_ui_mode() -> Result<()> {
    println!("🖥️  Loading Expense Dashboard...\n");
    let (backend, prefs, path) = connect()?;

    if prefs.session.is_none() {
        eprintln!("❌ Not signed in!");
        eprintln!("   Run: expense-dashboard login <email> <password>");
        std::process::exit(1);
    }

    let currency = backend.config().default_currency.clone();
    let mut app = ui::App::new(&backend, prefs, currency);
    app.open_initial();
    ui::run_ui(&mut app)?;

    let mut prefs = app.into_preferences();
    save_session(&backend, &mut prefs, &path)?;

    println!("\n✅ Dashboard closed");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode() -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or run the API: cargo run --bin expense-server --features server");
    std::process::exit(1);
}
