// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Smoke-test harness for `calsync-core`.
//!
//! Exercises discovery (spec §4.4) followed by one push/pull sync cycle
//! (spec §4.8) against a configured server, in the spirit of the
//! `calsync-caldav` crate's own `caldav_cli.rs` example. This is not the
//! on-device UI (spec §1 "Out of scope") — it exists only so the crate
//! has a runnable surface to point at a real `CalDAV` server.

use std::error::Error;
use std::io::Write as _;
use std::sync::Mutex;

use async_trait::async_trait;
use calsync_caldav::{discover, for_account, AuthMethod, CalDavConfig, ReqwestCalDavClient};
use calsync_core::{CancellationToken, CredentialStore, LocalDb, NullOccurrenceSink, Provider, SyncConfig, SyncOrchestrator};
use clap::Parser;
use colored::Colorize as _;

/// CLI entry point for a one-shot discovery + sync cycle.
#[derive(Parser)]
#[command(name = "calsync-sync-cli")]
#[command(about = "Discover a CalDAV account and run one sync cycle", long_about = None)]
#[command(version)]
struct Cli {
    /// CalDAV server URL (or `CALSYNC_SERVER`).
    #[arg(long)]
    server: Option<String>,
    /// Username for basic auth (or `CALSYNC_USERNAME`).
    #[arg(long)]
    username: Option<String>,
    /// Password for basic auth (or `CALSYNC_PASSWORD`).
    #[arg(long)]
    password: Option<String>,
    /// Bearer token, used instead of username/password (or `CALSYNC_TOKEN`).
    #[arg(long)]
    token: Option<String>,
    /// Accept invalid/self-signed TLS certificates.
    #[arg(long)]
    trust_insecure: bool,
    /// Request timeout in seconds.
    #[arg(long, default_value = "30")]
    timeout: u64,
    /// Local state directory; omit to use an in-memory store that is
    /// discarded when the process exits.
    #[arg(long)]
    state_dir: Option<std::path::PathBuf>,
}

impl Cli {
    fn build_config(&self) -> Result<CalDavConfig, Box<dyn Error>> {
        let base_url = self
            .server
            .clone()
            .or_else(|| std::env::var("CALSYNC_SERVER").ok())
            .ok_or("--server or CALSYNC_SERVER must be set")?;

        let username = self.username.clone().or_else(|| std::env::var("CALSYNC_USERNAME").ok());
        let password = self.password.clone().or_else(|| std::env::var("CALSYNC_PASSWORD").ok());
        let token = self.token.clone().or_else(|| std::env::var("CALSYNC_TOKEN").ok());

        let auth = if let Some(token) = token {
            AuthMethod::Bearer { token }
        } else if let (Some(username), Some(password)) = (username, password) {
            AuthMethod::Basic { username, password }
        } else {
            AuthMethod::None
        };

        Ok(CalDavConfig { base_url, calendar_home: None, auth, timeout_secs: self.timeout, trust_insecure: self.trust_insecure, ..CalDavConfig::default() })
    }
}

/// Holds credentials for the lifetime of this process only (spec §6
/// "the core never persists a password... itself"); a real host wires
/// this to its platform keychain instead.
#[derive(Debug, Default)]
struct InProcessCredentialStore(Mutex<std::collections::HashMap<i64, String>>);

#[async_trait]
impl CredentialStore for InProcessCredentialStore {
    async fn save(&self, account_id: i64, credentials: &str) -> bool {
        self.0.lock().expect("credential store lock poisoned").insert(account_id, credentials.to_string());
        true
    }

    async fn load(&self, account_id: i64) -> Option<String> {
        self.0.lock().expect("credential store lock poisoned").get(&account_id).cloned()
    }

    async fn delete(&self, account_id: i64) {
        self.0.lock().expect("credential store lock poisoned").remove(&account_id);
    }
}

fn credentials_blob(auth: &AuthMethod) -> String {
    match auth {
        AuthMethod::None => String::new(),
        AuthMethod::Basic { username, password } => format!("basic:{username}:{password}"),
        AuthMethod::Bearer { token } => format!("bearer:{token}"),
    }
}

async fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = cli.build_config()?;
    let client = ReqwestCalDavClient::new(config.clone())?;
    let host = url_host(&config.base_url);
    let quirks = for_account(Provider::Caldav.as_str(), &host);

    println!("{}", "Discovering calendar home...".dimmed());
    let outcome = discover(&client, quirks.as_ref(), &config.base_url).await?;
    println!("{} principal {}", "✓".green(), outcome.principal_url);
    println!("{} calendar home {}", "✓".green(), outcome.calendar_home_url);

    let db = LocalDb::open(cli.state_dir.as_deref()).await?;
    let credentials = InProcessCredentialStore::default();

    let email = match &config.auth {
        AuthMethod::Basic { username, .. } => username.clone(),
        _ => config.base_url.clone(),
    };

    let account = db.accounts.find_by_identity(Provider::Caldav, &email, Some(&outcome.calendar_home_url)).await?;
    let account_id = match account {
        Some(a) => a.id,
        None => {
            let id = db.accounts.insert(Provider::Caldav, &email, &email).await?;
            if !credentials.save(id, &credentials_blob(&config.auth)).await {
                db.accounts.delete(id).await?;
                return Err("credential store rejected save; account rolled back".into());
            }
            db.accounts.set_discovered_urls(id, &outcome.principal_url, &outcome.calendar_home_url).await?;
            id
        }
    };

    let existing = db.calendars.list_for_account(account_id).await?;
    for found in &outcome.calendars {
        let already_known = existing.iter().any(|c| c.caldav_url == found.href.as_str());
        if already_known {
            continue;
        }
        let name = found.display_name.clone().unwrap_or_else(|| found.href.to_string());
        let color = parse_color(found.color.as_deref());
        db.calendars.insert(account_id, found.href.as_str(), &name, color, false).await?;
        println!("{} discovered calendar {}", "✓".green(), name);
    }

    println!("{}", "Running one sync cycle...".dimmed());
    let orchestrator = SyncOrchestrator::new(&db, &client, quirks.as_ref(), &NullOccurrenceSink, &SyncConfig::default());
    let cancel = CancellationToken::new();
    let now = unix_millis_now();
    let sessions = orchestrator.sync_account(account_id, now, &cancel).await?;

    for session in &sessions {
        println!(
            "{} calendar {} -> {:?} (+{} ~{} -{})",
            "✓".green(),
            session.calendar_id,
            session.status,
            session.added,
            session.updated,
            session.deleted
        );
    }

    db.close().await;
    Ok(())
}

fn url_host(base_url: &str) -> String {
    base_url.split("://").nth(1).unwrap_or(base_url).split(['/', ':']).next().unwrap_or(base_url).to_string()
}

/// Converts a `CALDAV:calendar-color` value (`#RRGGBB` or `#RRGGBBAA`,
/// RFC 7986) into the `0xAARRGGBB` representation stored on [`Calendar`](calsync_core::Calendar).
fn parse_color(hex: Option<&str>) -> u32 {
    const DEFAULT: u32 = 0xFF3B_82F6;
    let Some(hex) = hex else { return DEFAULT };
    let trimmed = hex.trim_start_matches('#');
    match trimmed.len() {
        6 => u32::from_str_radix(trimmed, 16).map(|rgb| 0xFF00_0000 | rgb).unwrap_or(DEFAULT),
        8 => u32::from_str_radix(trimmed, 16)
            .map(|rgba| (rgba << 24 | rgba >> 8) & 0xFFFF_FFFF)
            .unwrap_or(DEFAULT),
        _ => DEFAULT,
    }
}

fn unix_millis_now() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX)).unwrap_or(0)
}

fn format_error(err: &(dyn Error + 'static)) -> String {
    let err_str = err.to_string();
    if err_str.contains("401") || err_str.contains("403") || err_str.contains("auth") {
        format!("{} Authentication failed", "Error:".red().bold())
    } else if err_str.contains("404") || err_str.contains("not found") {
        format!("{} Resource not found", "Error:".red().bold())
    } else if err_str.contains("412") || err_str.contains("conflict") {
        format!("{} ETag conflict - resource was modified by another client", "Error:".red().bold())
    } else if err_str.contains("TLS") || err_str.contains("certificate") {
        format!("{} TLS error - retry with --trust-insecure if you trust this server", "Error:".red().bold())
    } else {
        format!("{} {err_str}", "Error:".red().bold())
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    dotenvy::from_filename(".env.local").ok();

    let cli = Cli::parse();
    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(&cli));

    if let Err(e) = result {
        std::io::stdout().flush().ok();
        eprintln!("{}", format_error(e.as_ref()));
        std::process::exit(1);
    }

    Ok(())
}
