//! sessionward - command-line front end for a session-aware API client.
//!
//! Logs in with username/password (or uses an API token), issues API calls
//! through the request gate and can stay running to keep the session
//! alive through scheduled re-authentication.

mod config;

use std::io;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sessionward_core::{
    ApiError, AuthEvent, AuthOutcome, Client, CredentialMode, Credentials, Keychain, RequestOptions,
};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use config::Config;

const USAGE: &str = "\
Usage: sessionward <command>

Commands:
  login [--save]                     Authenticate and print the identity response
  get <path>                         GET an API path
  request <METHOD> <path> [json]     Call an API path with an optional JSON body
  watch                              Authenticate and report re-authentication until Ctrl-C
  forget                             Remove the stored password from the keychain";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first().map(String::as_str) else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };

    let mut config = Config::load()?;

    match command {
        "login" => login(&mut config, args.iter().any(|a| a == "--save")).await,
        "get" => {
            let path = args.get(1).context("get needs a path")?;
            call(&config, path, RequestOptions::get()).await
        }
        "request" => {
            let method = args.get(1).context("request needs a method")?;
            let path = args.get(2).context("request needs a path")?;
            let method = method
                .to_uppercase()
                .parse()
                .with_context(|| format!("Invalid HTTP method: {}", method))?;
            let mut options = RequestOptions::new(method);
            if let Some(body) = args.get(3) {
                let body: Value = serde_json::from_str(body).context("Request body must be JSON")?;
                options = options.with_body(body);
            }
            call(&config, path, options).await
        }
        "watch" => watch(&config).await,
        "forget" => forget(&config),
        "-h" | "--help" | "help" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => bail!("Unknown command: {}\n\n{}", other, USAGE),
    }
}

fn build_client(config: &Config) -> Result<Client> {
    let resolved = config.resolve(|key| std::env::var(key).ok());
    let options = config.client_options(resolved, true)?;
    info!(mode = %options.mode(), base_url = options.base_url(), "Creating client");
    Client::new(options).context("Failed to create API client")
}

/// Authenticate in password mode; token mode has nothing to do.
async fn ensure_session(client: &Client) -> Result<()> {
    match client.authenticate().await {
        Ok(_) | Err(ApiError::NotNeeded) => Ok(()),
        Err(e) => Err(e).context("Authentication failed"),
    }
}

async fn login(config: &mut Config, save: bool) -> Result<()> {
    let client = build_client(config)?;
    if client.mode() == CredentialMode::Token {
        eprintln!("Using an API token; no login needed.");
        return Ok(());
    }

    let data = client.authenticate().await.context("Authentication failed")?;
    print_json(&data.body)?;
    if let Some(expires_at) = data.session_expires_at {
        eprintln!("Session valid until {}", expires_at.to_rfc3339());
    }

    if save {
        if let Credentials::Password { username, password } = client.options().credentials() {
            Keychain::store(client.options().base_url(), username, password)?;
            config.username = Some(username.clone());
            config.base_url = Some(client.options().base_url().to_string());
            config.save()?;
            eprintln!("Saved credentials for {}", username);
        }
    }

    client.destroy();
    Ok(())
}

async fn call(config: &Config, path: &str, options: RequestOptions) -> Result<()> {
    let client = build_client(config)?;
    ensure_session(&client).await?;

    let result = client.request(path, options).await;
    client.destroy();

    let body = result.with_context(|| format!("Request to {} failed", path))?;
    print_json(&body)
}

async fn watch(config: &Config) -> Result<()> {
    let client = build_client(config)?;
    if client.mode() == CredentialMode::Token {
        bail!("watch needs username/password credentials; API tokens do not expire");
    }

    let mut events = client.subscribe();
    ensure_session(&client).await?;
    match client.session_expires_at() {
        Some(at) => eprintln!("Session valid until {}; watching for re-authentication", at.to_rfc3339()),
        None => eprintln!("Session has no expiry; nothing will be re-authenticated"),
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => report(&event),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Missed authentication events"),
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.destroy();
    Ok(())
}

fn report(event: &AuthEvent) {
    eprintln!("{}", describe(event, Utc::now()));
}

fn describe(event: &AuthEvent, now: DateTime<Utc>) -> String {
    match event.outcome {
        AuthOutcome::Success(ref data) => match data.time_until_expiry(now) {
            Some(left) => format!(
                "[{:?}] re-authenticated, session valid for {}s more",
                event.trigger,
                left.num_seconds()
            ),
            None => format!("[{:?}] re-authenticated", event.trigger),
        },
        AuthOutcome::Failure(ref err) => format!("[{:?}] authentication failed: {}", event.trigger, err),
    }
}

fn forget(config: &Config) -> Result<()> {
    let resolved = config.resolve(|key| std::env::var(key).ok());
    let username = resolved
        .username
        .context("No username configured")?;
    if !Keychain::has_credentials(&resolved.base_url, &username) {
        eprintln!("No stored password for {}", username);
        return Ok(());
    }
    Keychain::delete(&resolved.base_url, &username)?;
    eprintln!("Removed stored password for {}", username);
    Ok(())
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use sessionward_core::{AuthData, AuthTrigger};
    use serde_json::json;

    #[test]
    fn test_describe_reports_remaining_session_time() {
        let now = Utc::now();
        let event = AuthEvent {
            trigger: AuthTrigger::Scheduled,
            outcome: AuthOutcome::Success(AuthData {
                body: json!({"id": 1}),
                authenticated_at: now,
                session_expires_at: Some(now + chrono::Duration::seconds(300)),
            }),
        };
        assert_eq!(
            describe(&event, now),
            "[Scheduled] re-authenticated, session valid for 300s more"
        );
    }

    #[test]
    fn test_describe_reports_failure() {
        let event = AuthEvent {
            trigger: AuthTrigger::Explicit,
            outcome: AuthOutcome::Failure(ApiError::Abandoned),
        };
        assert!(describe(&event, Utc::now()).starts_with("[Explicit] authentication failed: "));
    }
}
