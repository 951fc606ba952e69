// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! VeloCoach device CLI
//!
//! Usage: `velocoach [status|login|sync|retry-failed|logout]`

use std::error::Error;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use velocoach::{
    config::Config,
    services::{DeviceAuthState, RestoreOutcome},
    time_utils::{format_ms_rfc3339, now_ms},
    AppContext,
};

const USAGE: &str = "usage: velocoach [status|login|sync|retry-failed|logout]";

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    init_logging()?;

    let command = std::env::args().nth(1).unwrap_or_else(|| "status".to_string());

    let config = Config::from_env()?;
    tracing::info!(
        api = %config.api_base_url,
        data_dir = %config.data_dir.display(),
        "Starting VeloCoach"
    );

    let ctx = AppContext::open(config)?;

    // Recovery runs before anything else can start a ride. The checkpoint
    // store failing must not block commands that never touch it.
    let recovery = match ctx.checkpoints.restore_on_startup(now_ms()) {
        Ok(outcome) => {
            tracing::info!(outcome = ?outcome, "Checkpoint recovery check complete");
            Some(outcome)
        }
        Err(e) => {
            tracing::error!(error = %e, "Checkpoint recovery check failed");
            None
        }
    };

    let checkpoint_task = recovery.as_ref().map(|_| ctx.spawn_checkpoint_task());

    match command.as_str() {
        "status" => status(&ctx, recovery.as_ref())?,
        "login" => login(&ctx).await?,
        "sync" => {
            let summary = ctx.sync.sync_all().await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            if summary.needs_login() {
                println!("Run `velocoach login` to sign in again.");
            }
        }
        "retry-failed" => {
            let moved = ctx.records.retry_failed(None)?;
            println!("{} failed record(s) queued for the next sync", moved);
        }
        "logout" => {
            ctx.logout()?;
            println!("Logged out");
        }
        _ => {
            eprintln!("{}", USAGE);
            std::process::exit(2);
        }
    }

    if let Some(task) = checkpoint_task {
        task.abort();
    }
    Ok(())
}

fn status(ctx: &AppContext, recovery: Option<&RestoreOutcome>) -> Result<(), Box<dyn Error>> {
    match ctx.credentials.load()? {
        Some(creds) => println!("Logged in as {} <{}>", creds.display_name, creds.email),
        None => println!("Not logged in"),
    }

    println!("{}", serde_json::to_string_pretty(&ctx.records.counts()?)?);

    match recovery {
        Some(RestoreOutcome::Restored {
            ride_start_time_ms,
            sample_count,
        }) => println!(
            "Recovered ride started at {} ({} samples)",
            format_ms_rfc3339(*ride_start_time_ms),
            sample_count
        ),
        None => println!("Checkpoint store unavailable; ride recovery did not run"),
        _ => {}
    }
    Ok(())
}

async fn login(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    match ctx.auth.start().await {
        DeviceAuthState::WaitingForUser {
            user_code,
            verification_uri,
            expires_in,
        } => {
            println!("Visit {} and enter code {}", verification_uri, user_code);
            println!("The code expires in {} seconds. Press Ctrl-C to cancel.", expires_in);
        }
        DeviceAuthState::Error { message } => {
            println!("Login failed: {}", message);
            return Ok(());
        }
        other => {
            println!("Login not started: {:?}", other);
            return Ok(());
        }
    }

    let flow = ctx.auth.clone();
    let canceller = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flow.cancel();
        }
    });

    let result = ctx.auth.poll().await;
    canceller.abort();

    match result {
        Some(creds) => println!("Logged in as {} <{}>", creds.display_name, creds.email),
        None => match ctx.auth.state() {
            DeviceAuthState::Expired => println!("The code expired. Run `velocoach login` again."),
            DeviceAuthState::AccessDenied => println!("Access was denied."),
            DeviceAuthState::Error { message } => println!("Login failed: {}", message),
            _ => println!("Login cancelled"),
        },
    }
    Ok(())
}

/// Initialize structured JSON logging on stderr.
fn init_logging() -> Result<(), Box<dyn Error>> {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("velocoach=debug".parse()?)
                .add_directive("info".parse()?),
        )
        .with(format)
        .init();
    Ok(())
}
