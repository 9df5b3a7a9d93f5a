use anyhow::{Context, Result};
use clap::Parser;
use std::sync::Arc;

use redamancy_client::account;
use redamancy_client::auth::{FileCredentialStore, LoggingSessionHooks, Scope, TokenManager};
use redamancy_client::config::{CliArgs, Command, Config};
use redamancy_client::error::ApiError;
use redamancy_client::gateway::{RequestGateway, RequestOptions};
use redamancy_client::http_client::HttpClient;
use redamancy_client::url::BaseUrl;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = Config::from_args(&args);
    config.validate()?;

    // Initialize logging with the configured level
    let log_level = config.log_level.to_lowercase();
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(
        credentials_file = %config.credentials_file.display(),
        environment = ?config.environment,
        "Configuration loaded"
    );

    let gateway = build_gateway(&config)?;

    if let Err(e) = run(args.command, &gateway).await {
        // Backend failures carry a message meant for the user
        if let Some(api_error) = e.downcast_ref::<ApiError>() {
            tracing::debug!(status = api_error.status, kind = %api_error.kind, "Command failed");
            eprintln!("Error: {}", api_error.user_message());
            std::process::exit(1);
        }
        return Err(e);
    }

    Ok(())
}

async fn run(command: Command, gateway: &RequestGateway) -> Result<()> {
    match command {
        Command::Url { endpoint } => {
            gateway.wait_until_initialized().await;
            println!("{}", gateway.build_url(&endpoint));
        }

        Command::Get { endpoint } => {
            let response = gateway.get(&endpoint, RequestOptions::new()).await?;
            let body = response.text().await.context("Failed to read response body")?;
            println!("{}", body);
        }

        Command::Login { username, password } => {
            let username = match username {
                Some(username) => username,
                None => dialoguer::Input::<String>::new()
                    .with_prompt("Username")
                    .interact_text()?,
            };
            let password = match password {
                Some(password) => password,
                None => dialoguer::Password::new()
                    .with_prompt("Password")
                    .interact()?,
            };

            let response = account::login(gateway, &username, &password).await?;
            println!(
                "Logged in as {}{}",
                username,
                if response.admin_tokens.is_some() { " (admin)" } else { "" }
            );
        }

        Command::Logout => {
            account::logout(gateway).await;
            println!("Logged out");
        }

        Command::Refresh { scope } => {
            let credentials = gateway.tokens().refresh(scope).await?;
            println!(
                "Refreshed {} tokens, valid until {}",
                scope,
                credentials.expires_at.to_rfc3339()
            );
        }

        Command::Validate { scope } => {
            let state = gateway.tokens().state(scope).await;
            let valid = gateway.tokens().validate(scope).await;
            let verdict = if valid { "valid" } else { "invalid" };
            println!("{}: {:?}, backend says {}", scope, state, verdict);
        }

        Command::Token { scope } => match gateway.get_valid_access_token(scope).await {
            Some(token) => println!("{}", token),
            None => anyhow::bail!("No valid {} token, please log in", scope),
        },

        Command::Watch => {
            for scope in Scope::ALL {
                let state = gateway.tokens().state(scope).await;
                tracing::info!(scope = %scope, state = ?state, "Watching credentials");
            }

            let handle = gateway.tokens().spawn_auto_refresh();
            shutdown_signal().await;
            handle.abort();
            tracing::info!("Stopped automatic token refresh");
        }
    }

    Ok(())
}

fn build_gateway(config: &Config) -> Result<RequestGateway> {
    let http = HttpClient::new(config.connect_timeout(), config.request_timeout())?;
    let base_url = BaseUrl::default();

    let tokens = TokenManager::new(
        http.client().clone(),
        base_url.clone(),
        Arc::new(FileCredentialStore::new(&config.credentials_file)),
        Arc::new(LoggingSessionHooks),
        config.token_settings(),
    );

    Ok(RequestGateway::new(http, tokens, config.resolver(), base_url))
}

/// Wait for Ctrl+C or SIGTERM
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal, shutting down...");
        },
        _ = terminate => {
            tracing::info!("Received terminate signal, shutting down...");
        },
    }
}
