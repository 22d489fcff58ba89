//! BIM Portal client - authentication health check
//!
//! Loads configuration, authenticates against the portal when credentials
//! are configured, reports the token status and logs out again.

use std::process::ExitCode;
use std::sync::Arc;

use bimportal_application::{AuthService, TokenStore};
use bimportal_infrastructure::{BimPortalConfig, HttpAuthGateway, SystemClock};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let config = BimPortalConfig::from_env();
    println!("Base URL:         {}", config.base_url);
    println!("Login URL:        {}", config.login_url());
    println!("Request timeout:  {}s", config.request_timeout.as_secs());

    let issues = config.validate();
    if !issues.is_empty() {
        println!("Configuration issues:");
        for issue in &issues {
            println!("  - {issue}");
        }
        return ExitCode::FAILURE;
    }

    let gateway = match HttpAuthGateway::new(&config) {
        Ok(gateway) => gateway,
        Err(e) => {
            tracing::error!(error = %e, "Could not create HTTP client");
            return ExitCode::FAILURE;
        }
    };
    let store = TokenStore::with_refresh_margin(
        Arc::new(SystemClock::new()),
        config.token_refresh_margin_seconds,
    );
    let auth = AuthService::new(gateway, store, config.credentials());

    if !auth.has_credentials() {
        println!("Credentials:      not configured, only public access is available");
        return ExitCode::SUCCESS;
    }

    match auth.get_valid_token().await {
        Ok(_) => {
            println!("Authentication:   OK");
            println!("Token status:     {}", auth.token_status().await.display_message());
            match auth.current_user_id().await {
                Some(user_id) => println!("User id:          {user_id}"),
                None => println!("User id:          not available"),
            }
            auth.logout().await;
            ExitCode::SUCCESS
        }
        Err(e) => {
            println!("Authentication:   FAILED");
            print_error_chain(&e);
            ExitCode::FAILURE
        }
    }
}

/// Installs the fmt subscriber, honouring `RUST_LOG` then `LOG_LEVEL`.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        tracing_subscriber::EnvFilter::new(level.to_lowercase())
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

fn print_error_chain(error: &dyn std::error::Error) {
    println!("  {error}");
    let mut source = error.source();
    while let Some(cause) = source {
        println!("  caused by: {cause}");
        source = cause.source();
    }
}
