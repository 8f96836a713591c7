use clap::Parser;
use std::net::SocketAddr;
use tokio::net::TcpListener;

use relay_server::config::{generate_config_template, CliArgs, Config};
use relay_server::state::{AppState, Limits};
use relay_server::{auth, db, routes};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CliArgs::parse();

    if cli.generate_config {
        print!("{}", generate_config_template());
        return Ok(());
    }

    // Layered precedence: defaults < TOML < env < CLI
    let config = Config::load(&cli)?;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("relay_server=info"));
    if config.json_logs {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().pretty().with_env_filter(filter).init();
    }

    tracing::info!("Chat relay server v{} starting", env!("CARGO_PKG_VERSION"));

    let db = db::init_db(&config.data_dir)?;

    let jwt_secret = match &config.jwt_secret {
        Some(secret) if !secret.is_empty() => {
            tracing::info!("Using JWT secret from configuration");
            secret.as_bytes().to_vec()
        }
        _ => auth::jwt::load_or_generate_jwt_secret(&config.data_dir)?,
    };

    let app_state = AppState::new(db, jwt_secret, Limits::from(&config));

    if let Some(email) = &cli.create_user {
        let (user, token) = auth::provision::create_user_with_token(
            app_state.store.as_ref(),
            &app_state.jwt_secret,
            email,
            cli.name.as_deref(),
        )?;
        tracing::info!("==========================================================");
        tracing::info!("  User: {} ({})", user.display_name(), user.id);
        tracing::info!("  Access token (valid 7 days) printed to stdout");
        tracing::info!("==========================================================");
        println!("{}", token);
        return Ok(());
    }

    let app = routes::build_router(app_state);

    let addr = format!("{}:{}", config.bind_address, config.port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
