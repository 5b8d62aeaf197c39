use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use trip_planner::api::rest::{cors_layer, router_with_static};
use trip_planner::config::{Config, LogFormat};
use trip_planner::error::AppError;
use trip_planner::models::user::{NewUser, Role, User};
use trip_planner::state::AppState;
use trip_planner::store::{EntityStore, StoreTx};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = Config::from_env()?;

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(config.log_level.clone()))
        .with_target(false);
    match config.log_format {
        LogFormat::Json => subscriber.json().init(),
        LogFormat::Compact => subscriber.compact().init(),
    }

    let state = Arc::new(AppState::new(config.event_buffer_size));

    if let Some(email) = config.bootstrap_admin_email.as_deref() {
        bootstrap_admin(&state, email)?;
    }

    let app = router_with_static(state.clone(), &config.static_dir)
        .layer(cors_layer(&config.allowed_origins));

    let bind_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|err| AppError::Internal(format!("failed to bind {bind_addr}: {err}")))?;

    tracing::info!(
        http_port = config.http_port,
        static_dir = %config.static_dir,
        "http server started"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| AppError::Internal(format!("server error: {err}")))?;

    Ok(())
}

/// Seeds the first admin so a fresh store can be administered at all.
fn bootstrap_admin(state: &AppState, email: &str) -> Result<(), AppError> {
    let normalized = email.to_lowercase();
    if let Some(existing) = state
        .store
        .list_users()
        .into_iter()
        .find(|user| user.email == normalized)
    {
        tracing::info!(user_id = %existing.id, email = %existing.email, "bootstrap admin already present");
        return Ok(());
    }

    let admin = User::new(NewUser {
        email: normalized,
        full_name: "Administrator".to_string(),
        role: Role::Admin,
    })?;

    let mut tx = state.store.begin()?;
    tx.insert_user(admin.clone())?;
    tx.commit()?;

    tracing::info!(user_id = %admin.id, email = %admin.email, "bootstrap admin created");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
}
