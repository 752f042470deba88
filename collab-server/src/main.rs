use collab_server::classroom::Classroom;
use collab_server::{server, storage};
mod cli;
mod install;

use std::net::SocketAddr;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();
    if let Some(cmd) = args.command {
        std::process::exit(run_command(cmd));
    }
    // Console-only logging with env-driven level
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_ansi(true)
        .init();

    let config = match server::AppConfig::load() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, "Failed to load config");
            std::process::exit(2);
        }
    };

    let db_path = std::env::var("DB_PATH").unwrap_or_else(|_| "data/collab.db".into());
    // Ensure data dir exists when using default
    if let Some(parent) = std::path::Path::new(&db_path).parent()
        && !parent.as_os_str().is_empty()
    {
        let _ = std::fs::create_dir_all(parent);
    }
    let store = match storage::Store::connect_sqlite(&db_path, config.store_timeout()).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, path=%db_path, "Failed to connect DB");
            std::process::exit(3);
        }
    };

    // Decide listen port: env PORT overrides config.listen_port, default 5151
    let port = std::env::var("PORT")
        .ok()
        .and_then(|s| s.parse::<u16>().ok())
        .or(config.listen_port)
        .unwrap_or(5151);

    let classroom = Classroom::new(store.clone(), config.classroom_options());
    let state = server::AppState::new(config, classroom);
    let shutdown_token = state.shutdown_token();
    let shutdown_token_for_server = shutdown_token.clone();

    let app = server::router(state);

    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    tracing::info!(%addr, "Starting server");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(error=%e, %addr, "Failed to bind listener");
            std::process::exit(4);
        }
    };

    let mut server_task = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_token_for_server.cancelled_owned())
            .await
    });

    // Wait for OS signal; then trigger graceful, and if it hangs beyond timeout, force abort.
    shutdown_signal().await;
    tracing::info!("shutdown: initiating graceful stop");
    shutdown_token.cancel();
    match tokio::time::timeout(std::time::Duration::from_secs(3), &mut server_task).await {
        Ok(join_res) => match join_res {
            Ok(Ok(())) => {}
            Ok(Err(err)) => tracing::error!(%err, "server error"),
            Err(e) => tracing::error!(error=%e, "server task join error"),
        },
        Err(_) => {
            tracing::warn!("shutdown: forcing server abort due to timeout");
            server_task.abort();
        }
    }
    store.close(std::time::Duration::from_secs(3)).await;
    tracing::info!("shutdown: done");
}

fn run_command(cmd: cli::Command) -> i32 {
    match cmd {
        cli::Command::Install(args) => {
            let bin = args.bin_path.clone().unwrap_or_else(|| {
                std::env::current_exe()
                    .unwrap_or_else(|_| std::path::PathBuf::from("/usr/local/bin/collab-server"))
            });
            match install::install_system(&args, &bin) {
                Ok(()) => 0,
                Err(e) => {
                    eprintln!("Install error: {}", e);
                    2
                }
            }
        }
        cli::Command::Uninstall {
            unit_path,
            remove_config,
            config_path,
        } => match install::uninstall_system(&unit_path, remove_config, &config_path) {
            Ok(()) => 0,
            Err(e) => {
                eprintln!("Uninstall error: {}", e);
                2
            }
        },
        cli::Command::CheckConfig { config_path } => {
            let loaded = match config_path {
                Some(p) => server::AppConfig::load_from_path(p),
                None => server::AppConfig::load(),
            };
            match loaded {
                Ok(cfg) => {
                    println!(
                        "Config OK (session_writes={:?}, store_timeout_ms={}, admin key {})",
                        cfg.session_writes,
                        cfg.store_timeout_ms,
                        if cfg.admin_key().is_some() { "set" } else { "not set" }
                    );
                    0
                }
                Err(e) => {
                    eprintln!("Config error: {}", e);
                    2
                }
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (mut sigint, mut sigterm) = match (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) {
            (Ok(i), Ok(t)) => (i, t),
            _ => {
                tracing::warn!("shutdown: unix signal handlers unavailable, using Ctrl+C");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown: received Ctrl+C");
    }
}
