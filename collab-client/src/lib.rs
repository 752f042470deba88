use std::io::Read;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use collab_shared::api::{self, ContentDto, ShareReq, rest::RestError};
use collab_shared::domain::ContentKind;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod cli;
pub mod config;
pub mod login;
pub mod poll;
pub mod watch;

pub use cli::{Cli, Command};
pub use config::{ClientConfig, load_config, resolve_config_path};
use poll::PollPolicy;
use watch::Viewer;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid input: {0}")]
    Input(String),
}

impl From<RestError> for AppError {
    fn from(e: RestError) -> Self {
        AppError::Http(e.to_string())
    }
}

fn init_tracing() {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

pub async fn run(cli: Cli) -> Result<(), AppError> {
    init_tracing();
    let cfg_path = resolve_config_path(cli.config)?;

    match cli.command {
        Command::LoginStudent { server, name, code } => {
            login::login(server, login::LoginAs::Student { name, code }, cfg_path).await
        }
        Command::LoginTeacher {
            server,
            name,
            email,
            external_id,
        } => {
            login::login(
                server,
                login::LoginAs::Teacher {
                    name,
                    email,
                    external_id,
                },
                cfg_path,
            )
            .await
        }
        cmd => {
            let cfg = load_config(&cfg_path)?;
            info!(path = ?cfg_path, "loaded config");
            run_authenticated(cmd, &cfg).await
        }
    }
}

async fn run_authenticated(cmd: Command, cfg: &ClientConfig) -> Result<(), AppError> {
    let (token, name) = cfg.identity()?;
    let base = cfg.base_url();
    let viewer = Viewer {
        base: base.clone(),
        token: token.to_string(),
        name: name.to_string(),
        role: cfg.role,
    };
    match cmd {
        Command::SetCode { code: None } => {
            let code = api::rest::get_access_code(&base, token).await?;
            println!("{}", code.code);
        }
        Command::SetCode { code: Some(code) } => {
            api::rest::set_access_code(&base, token, &code).await?;
            println!("Access code updated");
        }
        Command::StartSession => {
            let created = api::rest::create_session(&base, token).await?;
            if created.confirmed {
                println!("Session {} is ready", created.session_id);
            } else {
                println!("Session {} submitted", created.session_id);
            }
        }
        Command::Update {
            session,
            text,
            file,
        } => {
            let body = match (text, file) {
                (Some(t), _) => t,
                (None, Some(p)) => std::fs::read_to_string(&p)?,
                (None, None) => read_stdin()?,
            };
            api::rest::update_session_content(&base, token, &session, &body).await?;
            println!("Session {session} updated");
        }
        Command::Watch { session } => {
            let cancel = CancellationToken::new();
            let view = watch::watch_session(viewer, session, PollPolicy::default(), cancel.clone());
            tokio::pin!(view);
            tokio::select! {
                res = &mut view => res?,
                _ = tokio::signal::ctrl_c() => {
                    cancel.cancel();
                    view.await?;
                }
            }
        }
        Command::Leaderboard { watch: false } => {
            let board = api::rest::leaderboard(&base, token).await?;
            watch::print_leaderboard(&board);
        }
        Command::Leaderboard { watch: true } => {
            let cancel = CancellationToken::new();
            let stop = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_err() {
                    warn!("ctrl-c handler unavailable");
                }
                stop.cancel();
            });
            watch::watch_leaderboard(viewer, PollPolicy::default(), cancel).await;
        }
        Command::Chat { room, text: None } => {
            for m in api::rest::recent_messages(&base, token, &room).await? {
                println!("[{}] {}: {}", m.timestamp, m.sender_name, m.text);
            }
        }
        Command::Chat {
            room,
            text: Some(text),
        } => {
            api::rest::post_message(&base, token, &room, &text).await?;
        }
        Command::ShareText { text, language } => {
            let content = match text {
                Some(t) => t,
                None => read_stdin()?,
            };
            let req = ShareReq {
                kind: ContentKind::Text,
                content,
                filename: None,
                mimetype: None,
                language,
            };
            let resp = api::rest::share(&base, token, &req).await?;
            println!("{}", resp.content_id);
        }
        Command::ShareFile { path } => {
            let req = file_share(&path)?;
            let resp = api::rest::share(&base, token, &req).await?;
            println!("{}", resp.content_id);
        }
        Command::Receive { id, out } => {
            let content = api::rest::receive(&base, token, &id).await?;
            match write_received(&content, out.as_deref())? {
                Some(p) => println!("Saved {} from {} to {}", id, content.sender_name, p.display()),
                None => println!("{}", content.content),
            }
        }
        Command::Reward { sender, content } => {
            if let Some(cid) = content.as_deref()
                && api::rest::reward_status(&base, token, cid).await?.rewarded
            {
                println!("You already rewarded {sender} for this");
                return Ok(());
            }
            let req = api::RewardReq {
                sender_name: sender.clone(),
                content_id: content,
            };
            let resp = api::rest::reward(&base, token, &req).await?;
            if resp.already_rewarded {
                println!("You already rewarded {sender} for this");
            } else {
                println!("Rewarded {sender}");
            }
        }
        Command::Points { name: None } => {
            let p = api::rest::my_points(&base, token).await?;
            println!("{}: {}", p.name, p.points);
        }
        Command::Points { name: Some(n) } => {
            let p = api::rest::points_of(&base, token, &n).await?;
            println!("{}: {}", p.name, p.points);
        }
        Command::LoginStudent { .. } | Command::LoginTeacher { .. } => {
            return Err(AppError::Input("login does not need an existing session".into()));
        }
    }
    Ok(())
}

fn read_stdin() -> Result<String, AppError> {
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Builds a file share: base64 payload, original file name and guessed MIME type.
pub fn file_share(path: &Path) -> Result<ShareReq, AppError> {
    let bytes = std::fs::read(path)?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| AppError::Input(format!("{} has no file name", path.display())))?;
    let mimetype = mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string();
    Ok(ShareReq {
        kind: ContentKind::File,
        content: STANDARD.encode(bytes),
        filename: Some(filename),
        mimetype: Some(mimetype),
        language: None,
    })
}

/// Writes received content to disk. Text without `out` is left to the caller to print.
pub fn write_received(content: &ContentDto, out: Option<&Path>) -> Result<Option<PathBuf>, AppError> {
    match content.kind {
        ContentKind::File => {
            let bytes = STANDARD
                .decode(content.content.as_bytes())
                .map_err(|e| AppError::Input(format!("payload is not base64: {e}")))?;
            let target = match out {
                Some(p) => p.to_path_buf(),
                None => {
                    let name = content.filename.as_deref().unwrap_or(&content.id);
                    // Never write outside the working directory
                    let name = Path::new(name)
                        .file_name()
                        .map(|n| n.to_os_string())
                        .unwrap_or_else(|| content.id.clone().into());
                    PathBuf::from(name)
                }
            };
            std::fs::write(&target, bytes)?;
            Ok(Some(target))
        }
        ContentKind::Text => match out {
            Some(p) => {
                std::fs::write(p, &content.content)?;
                Ok(Some(p.to_path_buf()))
            }
            None => Ok(None),
        },
    }
}
