use std::io::{self, Write};
use std::path::PathBuf;

use crate::AppError;
use crate::config::{ClientConfig, load_config, normalize_server_url, save_config};
use collab_shared::api::{self, AuthResp};

pub enum LoginAs {
    Student {
        name: Option<String>,
        code: Option<String>,
    },
    Teacher {
        name: Option<String>,
        email: Option<String>,
        external_id: Option<String>,
    },
}

pub async fn login(
    server_arg: Option<String>,
    who: LoginAs,
    cfg_path: PathBuf,
) -> Result<(), AppError> {
    // Server url: CLI arg > existing config > prompt
    let existing = load_config(&cfg_path).ok();
    let server_url = match (server_arg, existing.as_ref()) {
        (Some(s), _) => normalize_server_url(&s),
        (None, Some(cfg)) => cfg.base_url(),
        (None, None) => normalize_server_url(&prompt("Server URL (e.g., 127.0.0.1:5151): ")?),
    };

    let resp: AuthResp = match who {
        LoginAs::Student { name, code } => {
            let name = or_prompt(name, "Your name: ")?;
            let code = or_prompt(code, "Class access code: ")?;
            api::rest::login_student(&server_url, &api::StudentAuthReq { code, name }).await
        }
        LoginAs::Teacher {
            name,
            email,
            external_id,
        } => {
            let display_name = or_prompt(name, "Display name: ")?;
            api::rest::login_teacher(
                &server_url,
                &api::TeacherAuthReq {
                    display_name,
                    email,
                    external_id,
                },
            )
            .await
        }
    }
    .map_err(|e| AppError::Http(format!("login failed: {e}")))?;

    let cfg = ClientConfig {
        server_url: server_url.clone(),
        token: Some(resp.token),
        name: Some(resp.user.name.clone()),
        role: Some(resp.user.role),
    };
    save_config(&cfg_path, &cfg)?;
    println!(
        "Logged in to {} as {} ({}); config written to {}",
        server_url,
        resp.user.name,
        resp.user.role,
        cfg_path.display()
    );
    Ok(())
}

fn or_prompt(value: Option<String>, msg: &str) -> Result<String, AppError> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => prompt(msg),
    }
}

fn prompt(msg: &str) -> Result<String, AppError> {
    print!("{}", msg);
    io::stdout().flush().ok();
    let mut buf = String::new();
    io::stdin().read_line(&mut buf).map_err(AppError::Io)?;
    Ok(buf.trim().to_string())
}
