use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tinytemplate::TinyTemplate;

use crate::cli::InstallArgs;

const EXAMPLE_CONFIG: &str = include_str!("../config.yaml.example");
const UNIT_TEMPLATE: &str = include_str!("../systemd/collab-server.service");
const SECRET_PLACEHOLDER: &str = "change-this-to-a-long-random-secret";

#[derive(Debug, thiserror::Error)]
pub enum InstallError {
    #[error("{action} {path}: {source}")]
    Io {
        action: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("template: {0}")]
    Template(#[from] tinytemplate::error::Error),
}

fn io_err(action: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> InstallError {
    let path = path.to_path_buf();
    move |source| InstallError::Io {
        action,
        path,
        source,
    }
}

fn generate_secret() -> String {
    format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
}

fn render_default_config(with_api_key: bool) -> String {
    let mut cfg = EXAMPLE_CONFIG.replace(SECRET_PLACEHOLDER, &generate_secret());
    if with_api_key {
        cfg = cfg.replace(
            "# cron_api_key: change-me",
            &format!("cron_api_key: {}", uuid::Uuid::new_v4().simple()),
        );
    }
    cfg
}

#[derive(serde::Serialize)]
struct UnitCtx<'a> {
    binary_path: &'a str,
    config_path: &'a str,
    db_path: &'a str,
    user: &'a str,
    group: &'a str,
    working_dir: &'a str,
}

fn render_unit(ctx: &UnitCtx) -> Result<String, InstallError> {
    let mut tt = TinyTemplate::new();
    tt.add_template("unit", UNIT_TEMPLATE)?;
    Ok(tt.render("unit", ctx)?)
}

fn write_file(path: &Path, contents: &str) -> Result<(), InstallError> {
    let mut f = fs::File::create(path).map_err(io_err("write", path))?;
    f.write_all(contents.as_bytes()).map_err(io_err("write", path))
}

pub fn install_system(args: &InstallArgs, binary_path: &Path) -> Result<(), InstallError> {
    for dir in [
        args.config_path.parent(),
        args.unit_path.parent(),
        args.db_path.parent(),
    ]
    .into_iter()
    .flatten()
    {
        fs::create_dir_all(dir).map_err(io_err("create dir", dir))?;
    }

    if args.config_path.exists() && !args.force {
        eprintln!(
            "Config exists at {}; skipping (use --force to overwrite)",
            args.config_path.display()
        );
    } else {
        write_file(&args.config_path, &render_default_config(args.with_api_key))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&args.config_path, fs::Permissions::from_mode(0o640));
        }
        println!("Wrote config to {}", args.config_path.display());
    }

    if args.unit_path.exists() && !args.force {
        eprintln!(
            "Unit exists at {}; skipping (use --force to overwrite)",
            args.unit_path.display()
        );
    } else {
        let ctx = UnitCtx {
            binary_path: &binary_path.display().to_string(),
            config_path: &args.config_path.display().to_string(),
            db_path: &args.db_path.display().to_string(),
            user: &args.user,
            group: &args.group,
            working_dir: &args.working_dir.display().to_string(),
        };
        write_file(&args.unit_path, &render_unit(&ctx)?)?;
        println!("Wrote unit to {}", args.unit_path.display());
    }

    println!("Done. Run: sudo systemctl daemon-reload && sudo systemctl enable --now collab-server");
    Ok(())
}

pub fn uninstall_system(
    unit_path: &Path,
    remove_config: bool,
    config_path: &Path,
) -> Result<(), InstallError> {
    if unit_path.exists() {
        fs::remove_file(unit_path).map_err(io_err("remove", unit_path))?;
        println!("Removed unit {}", unit_path.display());
    } else {
        println!("Unit {} not found; skipping", unit_path.display());
    }
    if remove_config {
        if config_path.exists() {
            fs::remove_file(config_path).map_err(io_err("remove", config_path))?;
            println!("Removed config {}", config_path.display());
        } else {
            println!("Config {} not found; skipping", config_path.display());
        }
    }
    println!("Run: sudo systemctl daemon-reload && sudo systemctl disable --now collab-server");
    Ok(())
}
