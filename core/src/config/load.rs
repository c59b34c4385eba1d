use std::path::{Path, PathBuf};

use super::types::{
    AppConfig, ImageStoreBackend, RemoteStoreBackend, MAX_TASK_TIME_TO_LIVE_HOURS,
};

/// Get the default imgtask data directory: ~/.imgtask
pub fn get_imgtask_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".imgtask"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.imgtask/config.toml (highest)
    let data_dir = get_imgtask_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./config.toml (current directory)
    let local_config = Path::new("config.toml");

    let cfg: AppConfig = if user_config.exists() {
        load_from_path(&user_config)?
    } else if local_config.exists() {
        load_from_path(local_config)?
    } else {
        AppConfig::default()
    };

    finish(cfg, data_dir)
}

/// Loads an explicitly named file, then applies the same environment
/// overrides and default paths as [`load_default`].
pub fn load_explicit(path: &Path) -> anyhow::Result<AppConfig> {
    let cfg = load_from_path(path)?;
    finish(cfg, get_imgtask_data_dir()?)
}

fn finish(mut cfg: AppConfig, data_dir: PathBuf) -> anyhow::Result<AppConfig> {
    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |k| std::env::var(k).ok())?;

    let data_root = match std::env::var("IMGTASK_DATA_DIR") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v),
        _ => data_dir,
    };
    fill_default_paths(&mut cfg, &data_root)?;

    validate(&cfg)?;
    Ok(cfg)
}

/// Rejects values that parse but cannot be used.
pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    let ttl = cfg.tasks.task_time_to_live_hours;
    if ttl > MAX_TASK_TIME_TO_LIVE_HOURS {
        anyhow::bail!(
            "tasks.task_time_to_live_hours must be at most {MAX_TASK_TIME_TO_LIVE_HOURS}, got {ttl}"
        );
    }
    Ok(())
}

pub fn load_from_path(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    let cfg = toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))?;
    Ok(cfg)
}

/// Overrides taken from the environment. `lookup` is injected so tests do not
/// have to mutate the process environment.
pub fn apply_env_overrides(
    cfg: &mut AppConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = non_empty("IMGTASK_VALID_TASKS_TYPE") {
        cfg.tasks.valid_tasks_type = v
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if let Some(v) = non_empty("IMGTASK_EXECUTOR_POOL_SIZE") {
        let size: usize = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("IMGTASK_EXECUTOR_POOL_SIZE must be a number: {v}"))?;
        if size == 0 {
            anyhow::bail!("IMGTASK_EXECUTOR_POOL_SIZE must be greater than zero");
        }
        cfg.executor.pool_size = size;
    }
    if let Some(v) = non_empty("IMGTASK_LOG_LEVEL") {
        cfg.logging.level = v;
    }
    Ok(())
}

/// Points unset store and log directories at sub-directories of `root`,
/// creating them.
pub fn fill_default_paths(cfg: &mut AppConfig, root: &Path) -> anyhow::Result<()> {
    if let ImageStoreBackend::Filesystem(fs) = &mut cfg.image_store.backend {
        if fs.data_dir.trim().is_empty() {
            let dir = root.join("images");
            std::fs::create_dir_all(&dir)?;
            fs.data_dir = dir.to_string_lossy().to_string();
        }
    }

    if let RemoteStoreBackend::Filesystem(fs) = &mut cfg.remote_store.backend {
        if fs.data_dir.trim().is_empty() {
            let dir = root.join("remote");
            std::fs::create_dir_all(&dir)?;
            fs.data_dir = dir.to_string_lossy().to_string();
        }
    }

    if cfg
        .logging
        .directory
        .as_deref()
        .is_none_or(|s| s.trim().is_empty())
    {
        let logs_dir = root.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    Ok(())
}
