use std::{fs, path::Path, time::Duration};

use persistence::AutosaveConfig;
use serde::Deserialize;
use tracing::warn;

pub const CONFIG_FILE: &str = "coach.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: String,
    pub autosave: AutosaveConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            database_url: "sqlite://./data/coach.db".into(),
            autosave: AutosaveConfig::default(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    database_url: Option<String>,
    autosave_immediate_ms: Option<u64>,
    autosave_short_ms: Option<u64>,
    autosave_long_ms: Option<u64>,
}

pub fn load_settings() -> Settings {
    load_settings_from(Path::new(CONFIG_FILE), |key| std::env::var(key).ok())
}

fn load_settings_from(path: &Path, env: impl Fn(&str) -> Option<String>) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileConfig>(&raw) {
            Ok(file_cfg) => apply_file_config(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), "ignoring unreadable config: {err}"),
        }
    }

    if let Some(v) = env("DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = env("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(ms) = env_millis(&env, "APP__AUTOSAVE_IMMEDIATE_MS") {
        settings.autosave.immediate = ms;
    }
    if let Some(ms) = env_millis(&env, "APP__AUTOSAVE_SHORT_MS") {
        settings.autosave.short = ms;
    }
    if let Some(ms) = env_millis(&env, "APP__AUTOSAVE_LONG_MS") {
        settings.autosave.long = ms;
    }

    settings
}

fn apply_file_config(settings: &mut Settings, file_cfg: FileConfig) {
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(ms) = file_cfg.autosave_immediate_ms {
        settings.autosave.immediate = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.autosave_short_ms {
        settings.autosave.short = Duration::from_millis(ms);
    }
    if let Some(ms) = file_cfg.autosave_long_ms {
        settings.autosave.long = Duration::from_millis(ms);
    }
}

fn env_millis(env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<Duration> {
    let raw = env(key)?;
    match raw.trim().parse::<u64>() {
        Ok(ms) => Some(Duration::from_millis(ms)),
        Err(_) => {
            warn!(key, value = %raw, "ignoring non-numeric autosave delay");
            None
        }
    }
}

/// Normalises a database url or bare path into a sqlite url. Parent
/// directories are created by `Storage::new`.
pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        env,
        time::{SystemTime, UNIX_EPOCH},
    };

    use super::*;

    fn temp_config(contents: &str) -> std::path::PathBuf {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock")
            .as_nanos();
        let dir = env::temp_dir().join(format!("coach_tools_config_{suffix}"));
        fs::create_dir_all(&dir).expect("temp dir");
        let path = dir.join(CONFIG_FILE);
        fs::write(&path, contents).expect("write config");
        path
    }

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/test.db"),
            "sqlite://./data/test.db"
        );
        assert_eq!(normalize_database_url("sqlite:games.db"), "sqlite://games.db");
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    }

    #[test]
    fn missing_file_and_env_yield_defaults() {
        let settings = load_settings_from(Path::new("/nonexistent/coach.toml"), |_| None);
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn env_overrides_file_values() {
        let path = temp_config(
            "database_url = \"sqlite://file.db\"\nautosave_short_ms = 750\nautosave_long_ms = 3000\n",
        );
        let env_vars = HashMap::from([
            ("APP__DATABASE_URL", "sqlite://env.db"),
            ("APP__AUTOSAVE_LONG_MS", "5000"),
            ("APP__AUTOSAVE_IMMEDIATE_MS", "soon"),
        ]);

        let settings = load_settings_from(&path, |key| env_vars.get(key).map(|v| v.to_string()));

        assert_eq!(settings.database_url, "sqlite://env.db");
        assert_eq!(settings.autosave.short, Duration::from_millis(750));
        assert_eq!(settings.autosave.long, Duration::from_millis(5000));
        assert_eq!(settings.autosave.immediate, Duration::ZERO);
        fs::remove_dir_all(path.parent().expect("dir")).expect("cleanup");
    }
}
