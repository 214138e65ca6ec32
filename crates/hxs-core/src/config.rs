use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    archive::{ArchiveSettings, ExtractLimits},
    classify::Suffixes,
    errors::Error,
    reaper::ReaperConfig,
    Result,
};

const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024; // 50MB

/// Typed configuration, read from the environment (and an optional `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Empty means the bot is open to everyone.
    pub telegram_allowed_users: Vec<i64>,

    pub engine: EngineConfig,

    // Ledger
    pub starting_credits: u64,

    // Audit
    pub audit_log_path: PathBuf,
    pub audit_log_json: bool,
}

/// The part of [`Config`] the transformation engine needs.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub max_file_size: u64,
    pub payload_suffix: String,
    pub rule_list_suffix: String,
    pub temp_dir: PathBuf,
    pub idle_timeout: Duration,
    pub reaper_interval: Duration,
    pub transform_cost: u64,
    pub extract_limits: ExtractLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            payload_suffix: ".dat".to_string(),
            rule_list_suffix: ".txt".to_string(),
            temp_dir: PathBuf::from("/tmp/hexswap-bot"),
            idle_timeout: Duration::from_secs(10 * 60),
            reaper_interval: Duration::from_secs(60),
            transform_cost: 0,
            extract_limits: ExtractLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn suffixes(&self) -> Suffixes {
        Suffixes {
            payload: self.payload_suffix.clone(),
            rule_list: self.rule_list_suffix.clone(),
        }
    }

    pub fn archive_settings(&self) -> ArchiveSettings {
        ArchiveSettings {
            max_input_bytes: self.max_file_size,
            payload_suffix: self.payload_suffix.clone(),
            scratch_parent: self.temp_dir.clone(),
            limits: self.extract_limits,
        }
    }

    pub fn reaper(&self) -> ReaperConfig {
        ReaperConfig {
            idle_timeout: self.idle_timeout,
            interval: self.reaper_interval,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));

        let telegram_bot_token = env_str("TELEGRAM_BOT_TOKEN").unwrap_or_default();
        if telegram_bot_token.trim().is_empty() {
            return Err(Error::Config(
                "TELEGRAM_BOT_TOKEN environment variable is required".to_string(),
            ));
        }
        let telegram_allowed_users = parse_csv_i64(env_str("TELEGRAM_ALLOWED_USERS"));

        let defaults = EngineConfig::default();
        let payload_suffix = env_str("PAYLOAD_SUFFIX")
            .and_then(non_empty)
            .unwrap_or(defaults.payload_suffix);
        let rule_list_suffix = env_str("RULE_LIST_SUFFIX")
            .and_then(non_empty)
            .unwrap_or(defaults.rule_list_suffix);
        if payload_suffix == rule_list_suffix {
            return Err(Error::Config(
                "PAYLOAD_SUFFIX and RULE_LIST_SUFFIX must differ".to_string(),
            ));
        }

        let temp_dir = env_path("TEMP_DIR").unwrap_or(defaults.temp_dir);
        fs::create_dir_all(&temp_dir)?;

        let idle_timeout = env_u64("SESSION_IDLE_TIMEOUT")
            .map(Duration::from_secs)
            .unwrap_or(defaults.idle_timeout);
        let reaper_interval = env_u64("REAPER_INTERVAL")
            .map(Duration::from_secs)
            .unwrap_or(defaults.reaper_interval);
        if reaper_interval.is_zero() {
            return Err(Error::Config("REAPER_INTERVAL must be positive".to_string()));
        }

        let extract_limits = ExtractLimits {
            max_files: env_usize("ARCHIVE_MAX_FILES").unwrap_or(defaults.extract_limits.max_files),
            max_total_bytes: env_u64("ARCHIVE_MAX_TOTAL_BYTES")
                .unwrap_or(defaults.extract_limits.max_total_bytes),
        };

        let engine = EngineConfig {
            max_file_size: env_u64("MAX_FILE_SIZE").unwrap_or(defaults.max_file_size),
            payload_suffix,
            rule_list_suffix,
            temp_dir,
            idle_timeout,
            reaper_interval,
            transform_cost: env_u64("TRANSFORM_COST").unwrap_or(defaults.transform_cost),
            extract_limits,
        };

        let starting_credits = env_u64("STARTING_CREDITS").unwrap_or(0);

        let audit_log_path = PathBuf::from(
            env_str("AUDIT_LOG_PATH").unwrap_or("/tmp/hexswap-audit.log".to_string()),
        );
        let audit_log_json = env_bool("AUDIT_LOG_JSON").unwrap_or(false);

        Ok(Self {
            telegram_bot_token,
            telegram_allowed_users,
            engine,
            starting_credits,
            audit_log_path,
            audit_log_json,
        })
    }

    pub fn is_authorized(&self, user_id: i64) -> bool {
        self.telegram_allowed_users.is_empty() || self.telegram_allowed_users.contains(&user_id)
    }
}

fn env_str(key: &str) -> Option<String> {
    env::var(key).ok()
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_some() {
            continue; // do not override existing env
        }
        env::set_var(key, val);
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    let mut out = Vec::new();
    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }

        let mut val = v.trim().to_string();
        // Strip optional surrounding quotes.
        if val.len() >= 2
            && ((val.starts_with('"') && val.ends_with('"'))
                || (val.starts_with('\'') && val.ends_with('\'')))
        {
            val = val[1..val.len() - 1].to_string();
        }

        out.push((key.to_string(), val));
    }
    out
}

fn env_bool(key: &str) -> Option<bool> {
    env_str(key).map(|s| {
        matches!(
            s.trim().to_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        )
    })
}

fn env_u64(key: &str) -> Option<u64> {
    env_str(key).and_then(|s| s.trim().parse::<u64>().ok())
}

fn env_usize(key: &str) -> Option<usize> {
    env_str(key).and_then(|s| s.trim().parse::<usize>().ok())
}

fn env_path(key: &str) -> Option<PathBuf> {
    env::var_os(key).map(PathBuf::from)
}

fn parse_csv_i64(v: Option<String>) -> Vec<i64> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse::<i64>().ok())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotenv_strips_quotes_and_comments() {
        let parsed = parse_dotenv(
            "# comment\nTELEGRAM_BOT_TOKEN=\"abc:def\"\n\nPAYLOAD_SUFFIX='.sav'\nnoequals\n=novalue\n",
        );
        assert_eq!(
            parsed,
            vec![
                ("TELEGRAM_BOT_TOKEN".to_string(), "abc:def".to_string()),
                ("PAYLOAD_SUFFIX".to_string(), ".sav".to_string()),
            ]
        );
    }

    #[test]
    fn csv_ids_skip_garbage() {
        assert_eq!(
            parse_csv_i64(Some(" 1, x,3 ,,-4".to_string())),
            vec![1, 3, -4]
        );
        assert!(parse_csv_i64(None).is_empty());
    }

    #[test]
    fn engine_defaults_match_reference_deployment() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_file_size, 50 * 1024 * 1024);
        assert_eq!(cfg.idle_timeout, Duration::from_secs(600));
        assert_eq!(cfg.reaper().interval, Duration::from_secs(60));
        assert_eq!(cfg.archive_settings().payload_suffix, ".dat");
        // Billing is opt-in: a fresh deployment with no credits can transform.
        assert_eq!(cfg.transform_cost, 0);
    }

    #[test]
    fn empty_allowlist_is_open() {
        let mut cfg = Config {
            telegram_bot_token: "t".to_string(),
            telegram_allowed_users: vec![],
            engine: EngineConfig::default(),
            starting_credits: 0,
            audit_log_path: PathBuf::from("/dev/null"),
            audit_log_json: false,
        };
        assert!(cfg.is_authorized(123));

        cfg.telegram_allowed_users = vec![7];
        assert!(cfg.is_authorized(7));
        assert!(!cfg.is_authorized(123));
    }
}
