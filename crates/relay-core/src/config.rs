use std::{collections::HashSet, env, fs, path::Path, str::FromStr, time::Duration};

use secrecy::SecretString;

use crate::{errors::Error, Result};

const DEFAULT_API_URL: &str = "https://api.anthropic.com/v1/messages";
const DEFAULT_API_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-opus-20240229";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant for telegram.";

/// Typed configuration for the relay bot.
///
/// Loaded from the process environment (plus an optional `.env` file). Missing
/// required values and malformed numbers are fatal at startup. Tokens are
/// held as [`SecretString`] and never show up in `Debug` output.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: SecretString,
    pub allowed_users: HashSet<i64>,
    pub allowed_groups: HashSet<i64>,
    pub max_response_length: usize,
    pub handler_timeout: Duration,

    // Anthropic
    pub api_url: String,
    pub api_key: SecretString,
    pub api_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f32>,
    pub api_timeout: Duration,
    pub system_prompt: String,
    pub retry_max_attempts: u32,

    // Rate limiting
    pub max_messages_per_hour: u32,
    pub cooldown: Duration,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        let telegram_bot_token = get("TELEGRAM_BOT_TOKEN")
            .map(secret_value)
            .ok_or_else(|| {
                Error::Config("TELEGRAM_BOT_TOKEN environment variable is required".to_string())
            })?;
        let api_key = get("ANTHROPIC_API_KEY")
            .map(secret_value)
            .ok_or_else(|| {
                Error::Config("ANTHROPIC_API_KEY environment variable is required".to_string())
            })?;

        let allowed_users = parse_csv_i64("TELEGRAM_ALLOWED_USERS", get("TELEGRAM_ALLOWED_USERS"))?;
        let allowed_groups =
            parse_csv_i64("TELEGRAM_ALLOWED_GROUPS", get("TELEGRAM_ALLOWED_GROUPS"))?;

        let max_response_length = parse_or("MAX_RESPONSE_LENGTH", get("MAX_RESPONSE_LENGTH"), 4000)?;
        let handler_timeout = Duration::from_millis(parse_or(
            "HANDLER_TIMEOUT_MS",
            get("HANDLER_TIMEOUT_MS"),
            120_000,
        )?);

        let api_url = get("ANTHROPIC_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let api_version =
            get("ANTHROPIC_VERSION").unwrap_or_else(|| DEFAULT_API_VERSION.to_string());
        let model = get("CLAUDE_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let max_tokens = parse_or("CLAUDE_MAX_TOKENS", get("CLAUDE_MAX_TOKENS"), 4000)?;
        let temperature = parse_opt("CLAUDE_TEMPERATURE", get("CLAUDE_TEMPERATURE"))?;
        let api_timeout =
            Duration::from_millis(parse_or("API_TIMEOUT_MS", get("API_TIMEOUT_MS"), 60_000)?);
        let system_prompt =
            get("SYSTEM_PROMPT").unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        let retry_max_attempts = parse_or("RETRY_MAX_ATTEMPTS", get("RETRY_MAX_ATTEMPTS"), 3)?;

        let max_messages_per_hour = parse_or(
            "RATE_LIMIT_MAX_MESSAGES_PER_HOUR",
            get("RATE_LIMIT_MAX_MESSAGES_PER_HOUR"),
            50,
        )?;
        let cooldown = Duration::from_secs(parse_or(
            "RATE_LIMIT_COOLDOWN_SECONDS",
            get("RATE_LIMIT_COOLDOWN_SECONDS"),
            5,
        )?);

        if max_response_length == 0 {
            return Err(Error::Config(
                "MAX_RESPONSE_LENGTH must be greater than zero".to_string(),
            ));
        }
        if retry_max_attempts == 0 {
            return Err(Error::Config(
                "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            telegram_bot_token,
            allowed_users,
            allowed_groups,
            max_response_length,
            handler_timeout,
            api_url,
            api_key,
            api_version,
            model,
            max_tokens,
            temperature,
            api_timeout,
            system_prompt,
            retry_max_attempts,
            max_messages_per_hour,
            cooldown,
        })
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

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
        if env::var_os(key).is_some() {
            continue; // existing env wins
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        return &val[1..val.len() - 1];
    }
    val
}

fn parse_opt<T: FromStr>(key: &str, v: Option<String>) -> Result<Option<T>> {
    let Some(raw) = v else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw:?}")))
}

fn parse_or<T: FromStr>(key: &str, v: Option<String>, default: T) -> Result<T> {
    Ok(parse_opt(key, v)?.unwrap_or(default))
}

fn parse_csv_i64(key: &str, v: Option<String>) -> Result<HashSet<i64>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("{key} contains an invalid id: {s:?}")))
        })
        .collect()
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
