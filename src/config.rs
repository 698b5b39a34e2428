//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::diagnosis::messages::Messages;
use crate::diagnosis::scoring;
use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default minimum length of a free-text answer, in characters.
pub const DEFAULT_MIN_ANSWER_CHARS: usize = 100;

/// How a "friend added" event is handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowPolicy {
    /// Send the greeting only.
    Greet,
    /// Send the greeting and start a fresh diagnosis.
    GreetAndStart,
}

impl std::str::FromStr for FollowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "greet" => Ok(Self::Greet),
            "greet_and_start" => Ok(Self::GreetAndStart),
            other => Err(format!("expected greet or greet_and_start, got '{other}'")),
        }
    }
}

/// What happens once a diagnosis is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetakePolicy {
    /// Keep the finished session; the restart command starts over.
    Unlimited,
    /// Keep the finished session and refuse all further input.
    SinglePass,
    /// Drop the session so the next message starts over.
    DeleteOnDone,
}

impl std::str::FromStr for RetakePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "unlimited" => Ok(Self::Unlimited),
            "single_pass" => Ok(Self::SinglePass),
            "delete_on_done" => Ok(Self::DeleteOnDone),
            other => Err(format!(
                "expected unlimited, single_pass or delete_on_done, got '{other}'"
            )),
        }
    }
}

/// Behaviour of the diagnosis dialogue.
#[derive(Debug, Clone)]
pub struct DiagnosisConfig {
    /// Free-text answers shorter than this are sent back for elaboration.
    pub min_answer_chars: usize,
    /// In-band commands that discard the session and start over.
    pub restart_keywords: Vec<String>,
    pub follow_policy: FollowPolicy,
    pub retake_policy: RetakePolicy,
    pub messages: Messages,
}

impl Default for DiagnosisConfig {
    fn default() -> Self {
        Self {
            min_answer_chars: DEFAULT_MIN_ANSWER_CHARS,
            restart_keywords: vec!["restart".to_string(), "再診断".to_string()],
            follow_policy: FollowPolicy::Greet,
            retake_policy: RetakePolicy::Unlimited,
            messages: Messages::default(),
        }
    }
}

/// LINE Messaging API credentials.
#[derive(Debug, Clone)]
pub struct LineConfig {
    pub channel_secret: SecretString,
    pub channel_access_token: SecretString,
    pub api_base: String,
}

/// Everything the binary needs, read from the environment.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub port: u16,
    pub line: LineConfig,
    pub llm: LlmConfig,
    pub classifier_timeout: Duration,
    pub catalog_path: Option<PathBuf>,
    pub diagnosis: DiagnosisConfig,
}

impl BotConfig {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a key to its value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| var(key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()));

        let port: u16 = var("PORT")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_PORT);

        let line = LineConfig {
            channel_secret: SecretString::from(required("LINE_CHANNEL_SECRET")?),
            channel_access_token: SecretString::from(required("LINE_CHANNEL_ACCESS_TOKEN")?),
            api_base: var("LINE_API_BASE")
                .unwrap_or_else(|| "https://api.line.me".to_string())
                .trim_end_matches('/')
                .to_string(),
        };

        let backend: LlmBackend = parse_or(&var, "DIAGNOSIS_LLM_BACKEND", LlmBackend::OpenAi)?;
        let (key_var, default_model) = match backend {
            LlmBackend::OpenAi => ("OPENAI_API_KEY", "gpt-3.5-turbo"),
            LlmBackend::Anthropic => ("ANTHROPIC_API_KEY", "claude-3-5-haiku-latest"),
        };
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(required(key_var)?),
            model: var("DIAGNOSIS_MODEL").unwrap_or_else(|| default_model.to_string()),
            base_url: var("OPENAI_BASE_URL"),
        };

        let timeout_secs: u64 = parse_or(
            &var,
            "DIAGNOSIS_CLASSIFIER_TIMEOUT_SECS",
            scoring::DEFAULT_TIMEOUT.as_secs(),
        )?;

        let defaults = DiagnosisConfig::default();
        let restart_keywords: Vec<String> = match var("DIAGNOSIS_RESTART_KEYWORDS") {
            Some(list) => list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            None => defaults.restart_keywords,
        };
        if restart_keywords.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "DIAGNOSIS_RESTART_KEYWORDS".to_string(),
                message: "at least one keyword is required".to_string(),
            });
        }

        let diagnosis = DiagnosisConfig {
            min_answer_chars: parse_or(
                &var,
                "DIAGNOSIS_MIN_ANSWER_CHARS",
                DEFAULT_MIN_ANSWER_CHARS,
            )?,
            restart_keywords,
            follow_policy: parse_or(&var, "DIAGNOSIS_FOLLOW_POLICY", FollowPolicy::Greet)?,
            retake_policy: parse_or(&var, "DIAGNOSIS_RETAKE_POLICY", RetakePolicy::Unlimited)?,
            messages: defaults.messages,
        };

        Ok(Self {
            port,
            line,
            llm,
            classifier_timeout: Duration::from_secs(timeout_secs),
            catalog_path: var("DIAGNOSIS_CATALOG_PATH").map(PathBuf::from),
            diagnosis,
        })
    }
}

/// Parse `key` if set, otherwise return `default`.
fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 3] = [
        ("LINE_CHANNEL_SECRET", "secret"),
        ("LINE_CHANNEL_ACCESS_TOKEN", "token"),
        ("OPENAI_API_KEY", "sk-test"),
    ];

    #[test]
    fn defaults_with_required_values() {
        let config = BotConfig::from_lookup(env(&REQUIRED)).unwrap();
        assert_eq!(config.port, 3000);
        assert_eq!(config.line.api_base, "https://api.line.me");
        assert_eq!(config.line.channel_secret.expose_secret(), "secret");
        assert_eq!(config.llm.backend, LlmBackend::OpenAi);
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
        assert_eq!(config.classifier_timeout, Duration::from_secs(20));
        assert_eq!(config.diagnosis.min_answer_chars, 100);
        assert_eq!(config.diagnosis.follow_policy, FollowPolicy::Greet);
        assert_eq!(config.diagnosis.retake_policy, RetakePolicy::Unlimited);
        assert!(config.catalog_path.is_none());
    }

    #[test]
    fn missing_secret_is_reported_by_name() {
        let err = BotConfig::from_lookup(env(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "LINE_CHANNEL_SECRET"));
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("PORT", "8088"),
            ("LINE_API_BASE", "http://127.0.0.1:9000/"),
            ("DIAGNOSIS_MIN_ANSWER_CHARS", "40"),
            ("DIAGNOSIS_RESTART_KEYWORDS", "again, retry ,"),
            ("DIAGNOSIS_FOLLOW_POLICY", "greet_and_start"),
            ("DIAGNOSIS_RETAKE_POLICY", "single_pass"),
            ("DIAGNOSIS_CLASSIFIER_TIMEOUT_SECS", "5"),
            ("DIAGNOSIS_CATALOG_PATH", "/etc/diagnosis/catalog.json"),
        ]);
        let config = BotConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.port, 8088);
        assert_eq!(config.line.api_base, "http://127.0.0.1:9000");
        assert_eq!(config.diagnosis.min_answer_chars, 40);
        assert_eq!(config.diagnosis.restart_keywords, vec!["again", "retry"]);
        assert_eq!(config.diagnosis.follow_policy, FollowPolicy::GreetAndStart);
        assert_eq!(config.diagnosis.retake_policy, RetakePolicy::SinglePass);
        assert_eq!(config.classifier_timeout, Duration::from_secs(5));
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/diagnosis/catalog.json"))
        );
    }

    #[test]
    fn anthropic_backend_needs_its_own_key() {
        let pairs = [
            ("LINE_CHANNEL_SECRET", "secret"),
            ("LINE_CHANNEL_ACCESS_TOKEN", "token"),
            ("DIAGNOSIS_LLM_BACKEND", "anthropic"),
        ];
        let err = BotConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref k) if k == "ANTHROPIC_API_KEY"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DIAGNOSIS_RETAKE_POLICY", "forever"));
        let err = BotConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "DIAGNOSIS_RETAKE_POLICY"
        ));

        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DIAGNOSIS_MIN_ANSWER_CHARS", "lots"));
        assert!(BotConfig::from_lookup(env(&pairs)).is_err());
    }

    #[test]
    fn empty_restart_keyword_list_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("DIAGNOSIS_RESTART_KEYWORDS", " , ,"));
        let err = BotConfig::from_lookup(env(&pairs)).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "DIAGNOSIS_RESTART_KEYWORDS"
        ));
    }
}
