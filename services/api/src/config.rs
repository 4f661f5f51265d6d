use essence_core::{AudioTranscription, PolicyKind};
use secrecy::SecretString;
use serde::de::DeserializeOwned;
use std::net::SocketAddr;
use std::time::Duration;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
pub struct Config {
    pub bind_address: SocketAddr,
    pub api_key: SecretString,
    pub llm_base_url: String,
    pub thinking_model: String,
    /// `None` turns background summarization off.
    pub memory_model: Option<String>,
    pub whisper_model: String,
    pub transcription_language: String,
    pub dialogue_policy: PolicyKind,
    pub audio_transcription: AudioTranscription,
    pub screenshot_voice_commands: bool,
    pub generation_timeout: Duration,
    pub transcription_timeout: Duration,
    pub log_level: Level,
}

impl Config {
    /// Loads configuration from environment variables, reading a `.env`
    /// file in the current directory first if there is one.
    ///
    /// *   `GROQ_API_KEY`: secret key for the OpenAI-compatible API. Required.
    /// *   `BIND_ADDRESS`: defaults to "0.0.0.0:8000".
    /// *   `LLM_BASE_URL`: defaults to Groq's OpenAI endpoint.
    /// *   `THINKING_MODEL`, `MEMORY_MODEL`, `WHISPER_MODEL`: model names.
    ///     An empty `MEMORY_MODEL` disables summarization.
    /// *   `TRANSCRIPTION_LANGUAGE`: language hint for speech-to-text. Defaults to "en".
    /// *   `DIALOGUE_POLICY`: "interview" (default) or "socratic".
    /// *   `AUDIO_TRANSCRIPTION`: "per_chunk" (default) or "on_commit".
    /// *   `SCREENSHOT_VOICE_COMMANDS`: "true" to let voice ask for screenshots.
    /// *   `GENERATION_TIMEOUT_SECS`, `TRANSCRIPTION_TIMEOUT_SECS`: defaults 60 and 30.
    /// *   `RUST_LOG`: the logging level. Defaults to "INFO".
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let bind_address_str = var("BIND_ADDRESS", "0.0.0.0:8000");
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let api_key = lookup("GROQ_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from)
            .ok_or_else(|| ConfigError::MissingVar("GROQ_API_KEY".to_string()))?;

        let memory_model = var("MEMORY_MODEL", "llama-3.1-8b-instant");
        let memory_model = (!memory_model.trim().is_empty()).then_some(memory_model);

        let dialogue_policy = parse_enum("DIALOGUE_POLICY", &var("DIALOGUE_POLICY", "interview"))?;
        let audio_transcription =
            parse_enum("AUDIO_TRANSCRIPTION", &var("AUDIO_TRANSCRIPTION", "per_chunk"))?;

        let screenshot_str = var("SCREENSHOT_VOICE_COMMANDS", "false");
        let screenshot_voice_commands = screenshot_str.parse::<bool>().map_err(|_| {
            ConfigError::InvalidValue(
                "SCREENSHOT_VOICE_COMMANDS".to_string(),
                format!("'{}' is not true or false", screenshot_str),
            )
        })?;

        let generation_timeout =
            parse_secs("GENERATION_TIMEOUT_SECS", &var("GENERATION_TIMEOUT_SECS", "60"))?;
        let transcription_timeout =
            parse_secs("TRANSCRIPTION_TIMEOUT_SECS", &var("TRANSCRIPTION_TIMEOUT_SECS", "30"))?;

        let log_level_str = var("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        Ok(Self {
            bind_address,
            api_key,
            llm_base_url: var("LLM_BASE_URL", essence_core::llm::DEFAULT_BASE_URL),
            thinking_model: var("THINKING_MODEL", "meta-llama/llama-4-scout-17b-16e-instruct"),
            memory_model,
            whisper_model: var("WHISPER_MODEL", "whisper-large-v3"),
            transcription_language: var("TRANSCRIPTION_LANGUAGE", "en"),
            dialogue_policy,
            audio_transcription,
            screenshot_voice_commands,
            generation_timeout,
            transcription_timeout,
            log_level,
        })
    }
}

fn parse_enum<T: DeserializeOwned>(key: &str, raw: &str) -> Result<T, ConfigError> {
    serde_json::from_value(serde_json::Value::String(raw.trim().to_lowercase()))
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), e.to_string()))
}

fn parse_secs(key: &str, raw: &str) -> Result<Duration, ConfigError> {
    match raw.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidValue(
            key.to_string(),
            format!("'{}' is not a positive number of seconds", raw),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_the_key_is_set() {
        let config = load(&[("GROQ_API_KEY", "gsk-test")]).unwrap();
        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8000");
        assert_eq!(config.api_key.expose_secret(), "gsk-test");
        assert_eq!(config.llm_base_url, "https://api.groq.com/openai/v1");
        assert_eq!(config.memory_model.as_deref(), Some("llama-3.1-8b-instant"));
        assert_eq!(config.dialogue_policy, PolicyKind::Interview);
        assert_eq!(config.audio_transcription, AudioTranscription::PerChunk);
        assert!(!config.screenshot_voice_commands);
        assert_eq!(config.generation_timeout, Duration::from_secs(60));
        assert_eq!(config.transcription_timeout, Duration::from_secs(30));
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let err = load(&[]).err().unwrap();
        assert!(matches!(err, ConfigError::MissingVar(var) if var == "GROQ_API_KEY"));

        let err = load(&[("GROQ_API_KEY", "  ")]).err().unwrap();
        assert!(matches!(err, ConfigError::MissingVar(_)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("GROQ_API_KEY", "gsk-test"),
            ("BIND_ADDRESS", "127.0.0.1:9000"),
            ("MEMORY_MODEL", ""),
            ("DIALOGUE_POLICY", "Socratic"),
            ("AUDIO_TRANSCRIPTION", "on_commit"),
            ("SCREENSHOT_VOICE_COMMANDS", "true"),
            ("GENERATION_TIMEOUT_SECS", "15"),
            ("RUST_LOG", "debug"),
        ])
        .unwrap();
        assert_eq!(config.bind_address.port(), 9000);
        assert!(config.memory_model.is_none());
        assert_eq!(config.dialogue_policy, PolicyKind::Socratic);
        assert_eq!(config.audio_transcription, AudioTranscription::OnCommit);
        assert!(config.screenshot_voice_commands);
        assert_eq!(config.generation_timeout, Duration::from_secs(15));
        assert_eq!(config.log_level, Level::DEBUG);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        for (key, value) in [
            ("BIND_ADDRESS", "not-an-address"),
            ("DIALOGUE_POLICY", "freestyle"),
            ("AUDIO_TRANSCRIPTION", "sometimes"),
            ("SCREENSHOT_VOICE_COMMANDS", "maybe"),
            ("TRANSCRIPTION_TIMEOUT_SECS", "0"),
            ("RUST_LOG", "loud"),
        ] {
            let err = load(&[("GROQ_API_KEY", "gsk-test"), (key, value)]).err().unwrap();
            assert!(
                matches!(&err, ConfigError::InvalidValue(var, _) if var == key),
                "{key}={value} gave {err}"
            );
        }
    }
}
