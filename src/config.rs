use crate::error::{Error, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::sync::OnceLock;

/// Where progress records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(format!("unknown storage backend '{other}'")),
        }
    }
}

/// Whether a later `completed = false` may undo an earlier completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompletionPolicy {
    /// Completion only ever goes from false to true; `completed_at` keeps its first value.
    #[default]
    Monotonic,
    /// The incoming flag always replaces the stored one.
    Overwrite,
}

impl FromStr for CompletionPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "monotonic" => Ok(Self::Monotonic),
            "overwrite" => Ok(Self::Overwrite),
            other => Err(format!("unknown completion policy '{other}'")),
        }
    }
}

/// How a formation is judged complete from its lesson records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FormationCompletionRule {
    /// Every lesson of the formation has a completed record.
    #[default]
    AllLessons,
    /// The designated completion lesson (or the last lesson) is completed.
    FinalLesson,
}

impl FromStr for FormationCompletionRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_lessons" => Ok(Self::AllLessons),
            "final_lesson" => Ok(Self::FinalLesson),
            other => Err(format!("unknown formation completion rule '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown log format '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub storage_backend: StorageBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    pub api_rps: u32,
    pub completion_policy: CompletionPolicy,
    pub completion_rule: FormationCompletionRule,
    pub log_format: LogFormat,
}

pub static CONFIG: OnceLock<Config> = OnceLock::new();

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let storage_backend = get_env_parse_or("STORAGE_BACKEND", StorageBackend::Postgres)?;
        let database_url = env::var("DATABASE_URL").ok();
        if storage_backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(Error::Config(
                "Missing environment variable: DATABASE_URL".to_string(),
            ));
        }

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            storage_backend,
            database_url,
            jwt_secret: get_env("JWT_SECRET")?,
            api_rps: get_env_parse_or("API_RPS", 50)?,
            completion_policy: get_env_parse_or("COMPLETION_POLICY", CompletionPolicy::default())?,
            completion_rule: get_env_parse_or(
                "FORMATION_COMPLETION_RULE",
                FormationCompletionRule::default(),
            )?,
            log_format: get_env_parse_or("LOG_FORMAT", LogFormat::default())?,
        })
    }
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

pub fn init_config() -> Result<()> {
    let config = Config::from_env()?;
    CONFIG
        .set(config)
        .map_err(|_| Error::Config("Configuration has already been initialized".to_string()))?;
    Ok(())
}

pub fn get_config() -> &'static Config {
    CONFIG
        .get()
        .expect("Configuration has not been initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn policies_parse_case_insensitively() {
        assert_eq!("Monotonic".parse::<CompletionPolicy>(), Ok(CompletionPolicy::Monotonic));
        assert_eq!("overwrite".parse::<CompletionPolicy>(), Ok(CompletionPolicy::Overwrite));
        assert_eq!(
            "FINAL_LESSON".parse::<FormationCompletionRule>(),
            Ok(FormationCompletionRule::FinalLesson)
        );
        assert!("sometimes".parse::<CompletionPolicy>().is_err());
        assert_eq!("memory".parse::<StorageBackend>(), Ok(StorageBackend::Memory));
    }
}
