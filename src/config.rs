use anyhow::Context;
use std::env;
use std::str::FromStr;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://vocab.db?mode=rwc";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
pub const DEFAULT_QUIZ_SIZE: usize = 10;
pub const DEFAULT_MAX_SUBMIT_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: String,
    pub quiz: QuizConfig,
}

/// Knobs consumed by the scheduler and the quiz orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuizConfig {
    pub quiz_size: usize,
    pub max_submit_attempts: u32,
    pub reject_duplicate_answers: bool,
}

impl Default for QuizConfig {
    fn default() -> Self {
        Self {
            quiz_size: DEFAULT_QUIZ_SIZE,
            max_submit_attempts: DEFAULT_MAX_SUBMIT_ATTEMPTS,
            reject_duplicate_answers: false,
        }
    }
}

impl Config {
    /// Reads configuration from the environment. Call `dotenvy::dotenv()`
    /// first to pick up a `.env` file.
    pub fn from_env() -> anyhow::Result<Self> {
        let quiz = QuizConfig {
            quiz_size: parse_var("QUIZ_SIZE", DEFAULT_QUIZ_SIZE)?,
            max_submit_attempts: parse_var("MAX_SUBMIT_ATTEMPTS", DEFAULT_MAX_SUBMIT_ATTEMPTS)?,
            reject_duplicate_answers: parse_var("REJECT_DUPLICATE_ANSWERS", false)?,
        };

        if quiz.quiz_size == 0 {
            anyhow::bail!("QUIZ_SIZE must be at least 1");
        }
        if quiz.max_submit_attempts == 0 {
            anyhow::bail!("MAX_SUBMIT_ATTEMPTS must be at least 1");
        }

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string()),
            quiz,
        })
    }
}

fn parse_var<T>(name: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
