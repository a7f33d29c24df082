//! Application Configuration Module
//!
//! This module centralizes the configuration for the interview service.
//! It loads settings from environment variables and provides a single,
//! shareable struct that can be passed throughout the application.

use interview_core::session::DEFAULT_MAX_QUESTIONS;
use std::env;
use tracing::Level;

// --- Application Constants ---

/// Where the question backend lives when `API_BASE_URL` is not set.
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000/api";

/// Holds all configuration loaded from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub api_base_url: String,
    pub max_questions: usize,
    pub auto_speak: bool,
    pub log_level: Level,
}

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidVar { name: String, value: String },
    #[error("Invalid log level provided for RUST_LOG: {0}")]
    InvalidLogLevel(String),
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    // *   `API_BASE_URL`: (Optional) Base URL of the question backend. Defaults to "http://localhost:5000/api".
    // *   `MAX_QUESTIONS`: (Optional) Upper bound on questions per interview. Defaults to 10.
    // *   `AUTO_SPEAK`: (Optional) Read each question aloud when it is shown. Defaults to false.
    // *   `RUST_LOG`: (Optional) The logging level. Defaults to "INFO". Can be "TRACE", "DEBUG", "INFO", "WARN", or "ERROR".
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file. This is useful for local development and is ignored if not present.
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_base_url = lookup("API_BASE_URL")
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let max_questions = match lookup("MAX_QUESTIONS") {
            Some(value) => match value.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidVar {
                        name: "MAX_QUESTIONS".to_string(),
                        value,
                    });
                }
            },
            None => DEFAULT_MAX_QUESTIONS,
        };

        let auto_speak = match lookup("AUTO_SPEAK") {
            Some(value) => parse_flag(&value).ok_or_else(|| ConfigError::InvalidVar {
                name: "AUTO_SPEAK".to_string(),
                value,
            })?,
            None => false,
        };

        // Configure logging level from RUST_LOG, with a sensible default.
        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str
            .parse::<Level>()
            .map_err(|_| ConfigError::InvalidLogLevel(log_level_str))?;

        Ok(Self {
            api_base_url,
            max_questions,
            auto_speak,
            log_level,
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
