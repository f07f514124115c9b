//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::grid::DEFAULT_CATEGORIES;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Allowed client origins for CORS (comma-separated); permissive when unset
    pub client_origin: Option<String>,
    /// External question service; the built-in answer key is used when unset
    pub question_service_url: Option<String>,
    /// Timeout for the question service request
    pub question_service_timeout: Duration,
    /// Gameplay tuning
    pub game: GameConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = if let Ok(port) = env::var("PORT") {
            format!("0.0.0.0:{}", port)
        } else {
            env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        };

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),

            client_origin: env::var("CLIENT_ORIGIN").ok().filter(|s| !s.trim().is_empty()),

            question_service_url: env::var("QUESTION_SERVICE_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            question_service_timeout: Duration::from_secs(parse_or(
                "QUESTION_SERVICE_TIMEOUT_SECS",
                20,
            )?),

            game: GameConfig::from_env()?,
        })
    }
}

/// Gameplay sizes and timings. Defaults match the shipped game.
#[derive(Clone, Debug)]
pub struct GameConfig {
    pub grid_radius: u32,
    pub max_players: usize,
    pub categories: Vec<String>,
    /// Share of non-center hexes carrying loot in royale
    pub loot_density: f64,
    pub spawn_window: Duration,
    pub shrink_interval: Duration,
    /// Lead time of the shrink warning before each shrink
    pub shrink_warning: Duration,
    pub duel_window: Duration,
    pub missile_flight: Duration,
    pub move_window: Duration,
    pub answer_window: Duration,
    /// Race: run a shrink step every this many turns
    pub shrink_every_turns: u32,
    /// Ladder: steps to the finish
    pub ladder_steps: u32,
    /// Questions requested from the content source at game start
    pub question_budget: usize,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            grid_radius: 8,
            max_players: 50,
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            loot_density: 0.18,
            spawn_window: Duration::from_secs(10),
            shrink_interval: Duration::from_secs(30),
            shrink_warning: Duration::from_secs(5),
            duel_window: Duration::from_secs(6),
            missile_flight: Duration::from_secs(10),
            move_window: Duration::from_secs(15),
            answer_window: Duration::from_secs(15),
            shrink_every_turns: 3,
            ladder_steps: 10,
            question_budget: 60,
        }
    }
}

impl GameConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let secs = |key: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            parse_or(key, default.as_secs()).map(Duration::from_secs)
        };

        let categories = match env::var("QUIZ_CATEGORIES") {
            Ok(raw) => raw
                .split(',')
                .map(|c| c.trim().to_lowercase())
                .filter(|c| !c.is_empty())
                .collect(),
            Err(_) => defaults.categories.clone(),
        };

        let config = Self {
            grid_radius: parse_or("GRID_RADIUS", defaults.grid_radius)?,
            max_players: parse_or("MAX_PLAYERS", defaults.max_players)?,
            categories,
            loot_density: parse_or("LOOT_DENSITY", defaults.loot_density)?,
            spawn_window: secs("SPAWN_WINDOW_SECS", defaults.spawn_window)?,
            shrink_interval: secs("SHRINK_INTERVAL_SECS", defaults.shrink_interval)?,
            shrink_warning: secs("SHRINK_WARNING_SECS", defaults.shrink_warning)?,
            duel_window: secs("DUEL_WINDOW_SECS", defaults.duel_window)?,
            missile_flight: secs("MISSILE_FLIGHT_SECS", defaults.missile_flight)?,
            move_window: secs("MOVE_WINDOW_SECS", defaults.move_window)?,
            answer_window: secs("ANSWER_WINDOW_SECS", defaults.answer_window)?,
            shrink_every_turns: parse_or("SHRINK_EVERY_TURNS", defaults.shrink_every_turns)?,
            ladder_steps: parse_or("LADDER_STEPS", defaults.ladder_steps)?,
            question_budget: parse_or("QUESTION_BUDGET", defaults.question_budget)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_radius == 0 {
            return Err(ConfigError::Invalid("GRID_RADIUS"));
        }
        if self.max_players < 2 {
            return Err(ConfigError::Invalid("MAX_PLAYERS"));
        }
        if self.categories.is_empty() {
            return Err(ConfigError::Invalid("QUIZ_CATEGORIES"));
        }
        if !(0.0..=1.0).contains(&self.loot_density) {
            return Err(ConfigError::Invalid("LOOT_DENSITY"));
        }
        if self.shrink_warning >= self.shrink_interval {
            return Err(ConfigError::Invalid("SHRINK_WARNING_SECS"));
        }
        if self.shrink_every_turns == 0 {
            return Err(ConfigError::Invalid("SHRINK_EVERY_TURNS"));
        }
        if self.ladder_steps == 0 {
            return Err(ConfigError::Invalid("LADDER_STEPS"));
        }
        Ok(())
    }
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = GameConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.grid_radius, 8);
        assert_eq!(config.categories.len(), 10);
    }

    #[test]
    fn warning_must_precede_shrink() {
        let config = GameConfig {
            shrink_warning: Duration::from_secs(30),
            ..GameConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid("SHRINK_WARNING_SECS"))
        ));
    }
}
