//! Configuration module

use std::collections::BTreeMap;
use std::env;

use crate::models::ViolationKind;

/// Weighted scoring policy
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Score at which each further report asks the client to warn
    pub warning_threshold: f64,

    /// Score at which the session is disqualified (inclusive)
    pub disqualification_threshold: f64,

    /// Per-kind weight
    pub weights: BTreeMap<ViolationKind, f64>,
}

impl ScoringConfig {
    pub fn weight(&self, kind: ViolationKind) -> f64 {
        self.weights.get(&kind).copied().unwrap_or(0.0)
    }
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            warning_threshold: 2.0,
            disqualification_threshold: 5.0,
            weights: ViolationKind::ALL
                .iter()
                .map(|kind| (*kind, kind.default_weight()))
                .collect(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Environment (development, production)
    pub environment: String,

    /// Bearer key for session administration
    pub admin_key: String,

    /// Drafts still accepted this long after the clock runs out
    pub draft_grace_seconds: i64,

    pub scoring: ScoringConfig,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = ScoringConfig::default();
        let weights = ViolationKind::ALL
            .iter()
            .map(|kind| {
                let key = format!("WEIGHT_{}", kind.as_str().to_ascii_uppercase());
                (*kind, env_parse(&key).unwrap_or_else(|| defaults.weight(*kind)))
            })
            .collect();

        Self {
            port: env_parse("PORT").unwrap_or(8080),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),

            admin_key: env::var("ADMIN_KEY")
                .unwrap_or_else(|_| "dev-admin-key-change-in-production".to_string()),

            draft_grace_seconds: env_parse("DRAFT_GRACE_SECONDS").unwrap_or(30),

            scoring: ScoringConfig {
                warning_threshold: env_parse("WARNING_THRESHOLD")
                    .unwrap_or(defaults.warning_threshold),
                disqualification_threshold: env_parse("DISQUALIFICATION_THRESHOLD")
                    .unwrap_or(defaults.disqualification_threshold),
                weights,
            },
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}
