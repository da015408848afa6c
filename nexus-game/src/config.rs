//! Tunable pacing configuration for the simulation engine.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when engine configuration invariants are violated.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a probability in [0, 1] (got {value:.3})")]
    Probability { field: &'static str, value: f64 },
    #[error("{field} must be positive (got {value:.3})")]
    NonPositive { field: &'static str, value: f64 },
    #[error("autosave slot must not be empty")]
    EmptyAutosaveSlot,
    #[error("invalid configuration JSON: {0}")]
    Parse(String),
}

/// Pacing knobs for travel, trade, combat and story rolls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Chance that an arrival attempts a random story event.
    pub event_chance: f64,
    /// Chance that an illegal commodity is stocked where it is not legalized.
    pub contraband_chance: f64,
    /// Per-tick chance that a listing's trend is re-rolled.
    pub trend_flip_chance: f64,
    /// Distance units per unit of fuel.
    pub fuel_distance_divisor: f64,
    /// Encounter chance is `danger / encounter_danger_divisor`.
    pub encounter_danger_divisor: f64,
    /// Credits per missing fuel unit.
    pub refuel_rate: f64,
    /// Credits per missing hull point.
    pub repair_rate: f64,
    /// Share of listed credits salvaged when the enemy retreats.
    pub retreat_salvage_ratio: f64,
    pub max_flee_chance: f64,
    pub flee_speed_divisor: f64,
    /// Hull fraction restored by emergency systems after a defeat.
    pub defeat_hull_ratio: f64,
    /// Fraction of credits lost after a defeat.
    pub defeat_credit_penalty: f64,
    pub starting_credits: i64,
    pub autosave_slot: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            event_chance: 0.35,
            contraband_chance: 0.2,
            trend_flip_chance: 0.15,
            fuel_distance_divisor: 20.0,
            encounter_danger_divisor: 20.0,
            refuel_rate: 2.0,
            repair_rate: 3.0,
            retreat_salvage_ratio: 0.3,
            max_flee_chance: 0.8,
            flee_speed_divisor: 15.0,
            defeat_hull_ratio: 0.3,
            defeat_credit_penalty: 0.2,
            starting_credits: 1_000,
            autosave_slot: String::from("auto"),
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON; missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values fail validation.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Check every invariant the engine relies on.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let probabilities = [
            ("event_chance", self.event_chance),
            ("contraband_chance", self.contraband_chance),
            ("trend_flip_chance", self.trend_flip_chance),
            ("retreat_salvage_ratio", self.retreat_salvage_ratio),
            ("max_flee_chance", self.max_flee_chance),
            ("defeat_hull_ratio", self.defeat_hull_ratio),
            ("defeat_credit_penalty", self.defeat_credit_penalty),
        ];
        for (field, value) in probabilities {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Probability { field, value });
            }
        }
        let positives = [
            ("fuel_distance_divisor", self.fuel_distance_divisor),
            ("encounter_danger_divisor", self.encounter_danger_divisor),
            ("flee_speed_divisor", self.flee_speed_divisor),
        ];
        for (field, value) in positives {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        for (field, value) in [("refuel_rate", self.refuel_rate), ("repair_rate", self.repair_rate)] {
            if value.is_nan() || value < 0.0 {
                return Err(ConfigError::NonPositive { field, value });
            }
        }
        if self.autosave_slot.trim().is_empty() {
            return Err(ConfigError::EmptyAutosaveSlot);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg = EngineConfig::from_json(r#"{ "event_chance": 0.5 }"#).unwrap();
        assert!((cfg.event_chance - 0.5).abs() < f64::EPSILON);
        assert!((cfg.trend_flip_chance - 0.15).abs() < f64::EPSILON);
        assert_eq!(cfg.autosave_slot, "auto");
    }

    #[test]
    fn rejects_out_of_range_probability() {
        let err = EngineConfig::from_json(r#"{ "contraband_chance": 1.5 }"#).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Probability {
                field: "contraband_chance",
                value: 1.5
            }
        );
    }

    #[test]
    fn rejects_zero_divisor() {
        let cfg = EngineConfig {
            fuel_distance_divisor: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::NonPositive {
                field: "fuel_distance_divisor",
                ..
            })
        ));
    }
}
