//! Player resources and the only code allowed to mutate them.
use std::collections::BTreeMap;
use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{REPUTATION_MAX, REPUTATION_MIN, XP_PER_LEVEL};
use crate::content::{FactionId, ShipClass, ShipStat, ShipWeapon, UpgradeDef};
use crate::economy::{CargoItem, TradeRecord};
use crate::numbers::{i64_to_f64, round_f64_to_i64};

/// Reasons a shipyard service is refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ShipyardError {
    #[error("insufficient credits: need {cost}, have {available}")]
    InsufficientCredits { cost: i64, available: i64 },
    #[error("upgrade {0} is already installed")]
    AlreadyInstalled(String),
    #[error("unknown upgrade {0}")]
    UnknownUpgrade(String),
    #[error("{0} has no shipyard")]
    NoShipyard(String),
    #[error("requires tech level {required}, this system offers {available}")]
    TechLevelTooLow { required: u8, available: u8 },
    #[error("hull is already at full integrity")]
    NothingToRepair,
}

/// The player's vessel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ship {
    pub name: String,
    pub class: ShipClass,
    pub hull: i32,
    pub max_hull: i32,
    pub shields: i32,
    pub max_shields: i32,
    pub energy: i32,
    pub max_energy: i32,
    pub fuel: i32,
    pub max_fuel: i32,
    pub cargo_capacity: u32,
    pub weapons: Vec<ShipWeapon>,
    #[serde(default)]
    pub upgrades: Vec<String>,
    pub speed: i32,
}

impl Ship {
    /// Weapon fired by attack actions.
    #[must_use]
    pub fn primary_weapon(&self) -> Option<&ShipWeapon> {
        self.weapons.first()
    }

    #[must_use]
    pub const fn missing_hull(&self) -> i32 {
        self.max_hull.saturating_sub(self.hull)
    }

    #[must_use]
    pub const fn missing_fuel(&self) -> i32 {
        self.max_fuel.saturating_sub(self.fuel)
    }
}

/// Partial ship update produced by one combat action.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipUpdates {
    pub hull: Option<i32>,
    pub shields: Option<i32>,
    pub energy: Option<i32>,
}

impl ShipUpdates {
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.hull.is_none() && self.shields.is_none() && self.energy.is_none()
    }
}

/// Value stored in the open story flag bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FlagValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

impl FlagValue {
    /// Whether the flag counts as "set" for gating purposes.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Text(value) => !value.is_empty(),
        }
    }
}

impl From<bool> for FlagValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FlagValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FlagValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl fmt::Display for FlagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Text(value) => f.write_str(value),
        }
    }
}

/// Monotonic career counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlayerStats {
    pub distance_traveled: f64,
    pub systems_visited: u32,
    pub trades_completed: u32,
    pub combats_won: u32,
    pub combats_lost: u32,
    pub credits_earned: i64,
    pub credits_spent: i64,
    pub quests_completed: u32,
}

impl PlayerStats {
    /// Look a counter up by its serialized name, for dialogue stat gates.
    #[must_use]
    pub fn value(&self, key: &str) -> Option<i64> {
        let value = match key {
            "distance_traveled" => round_f64_to_i64(self.distance_traveled),
            "systems_visited" => i64::from(self.systems_visited),
            "trades_completed" => i64::from(self.trades_completed),
            "combats_won" => i64::from(self.combats_won),
            "combats_lost" => i64::from(self.combats_lost),
            "credits_earned" => self.credits_earned,
            "credits_spent" => self.credits_spent,
            "quests_completed" => i64::from(self.quests_completed),
            _ => return None,
        };
        Some(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReputationTier {
    Hostile,
    Unfriendly,
    Neutral,
    Friendly,
    Allied,
}

impl ReputationTier {
    #[must_use]
    pub const fn from_value(value: i32) -> Self {
        match value {
            i32::MIN..=-60 => Self::Hostile,
            -59..=-20 => Self::Unfriendly,
            -19..=20 => Self::Neutral,
            21..=60 => Self::Friendly,
            _ => Self::Allied,
        }
    }
}

/// Everything the captain owns and has done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub id: String,
    pub name: String,
    pub credits: i64,
    pub xp: u32,
    pub level: u32,
    pub ship: Ship,
    #[serde(default)]
    pub cargo: Vec<CargoItem>,
    pub reputation: BTreeMap<FactionId, i32>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    #[serde(default)]
    pub stats: PlayerStats,
    #[serde(default)]
    pub trade_history: Vec<TradeRecord>,
    pub current_system: String,
    #[serde(default)]
    pub visited_systems: Vec<String>,
}

impl Player {
    #[must_use]
    pub fn new(
        id: String,
        name: &str,
        ship: Ship,
        credits: i64,
        reputation: BTreeMap<FactionId, i32>,
        start_system: &str,
    ) -> Self {
        let reputation = reputation
            .into_iter()
            .map(|(faction, value)| (faction, value.clamp(REPUTATION_MIN, REPUTATION_MAX)))
            .collect();
        Self {
            id,
            name: name.to_string(),
            credits,
            xp: 0,
            level: 1,
            ship,
            cargo: Vec::new(),
            reputation,
            flags: BTreeMap::new(),
            stats: PlayerStats {
                systems_visited: 1,
                ..PlayerStats::default()
            },
            trade_history: Vec::new(),
            current_system: start_system.to_string(),
            visited_systems: vec![start_system.to_string()],
        }
    }

    /// XP needed to leave the current level.
    #[must_use]
    pub const fn xp_to_next_level(&self) -> u32 {
        self.level.saturating_mul(XP_PER_LEVEL)
    }

    /// Signed credit change; positive amounts count as earned, negative as spent.
    pub fn add_credits(&mut self, amount: i64) {
        self.credits = self.credits.saturating_add(amount);
        if amount >= 0 {
            self.stats.credits_earned = self.stats.credits_earned.saturating_add(amount);
        } else {
            self.stats.credits_spent = self.stats.credits_spent.saturating_add(amount.saturating_neg());
        }
    }

    /// Add experience, levelling up as many times as it covers.
    /// Returns the number of levels gained.
    pub fn add_xp(&mut self, amount: u32) -> u32 {
        self.xp = self.xp.saturating_add(amount);
        let mut gained = 0;
        while self.xp >= self.xp_to_next_level() {
            self.xp -= self.xp_to_next_level();
            self.level = self.level.saturating_add(1);
            gained += 1;
        }
        if gained > 0 {
            info!("Level up | level:{} gained:{}", self.level, gained);
        }
        gained
    }

    #[must_use]
    pub fn reputation(&self, faction: FactionId) -> i32 {
        self.reputation.get(&faction).copied().unwrap_or(0)
    }

    #[must_use]
    pub fn reputation_tier(&self, faction: FactionId) -> ReputationTier {
        ReputationTier::from_value(self.reputation(faction))
    }

    /// Shift standing with a faction, clamped to the reputation bounds.
    /// Returns the new value.
    pub fn add_reputation(&mut self, faction: FactionId, delta: i32) -> i32 {
        let next = self
            .reputation(faction)
            .saturating_add(delta)
            .clamp(REPUTATION_MIN, REPUTATION_MAX);
        self.reputation.insert(faction, next);
        debug!("Reputation | {}:{} ({:+})", faction.key(), next, delta);
        next
    }

    pub fn set_flag(&mut self, key: &str, value: FlagValue) {
        self.flags.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn flag(&self, key: &str) -> Option<&FlagValue> {
        self.flags.get(key)
    }

    /// Move the player; returns true when the system had never been visited.
    pub fn set_current_system(&mut self, system_id: &str) -> bool {
        self.current_system = system_id.to_string();
        if self.visited_systems.iter().any(|id| id == system_id) {
            return false;
        }
        self.visited_systems.push(system_id.to_string());
        self.stats.systems_visited = self.stats.systems_visited.saturating_add(1);
        true
    }

    /// Apply combat updates, clamping each value into `0..=max`.
    pub fn apply_ship_updates(&mut self, updates: ShipUpdates) {
        let ship = &mut self.ship;
        if let Some(hull) = updates.hull {
            ship.hull = hull.clamp(0, ship.max_hull);
        }
        if let Some(shields) = updates.shields {
            ship.shields = shields.clamp(0, ship.max_shields);
        }
        if let Some(energy) = updates.energy {
            ship.energy = energy.clamp(0, ship.max_energy);
        }
    }

    pub fn record_trade(&mut self, record: TradeRecord) {
        self.stats.trades_completed = self.stats.trades_completed.saturating_add(1);
        self.trade_history.push(record);
    }

    /// Fill the tank at `rate` credits per missing unit. Returns the cost.
    ///
    /// # Errors
    ///
    /// Returns [`ShipyardError::InsufficientCredits`] when the top-up is unaffordable.
    pub fn refuel(&mut self, rate: f64) -> Result<i64, ShipyardError> {
        let cost = round_f64_to_i64(f64::from(self.ship.missing_fuel()) * rate);
        self.ensure_affordable(cost)?;
        self.ship.fuel = self.ship.max_fuel;
        self.add_credits(-cost);
        Ok(cost)
    }

    /// Restore hull and shields at `rate` credits per missing hull point.
    ///
    /// # Errors
    ///
    /// Rejects a repair with nothing to fix or one the player cannot pay for.
    pub fn repair(&mut self, rate: f64) -> Result<i64, ShipyardError> {
        let missing = self.ship.missing_hull();
        if missing <= 0 {
            return Err(ShipyardError::NothingToRepair);
        }
        let cost = round_f64_to_i64(f64::from(missing) * rate);
        self.ensure_affordable(cost)?;
        self.ship.hull = self.ship.max_hull;
        self.ship.shields = self.ship.max_shields;
        self.add_credits(-cost);
        Ok(cost)
    }

    /// Buy and fit an upgrade. Capacity upgrades also top the current value up.
    ///
    /// # Errors
    ///
    /// Rejects duplicate installs and unaffordable upgrades without mutating anything.
    pub fn install_upgrade(&mut self, upgrade: &UpgradeDef) -> Result<(), ShipyardError> {
        if self.ship.upgrades.iter().any(|id| *id == upgrade.id) {
            return Err(ShipyardError::AlreadyInstalled(upgrade.id.clone()));
        }
        self.ensure_affordable(upgrade.cost)?;
        self.add_credits(-upgrade.cost);

        let value = upgrade.effect.value;
        let ship = &mut self.ship;
        match upgrade.effect.stat {
            ShipStat::MaxShields => {
                ship.max_shields = ship.max_shields.saturating_add(value);
                ship.shields = ship.shields.saturating_add(value).min(ship.max_shields);
            }
            ShipStat::MaxHull => {
                ship.max_hull = ship.max_hull.saturating_add(value);
                ship.hull = ship.hull.saturating_add(value).min(ship.max_hull);
            }
            ShipStat::MaxEnergy => {
                ship.max_energy = ship.max_energy.saturating_add(value);
                ship.energy = ship.energy.saturating_add(value).min(ship.max_energy);
            }
            ShipStat::Speed => ship.speed = ship.speed.saturating_add(value),
            ShipStat::CargoCapacity => {
                ship.cargo_capacity = ship.cargo_capacity.saturating_add_signed(value);
            }
        }
        ship.upgrades.push(upgrade.id.clone());
        info!("Upgrade installed | {} cost:{}", upgrade.id, upgrade.cost);
        Ok(())
    }

    /// Remove a fraction of current credits; the one path allowed to take credits
    /// without an affordability check.
    pub fn apply_credit_penalty(&mut self, ratio: f64) -> i64 {
        let penalty = round_f64_to_i64(i64_to_f64(self.credits.max(0)) * ratio);
        if penalty > 0 {
            self.add_credits(-penalty);
        }
        penalty
    }

    const fn ensure_affordable(&self, cost: i64) -> Result<(), ShipyardError> {
        if cost > self.credits {
            return Err(ShipyardError::InsufficientCredits {
                cost,
                available: self.credits,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{Content, UpgradeEffect, UpgradeSlot};

    fn player() -> Player {
        let content = Content::bundled().unwrap();
        let ship = content.starter_ship(ShipClass::Trader).unwrap();
        Player::new(
            String::from("p1"),
            "Nova",
            ship,
            1_000,
            content.base_reputations(),
            "nexus_prime",
        )
    }

    fn upgrade(stat: ShipStat, value: i32, cost: i64) -> UpgradeDef {
        UpgradeDef {
            id: String::from("test_upgrade"),
            name: String::from("Test"),
            description: String::new(),
            slot: UpgradeSlot::Special,
            cost,
            effect: UpgradeEffect { stat, value },
            required_tech: 1,
        }
    }

    #[test]
    fn xp_rolls_over_multiple_levels() {
        let mut p = player();
        assert_eq!(p.add_xp(350), 2);
        // 350 - 100 (lvl1) - 200 (lvl2) = 50 at level 3
        assert_eq!(p.level, 3);
        assert_eq!(p.xp, 50);
        assert_eq!(p.add_xp(250), 1);
        assert_eq!(p.level, 4);
        assert_eq!(p.xp, 0);
        assert!(p.xp < p.xp_to_next_level());
    }

    #[test]
    fn reputation_is_clamped() {
        let mut p = player();
        assert_eq!(p.add_reputation(FactionId::Hegemony, -500), REPUTATION_MIN);
        assert_eq!(p.add_reputation(FactionId::Hegemony, 250), REPUTATION_MAX);
        assert_eq!(p.reputation_tier(FactionId::Hegemony), ReputationTier::Allied);
        assert_eq!(p.reputation_tier(FactionId::FreeTraders), ReputationTier::Neutral);
        assert_eq!(ReputationTier::from_value(-60), ReputationTier::Hostile);
        assert_eq!(ReputationTier::from_value(-20), ReputationTier::Unfriendly);
        assert_eq!(ReputationTier::from_value(60), ReputationTier::Friendly);
    }

    #[test]
    fn credits_track_earned_and_spent() {
        let mut p = player();
        p.add_credits(300);
        p.add_credits(-120);
        assert_eq!(p.credits, 1_180);
        assert_eq!(p.stats.credits_earned, 300);
        assert_eq!(p.stats.credits_spent, 120);
    }

    #[test]
    fn first_visits_are_counted_once() {
        let mut p = player();
        assert!(!p.set_current_system("nexus_prime"));
        assert!(p.set_current_system("meridian"));
        assert!(!p.set_current_system("meridian"));
        assert_eq!(p.stats.systems_visited, 2);
        assert_eq!(p.current_system, "meridian");
    }

    #[test]
    fn ship_updates_are_clamped() {
        let mut p = player();
        p.apply_ship_updates(ShipUpdates {
            hull: Some(-5),
            shields: Some(10_000),
            energy: None,
        });
        assert_eq!(p.ship.hull, 0);
        assert_eq!(p.ship.shields, p.ship.max_shields);
        assert_eq!(p.ship.energy, p.ship.max_energy);
    }

    #[test]
    fn refuel_and_repair_charge_for_the_deficit() {
        let mut p = player();
        p.ship.fuel -= 10;
        assert_eq!(p.refuel(2.0), Ok(20));
        assert_eq!(p.ship.fuel, p.ship.max_fuel);
        assert_eq!(p.refuel(2.0), Ok(0));

        assert_eq!(p.repair(3.0), Err(ShipyardError::NothingToRepair));
        p.ship.hull -= 40;
        p.ship.shields = 0;
        assert_eq!(p.repair(3.0), Ok(120));
        assert_eq!(p.ship.hull, p.ship.max_hull);
        assert_eq!(p.ship.shields, p.ship.max_shields);
        assert_eq!(p.credits, 1_000 - 20 - 120);

        p.credits = 5;
        p.ship.hull -= 10;
        assert!(matches!(p.repair(3.0), Err(ShipyardError::InsufficientCredits { .. })));
        assert_eq!(p.credits, 5);
    }

    #[test]
    fn upgrade_tops_up_current_value() {
        let mut p = player();
        p.ship.shields = 10;
        p.install_upgrade(&upgrade(ShipStat::MaxShields, 25, 400)).unwrap();
        assert_eq!(p.ship.max_shields, 55);
        assert_eq!(p.ship.shields, 35);
        assert_eq!(p.credits, 600);
        assert_eq!(
            p.install_upgrade(&upgrade(ShipStat::MaxShields, 25, 400)),
            Err(ShipyardError::AlreadyInstalled(String::from("test_upgrade")))
        );
    }

    #[test]
    fn unaffordable_upgrade_changes_nothing() {
        let mut p = player();
        let before = p.clone();
        let result = p.install_upgrade(&upgrade(ShipStat::CargoCapacity, 15, 5_000));
        assert!(matches!(result, Err(ShipyardError::InsufficientCredits { cost: 5_000, .. })));
        assert_eq!(p, before);
    }

    #[test]
    fn flags_report_truthiness() {
        assert!(FlagValue::from(true).is_truthy());
        assert!(!FlagValue::from(0).is_truthy());
        assert!(FlagValue::from("preserve").is_truthy());
        assert!(!FlagValue::from("").is_truthy());
        let parsed: FlagValue = serde_json::from_str("\"release\"").unwrap();
        assert_eq!(parsed, FlagValue::Text(String::from("release")));
    }

    #[test]
    fn credit_penalty_takes_a_share() {
        let mut p = player();
        assert_eq!(p.apply_credit_penalty(0.2), 200);
        assert_eq!(p.credits, 800);
        p.credits = -10;
        assert_eq!(p.apply_credit_penalty(0.2), 0);
    }
}
