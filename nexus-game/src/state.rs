//! The root aggregate that owns every piece of mutable game state.
use serde::{Deserialize, Serialize};

use crate::combat::CombatState;
use crate::config::EngineConfig;
use crate::constants::{REPUTATION_MAX, REPUTATION_MIN};
use crate::content::{Content, ContentError, ShipClass};
use crate::economy::{MarketData, cargo_used};
use crate::galaxy::{Galaxy, StarSystem, WarpTicket};
use crate::ledger::Player;
use crate::rng::{RandomProvider, RngBundle};
use crate::story::StoryState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    pub seed: u64,
    /// Advanced once per completed jump.
    pub tick: u64,
    pub player: Player,
    pub galaxy: Galaxy,
    pub story: StoryState,
    #[serde(default)]
    pub combat: CombatState,
    #[serde(default)]
    pub pending_warp: Option<WarpTicket>,
}

impl GameState {
    /// Roll a new game for a captain flying the given starter hull.
    ///
    /// # Errors
    ///
    /// Returns an error if the content has no starter for `class`.
    pub fn new(
        seed: u64,
        player_name: &str,
        class: ShipClass,
        content: &Content,
        cfg: &EngineConfig,
        rngs: &RngBundle,
    ) -> Result<Self, ContentError> {
        let ship = content.starter_ship(class)?;
        let player = Player::new(
            rngs.story().uuid(),
            player_name,
            ship,
            cfg.starting_credits,
            content.base_reputations(),
            &content.start_system,
        );
        let galaxy = Galaxy::from_content(content, cfg, &mut *rngs.market());
        Ok(Self {
            seed,
            tick: 0,
            player,
            galaxy,
            story: StoryState::new(content),
            combat: CombatState::default(),
            pending_warp: None,
        })
    }

    #[must_use]
    pub fn current_system(&self) -> Option<&StarSystem> {
        self.galaxy.system(&self.player.current_system)
    }

    #[must_use]
    pub fn current_market(&self) -> Option<&MarketData> {
        self.galaxy.market(&self.player.current_system)
    }

    /// Describe every broken state invariant. Empty when the state is sound.
    #[must_use]
    pub fn audit(&self) -> Vec<String> {
        let mut violations = Vec::new();
        for market in self.galaxy.markets.values() {
            for listing in market.listings.iter().filter(|listing| listing.price < 1) {
                violations.push(format!(
                    "{} lists {} at {}",
                    market.system_id, listing.commodity_id, listing.price
                ));
            }
        }
        for (faction, value) in &self.player.reputation {
            if !(REPUTATION_MIN..=REPUTATION_MAX).contains(value) {
                violations.push(format!("reputation {} out of bounds: {value}", faction.key()));
            }
        }
        let ship = &self.player.ship;
        if ship.hull < 0 || ship.shields < 0 || ship.energy < 0 || ship.fuel < 0 {
            violations.push(format!(
                "negative ship resource: hull {} shields {} energy {} fuel {}",
                ship.hull, ship.shields, ship.energy, ship.fuel
            ));
        }
        if let Some(enemy) = &self.combat.enemy
            && (enemy.hull < 0 || enemy.shields < 0)
        {
            violations.push(format!("enemy {} below zero", enemy.name));
        }
        if self.player.xp >= self.player.xp_to_next_level() {
            violations.push(format!(
                "xp {} not below level threshold {}",
                self.player.xp,
                self.player.xp_to_next_level()
            ));
        }
        if cargo_used(&self.player.cargo) > ship.cargo_capacity {
            violations.push(String::from("cargo exceeds capacity"));
        }
        if self.player.cargo.iter().any(|item| item.quantity == 0) {
            violations.push(String::from("empty cargo stack kept"));
        }
        for quest in &self.story.quests {
            for objective in &quest.objectives {
                if objective.current > objective.required {
                    violations.push(format!("{}/{} overshoots", quest.id, objective.id));
                }
                if objective.completed != (objective.current >= objective.required) {
                    violations.push(format!("{}/{} completion flag drifted", quest.id, objective.id));
                }
            }
        }
        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_game_is_sound() {
        let content = Content::bundled().unwrap();
        let cfg = EngineConfig::default();
        let rngs = RngBundle::from_user_seed(77);
        let state = GameState::new(77, "Ren", ShipClass::Scout, &content, &cfg, &rngs).unwrap();
        assert_eq!(state.tick, 0);
        assert_eq!(state.player.credits, 1_000);
        assert_eq!(state.player.current_system, "nexus_prime");
        assert!(state.current_market().is_some());
        assert!(state.audit().is_empty());
        assert_eq!(state.player.id.len(), 36);
    }

    #[test]
    fn audit_flags_broken_values() {
        let content = Content::bundled().unwrap();
        let cfg = EngineConfig::default();
        let rngs = RngBundle::from_user_seed(78);
        let mut state = GameState::new(78, "Ren", ShipClass::Trader, &content, &cfg, &rngs).unwrap();
        state.player.ship.hull = -1;
        state.player.xp = 500;
        assert_eq!(state.audit().len(), 2);
    }
}
