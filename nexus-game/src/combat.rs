//! Turn-based ship combat.
//!
//! The resolver never touches the player's ship directly: every action returns
//! the next [`CombatState`] together with a [`ShipUpdates`] patch that the
//! ledger applies in one step.

use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use thiserror::Error;

use crate::config::EngineConfig;
use crate::constants::{
    DAMAGE_VARIANCE_MAX, DAMAGE_VARIANCE_MIN, DEFEND_ENERGY_RESTORE, DEFEND_SHIELD_RESTORE,
    ENEMY_DEFEND_ENERGY, ENEMY_DEFEND_SHIELDS, ENEMY_DIFFICULTY_SLACK, ENEMY_FLEE_SUCCESS,
    ENEMY_RECHARGE, ENEMY_SCALING_BASE, ENEMY_SCALING_PER_DANGER, HEAVY_ACCURACY_MULTIPLIER,
    HEAVY_COST_MULTIPLIER, HEAVY_DAMAGE_MULTIPLIER, REPAIR_ENERGY_COST, REPAIR_HULL_RESTORE,
};
use crate::content::{AiBehavior, Content, ContentError, EnemyTemplate, FactionId, ShipWeapon};
use crate::ledger::{Ship, ShipUpdates};
use crate::numbers::{ceil_f64_to_i32, i64_to_f64, round_f64_to_i32, round_f64_to_i64, round_f64_to_u32};
use crate::rng::RandomProvider;

#[derive(Debug, Error)]
pub enum CombatError {
    #[error("no combat in progress")]
    NotActive,
    #[error("it is not the player's turn")]
    NotPlayerTurn,
    #[error("a combat is already in progress")]
    AlreadyActive,
    #[error("the battle has not been decided yet")]
    Unresolved,
    #[error("no enemy templates are available")]
    NoTemplates,
    #[error(transparent)]
    Content(#[from] ContentError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatAction {
    Attack,
    HeavyAttack,
    Defend,
    Repair,
    Flee,
}

impl CombatAction {
    pub const ALL: [Self; 5] = [
        Self::Attack,
        Self::HeavyAttack,
        Self::Defend,
        Self::Repair,
        Self::Flee,
    ];
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum CombatResult {
    #[default]
    Pending,
    /// The enemy was destroyed, or retreated and left salvage behind.
    Victory { retreated: bool },
    Defeat,
    Fled,
}

impl CombatResult {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    Player,
    Enemy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogAction {
    Appear,
    Attack,
    HeavyAttack,
    Miss,
    NoEnergy,
    Defend,
    Repair,
    Recharge,
    Flee,
    FleeFailed,
    Victory,
    Defeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombatLogEntry {
    pub round: u32,
    pub actor: Actor,
    pub action: LogAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub damage: Option<i32>,
    pub message: String,
}

/// An opponent scaled to the danger of the system it was met in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyShip {
    pub id: String,
    pub name: String,
    pub hull: i32,
    pub max_hull: i32,
    pub shields: i32,
    pub max_shields: i32,
    pub energy: i32,
    pub max_energy: i32,
    pub weapons: SmallVec<[ShipWeapon; 2]>,
    pub credits: i64,
    pub xp: u32,
    #[serde(default)]
    pub faction: Option<FactionId>,
    pub ai: AiBehavior,
    #[serde(default)]
    pub description: String,
}

impl EnemyShip {
    fn hull_ratio(&self) -> f64 {
        f64::from(self.hull) / f64::from(self.max_hull.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CombatState {
    pub active: bool,
    pub enemy: Option<EnemyShip>,
    pub round: u32,
    pub log: Vec<CombatLogEntry>,
    pub player_turn: bool,
    pub result: CombatResult,
}

impl Default for CombatState {
    fn default() -> Self {
        Self {
            active: false,
            enemy: None,
            round: 0,
            log: Vec::new(),
            player_turn: true,
            result: CombatResult::Pending,
        }
    }
}

impl CombatState {
    fn push(&mut self, actor: Actor, action: LogAction, damage: Option<i32>, message: String) {
        self.log.push(CombatLogEntry {
            round: self.round,
            actor,
            action,
            damage,
            message,
        });
    }

    fn conclude(&mut self, result: CombatResult) {
        self.result = result;
        self.active = false;
        self.player_turn = false;
    }

    /// Credits and XP owed to the player, once the battle is won.
    #[must_use]
    pub fn rewards(&self, cfg: &EngineConfig) -> Option<CombatRewards> {
        let CombatResult::Victory { retreated } = self.result else {
            return None;
        };
        let enemy = self.enemy.as_ref()?;
        let credits = if retreated {
            round_f64_to_i64(i64_to_f64(enemy.credits) * cfg.retreat_salvage_ratio)
        } else {
            enemy.credits
        };
        Some(CombatRewards {
            credits,
            xp: enemy.xp,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CombatRewards {
    pub credits: i64,
    pub xp: u32,
}

/// Next state plus the patch to apply to the player's ship.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionResolution {
    pub state: CombatState,
    pub ship_updates: ShipUpdates,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnemyIntent {
    Attack,
    Defend,
    Flee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct AttackOutcome {
    hit: bool,
    shield_damage: i32,
    hull_damage: i32,
}

/// Split raw damage into the part the shields soak and the part reaching the hull.
#[must_use]
pub fn split_damage(total: i32, shields: i32) -> (i32, i32) {
    let total = total.max(0);
    let absorbed = total.min(shields.max(0));
    (absorbed, total - absorbed)
}

/// Energy a heavy shot costs: half again the weapon's cost, rounded up.
#[must_use]
pub fn heavy_cost(weapon: &ShipWeapon) -> i32 {
    ceil_f64_to_i32(f64::from(weapon.energy_cost) * HEAVY_COST_MULTIPLIER)
}

fn resolve_attack<R: Rng + ?Sized>(
    weapon: &ShipWeapon,
    target_shields: i32,
    heavy: bool,
    rng: &mut R,
) -> AttackOutcome {
    let accuracy = if heavy {
        weapon.accuracy * HEAVY_ACCURACY_MULTIPLIER
    } else {
        weapon.accuracy
    };
    if !rng.random_chance(accuracy) {
        return AttackOutcome {
            hit: false,
            shield_damage: 0,
            hull_damage: 0,
        };
    }
    let base = if heavy {
        f64::from(weapon.damage) * HEAVY_DAMAGE_MULTIPLIER
    } else {
        f64::from(weapon.damage)
    };
    let variance = rng.random_float(DAMAGE_VARIANCE_MIN, DAMAGE_VARIANCE_MAX);
    let (shield_damage, hull_damage) = split_damage(round_f64_to_i32(base * variance), target_shields);
    AttackOutcome {
        hit: true,
        shield_damage,
        hull_damage,
    }
}

/// Build an enemy for a system of the given danger.
///
/// With a `template` fragment the first template whose name contains it
/// (case-insensitively) is used, falling back to a random one. Without it,
/// templates are gated by difficulty and the first template backs up an empty pool.
///
/// # Errors
///
/// Fails when no templates exist or a template references an unknown weapon.
pub fn generate_enemy<R: Rng + ?Sized>(
    danger_level: u8,
    template: Option<&str>,
    content: &Content,
    rng: &mut R,
) -> Result<EnemyShip, CombatError> {
    let chosen = match template {
        Some(fragment) => {
            let needle = fragment.to_lowercase();
            content
                .enemies
                .iter()
                .find(|candidate| candidate.name.to_lowercase().contains(&needle))
                .or_else(|| rng.random_choice(&content.enemies))
        }
        None => {
            let ceiling = f64::from(danger_level) + ENEMY_DIFFICULTY_SLACK;
            let suitable: Vec<&EnemyTemplate> = content
                .enemies
                .iter()
                .filter(|candidate| candidate.difficulty() <= ceiling)
                .collect();
            if suitable.is_empty() {
                content.enemies.first()
            } else {
                rng.random_choice(&suitable).copied()
            }
        }
    };
    let template = chosen.ok_or(CombatError::NoTemplates)?;

    let scaling = ENEMY_SCALING_BASE + f64::from(danger_level) / 10.0 * ENEMY_SCALING_PER_DANGER;
    let scale = |value: i32| round_f64_to_i32(f64::from(value) * scaling);
    let weapons = content.resolve_weapons(&template.name, &template.weapons)?;

    Ok(EnemyShip {
        id: rng.uuid(),
        name: template.name.clone(),
        hull: scale(template.hull),
        max_hull: scale(template.hull),
        shields: scale(template.shields),
        max_shields: scale(template.shields),
        energy: template.energy,
        max_energy: template.energy,
        weapons: weapons.into_iter().collect(),
        credits: round_f64_to_i64(i64_to_f64(template.credits) * scaling),
        xp: round_f64_to_u32(f64::from(template.xp) * scaling),
        faction: template.faction,
        ai: template.ai,
        description: template.description.clone(),
    })
}

/// Open a battle against `enemy`.
#[must_use]
pub fn init_combat(enemy: EnemyShip) -> CombatState {
    let mut state = CombatState {
        active: true,
        round: 0,
        ..CombatState::default()
    };
    state.push(
        Actor::Enemy,
        LogAction::Appear,
        None,
        format!("{} engages. {}", enemy.name, enemy.description),
    );
    state.round = 1;
    state.enemy = Some(enemy);
    state
}

/// Whether arriving in a system of this danger draws an attack.
pub fn should_encounter<R: Rng + ?Sized>(danger_level: u8, cfg: &EngineConfig, rng: &mut R) -> bool {
    rng.random_chance(f64::from(danger_level) / cfg.encounter_danger_divisor)
}

/// Pick the enemy's move from its behavior and condition.
pub fn choose_enemy_action<R: Rng + ?Sized>(enemy: &EnemyShip, rng: &mut R) -> EnemyIntent {
    let hull = enemy.hull_ratio();
    let pick = |rng: &mut R, p: f64, yes: EnemyIntent, no: EnemyIntent| {
        if rng.random_chance(p) { yes } else { no }
    };
    match enemy.ai {
        AiBehavior::Aggressive => {
            if hull < 0.15 {
                pick(rng, 0.5, EnemyIntent::Flee, EnemyIntent::Attack)
            } else {
                pick(rng, 0.85, EnemyIntent::Attack, EnemyIntent::Defend)
            }
        }
        AiBehavior::Defensive => {
            if hull < 0.3 {
                pick(rng, 0.4, EnemyIntent::Flee, EnemyIntent::Defend)
            } else {
                pick(rng, 0.5, EnemyIntent::Attack, EnemyIntent::Defend)
            }
        }
        AiBehavior::Cowardly => {
            if hull < 0.5 {
                EnemyIntent::Flee
            } else {
                pick(rng, 0.6, EnemyIntent::Attack, EnemyIntent::Defend)
            }
        }
        AiBehavior::Balanced => {
            if hull < 0.2 {
                pick(rng, 0.3, EnemyIntent::Flee, EnemyIntent::Attack)
            } else if f64::from(enemy.shields) < f64::from(enemy.max_shields) * 0.3 {
                pick(rng, 0.6, EnemyIntent::Defend, EnemyIntent::Attack)
            } else {
                pick(rng, 0.7, EnemyIntent::Attack, EnemyIntent::Defend)
            }
        }
    }
}

/// Resolve one round: the player's action, then the enemy's reply if the
/// battle is still on.
///
/// # Errors
///
/// Rejects actions when no battle is running or the player must wait.
pub fn execute_player_action<R: Rng + ?Sized>(
    action: CombatAction,
    ship: &Ship,
    state: &CombatState,
    cfg: &EngineConfig,
    rng: &mut R,
) -> Result<ActionResolution, CombatError> {
    if !state.active || state.result.is_terminal() {
        return Err(CombatError::NotActive);
    }
    if !state.player_turn {
        return Err(CombatError::NotPlayerTurn);
    }
    let Some(mut enemy) = state.enemy.clone() else {
        return Err(CombatError::NotActive);
    };
    let mut next = state.clone();
    let mut updates = ShipUpdates::default();
    let mut energy = ship.energy;

    match action {
        CombatAction::Attack | CombatAction::HeavyAttack => {
            let heavy = action == CombatAction::HeavyAttack;
            match ship.primary_weapon() {
                None => next.push(
                    Actor::Player,
                    LogAction::NoEnergy,
                    None,
                    String::from("No weapons are mounted."),
                ),
                Some(weapon) => {
                    let cost = if heavy { heavy_cost(weapon) } else { weapon.energy_cost };
                    if energy < cost {
                        next.push(
                            Actor::Player,
                            LogAction::NoEnergy,
                            None,
                            String::from("Not enough energy to fire."),
                        );
                    } else {
                        energy -= cost;
                        let outcome = resolve_attack(weapon, enemy.shields, heavy, rng);
                        if outcome.hit {
                            enemy.shields = (enemy.shields - outcome.shield_damage).max(0);
                            enemy.hull = (enemy.hull - outcome.hull_damage).max(0);
                            let total = outcome.shield_damage + outcome.hull_damage;
                            let absorbed = if outcome.shield_damage > 0 {
                                format!(" ({} absorbed by shields)", outcome.shield_damage)
                            } else {
                                String::new()
                            };
                            next.push(
                                Actor::Player,
                                if heavy { LogAction::HeavyAttack } else { LogAction::Attack },
                                Some(total),
                                format!("Your {} hits for {total} damage.{absorbed}", weapon.name),
                            );
                        } else {
                            next.push(
                                Actor::Player,
                                LogAction::Miss,
                                None,
                                format!("Your {} misses.", weapon.name),
                            );
                        }
                    }
                }
            }
        }
        CombatAction::Defend => {
            let shield_gain = (ship.max_shields - ship.shields).clamp(0, DEFEND_SHIELD_RESTORE);
            let energy_gain = (ship.max_energy - energy).clamp(0, DEFEND_ENERGY_RESTORE);
            updates.shields = Some(ship.shields + shield_gain);
            energy += energy_gain;
            next.push(
                Actor::Player,
                LogAction::Defend,
                None,
                format!("Shields +{shield_gain}, energy +{energy_gain}."),
            );
        }
        CombatAction::Repair => {
            if energy < REPAIR_ENERGY_COST {
                next.push(
                    Actor::Player,
                    LogAction::NoEnergy,
                    None,
                    String::from("Not enough energy for repairs."),
                );
            } else {
                energy -= REPAIR_ENERGY_COST;
                let restored = ship.missing_hull().clamp(0, REPAIR_HULL_RESTORE);
                updates.hull = Some(ship.hull + restored);
                next.push(
                    Actor::Player,
                    LogAction::Repair,
                    None,
                    format!("Emergency repairs restore {restored} hull."),
                );
            }
        }
        CombatAction::Flee => {
            let chance = cfg
                .max_flee_chance
                .min(f64::from(ship.speed) / cfg.flee_speed_divisor);
            if rng.random_chance(chance) {
                next.push(
                    Actor::Player,
                    LogAction::Flee,
                    None,
                    String::from("Emergency engines fire and you break away."),
                );
                next.enemy = Some(enemy);
                next.conclude(CombatResult::Fled);
                updates.energy = Some(energy);
                return Ok(ActionResolution {
                    state: next,
                    ship_updates: updates,
                });
            }
            next.push(
                Actor::Player,
                LogAction::FleeFailed,
                None,
                String::from("Escape failed. The enemy cuts off your retreat."),
            );
        }
    }
    updates.energy = Some(energy);

    if enemy.hull <= 0 {
        next.push(
            Actor::Player,
            LogAction::Victory,
            None,
            format!("{} is destroyed. +{} credits, +{} XP", enemy.name, enemy.credits, enemy.xp),
        );
        next.enemy = Some(enemy);
        next.conclude(CombatResult::Victory { retreated: false });
        return Ok(ActionResolution {
            state: next,
            ship_updates: updates,
        });
    }

    let intent = choose_enemy_action(&enemy, rng);
    debug!("Enemy intent | {} round:{} {:?}", enemy.name, next.round, intent);
    match intent {
        EnemyIntent::Attack => {
            let weapon = rng.random_choice(enemy.weapons.as_slice()).cloned();
            match weapon {
                Some(weapon) if enemy.energy >= weapon.energy_cost => {
                    enemy.energy -= weapon.energy_cost;
                    let shields = updates.shields.unwrap_or(ship.shields);
                    let hull = updates.hull.unwrap_or(ship.hull);
                    let outcome = resolve_attack(&weapon, shields, false, rng);
                    if outcome.hit {
                        updates.shields = Some((shields - outcome.shield_damage).max(0));
                        updates.hull = Some((hull - outcome.hull_damage).max(0));
                        let total = outcome.shield_damage + outcome.hull_damage;
                        next.push(
                            Actor::Enemy,
                            LogAction::Attack,
                            Some(total),
                            format!("{} fires {} for {total} damage.", enemy.name, weapon.name),
                        );
                    } else {
                        next.push(
                            Actor::Enemy,
                            LogAction::Miss,
                            None,
                            format!("{}'s {} misses.", enemy.name, weapon.name),
                        );
                    }
                }
                _ => {
                    enemy.energy = (enemy.energy + ENEMY_RECHARGE).min(enemy.max_energy);
                    next.push(
                        Actor::Enemy,
                        LogAction::Recharge,
                        None,
                        format!("{} reroutes power to its weapons.", enemy.name),
                    );
                }
            }
        }
        EnemyIntent::Defend => {
            enemy.shields = (enemy.shields + ENEMY_DEFEND_SHIELDS).min(enemy.max_shields);
            enemy.energy = (enemy.energy + ENEMY_DEFEND_ENERGY).min(enemy.max_energy);
            next.push(
                Actor::Enemy,
                LogAction::Defend,
                None,
                format!("{} reinforces its shields.", enemy.name),
            );
        }
        EnemyIntent::Flee => {
            if rng.random_chance(ENEMY_FLEE_SUCCESS) {
                let salvage = round_f64_to_i64(i64_to_f64(enemy.credits) * cfg.retreat_salvage_ratio);
                next.push(
                    Actor::Enemy,
                    LogAction::Flee,
                    None,
                    format!("{} flees the battle. +{salvage} credits salvaged.", enemy.name),
                );
                next.enemy = Some(enemy);
                next.conclude(CombatResult::Victory { retreated: true });
                return Ok(ActionResolution {
                    state: next,
                    ship_updates: updates,
                });
            }
            next.push(
                Actor::Enemy,
                LogAction::FleeFailed,
                None,
                format!("{} tries to flee but fails.", enemy.name),
            );
        }
    }

    next.enemy = Some(enemy);
    if updates.hull.unwrap_or(ship.hull) <= 0 {
        next.push(
            Actor::Enemy,
            LogAction::Defeat,
            None,
            String::from("Your ship is disabled."),
        );
        next.conclude(CombatResult::Defeat);
    } else {
        next.round += 1;
        next.player_turn = true;
    }
    Ok(ActionResolution {
        state: next,
        ship_updates: updates,
    })
}
