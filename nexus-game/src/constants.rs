//! Centralized balance and rule constants for the Nexus simulation.
//!
//! These values define the fixed math of the core rules. Pacing knobs that a
//! caller may reasonably tune live in [`crate::config::EngineConfig`] instead.

// Economy -------------------------------------------------------------------
pub(crate) const SCARCITY_SUPPLY_THRESHOLD: u32 = 10;
pub(crate) const SCARCITY_SURCHARGE: f64 = 1.10;
pub(crate) const OVERSUPPLY_DEMAND_THRESHOLD: u32 = 10;
pub(crate) const OVERSUPPLY_SELL_RATIO: f64 = 0.85;
pub(crate) const STANDARD_SELL_RATIO: f64 = 0.95;
pub(crate) const MIN_LISTING_PRICE: u32 = 1;

pub(crate) const HIGH_TECH_LEVEL: u8 = 8;
pub(crate) const LOW_TECH_LEVEL: u8 = 4;
pub(crate) const RAW_MATERIAL_TECH_CUTOFF: u8 = 5;
pub(crate) const HIGH_DANGER_LEVEL: u8 = 6;
pub(crate) const LOW_DANGER_LEVEL: u8 = 2;

pub(crate) const HIGH_TECH_DISCOUNT_GOODS: &[&str] =
    &["quantum_processors", "nano_assemblers", "positronic_cores"];
pub(crate) const HIGH_TECH_DISCOUNT: f64 = 0.7;
pub(crate) const LOW_TECH_PREMIUM_GOODS: &[&str] = &["quantum_processors", "nano_assemblers"];
pub(crate) const LOW_TECH_PREMIUM: f64 = 1.5;
pub(crate) const DANGER_DISCOUNT_GOODS: &[&str] =
    &["combat_stims", "neural_hackers", "shield_emitters"];
pub(crate) const DANGER_DISCOUNT: f64 = 0.8;
pub(crate) const SAFE_LUXURY_PREMIUM_GOODS: &[&str] = &["nebula_wine", "void_silk"];
pub(crate) const SAFE_LUXURY_PREMIUM: f64 = 1.3;
pub(crate) const RAW_MATERIAL_GOODS: &[&str] = &["tritanium_ore", "helium3", "crystal_lattice"];
pub(crate) const RAW_MATERIAL_LOW_TECH: f64 = 0.6;
pub(crate) const RAW_MATERIAL_HIGH_TECH: f64 = 1.2;

pub(crate) const MARKET_STOCK_MIN: f64 = 5.0;
pub(crate) const MARKET_STOCK_MAX: f64 = 50.0;
pub(crate) const MARKET_STOCK_FAVORED: f64 = 1.5;
pub(crate) const MARKET_STOCK_DISFAVORED: f64 = 0.7;

pub(crate) const TREND_DRIFT_RATIO: f64 = 0.05;
pub(crate) const STABLE_DRIFT_RATIO: f64 = 0.02;
pub(crate) const SUPPLY_WALK_DOWN: f64 = -3.0;
pub(crate) const SUPPLY_WALK_UP: f64 = 5.0;
pub(crate) const DEMAND_WALK: f64 = 3.0;

// Combat --------------------------------------------------------------------
pub(crate) const HEAVY_COST_MULTIPLIER: f64 = 1.5;
pub(crate) const HEAVY_ACCURACY_MULTIPLIER: f64 = 0.8;
pub(crate) const HEAVY_DAMAGE_MULTIPLIER: f64 = 1.5;
pub(crate) const DAMAGE_VARIANCE_MIN: f64 = 0.8;
pub(crate) const DAMAGE_VARIANCE_MAX: f64 = 1.2;
pub(crate) const DEFEND_SHIELD_RESTORE: i32 = 15;
pub(crate) const DEFEND_ENERGY_RESTORE: i32 = 15;
pub(crate) const REPAIR_ENERGY_COST: i32 = 20;
pub(crate) const REPAIR_HULL_RESTORE: i32 = 25;
pub(crate) const ENEMY_RECHARGE: i32 = 20;
pub(crate) const ENEMY_DEFEND_SHIELDS: i32 = 10;
pub(crate) const ENEMY_DEFEND_ENERGY: i32 = 10;
pub(crate) const ENEMY_FLEE_SUCCESS: f64 = 0.3;
pub(crate) const ENEMY_SCALING_BASE: f64 = 0.8;
pub(crate) const ENEMY_SCALING_PER_DANGER: f64 = 0.6;
pub(crate) const ENEMY_DIFFICULTY_DIVISOR: f64 = 50.0;
pub(crate) const ENEMY_DIFFICULTY_SLACK: f64 = 2.0;

// Progression ---------------------------------------------------------------
pub(crate) const REPUTATION_MIN: i32 = -100;
pub(crate) const REPUTATION_MAX: i32 = 100;
pub(crate) const XP_PER_LEVEL: u32 = 100;

// Persistence ---------------------------------------------------------------
pub const SNAPSHOT_VERSION: u32 = 1;
pub(crate) const CHECKSUM_SEED: u64 = 0x4E58_5553;
