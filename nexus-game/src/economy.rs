//! Market generation, price drift and trade quotes.
use log::{debug, warn};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::constants::{
    DANGER_DISCOUNT, DANGER_DISCOUNT_GOODS, DEMAND_WALK, HIGH_DANGER_LEVEL, HIGH_TECH_DISCOUNT,
    HIGH_TECH_DISCOUNT_GOODS, HIGH_TECH_LEVEL, LOW_DANGER_LEVEL, LOW_TECH_LEVEL, LOW_TECH_PREMIUM,
    LOW_TECH_PREMIUM_GOODS, MARKET_STOCK_DISFAVORED, MARKET_STOCK_FAVORED, MARKET_STOCK_MAX,
    MARKET_STOCK_MIN, MIN_LISTING_PRICE, OVERSUPPLY_DEMAND_THRESHOLD, OVERSUPPLY_SELL_RATIO,
    RAW_MATERIAL_GOODS, RAW_MATERIAL_HIGH_TECH, RAW_MATERIAL_LOW_TECH, RAW_MATERIAL_TECH_CUTOFF,
    SAFE_LUXURY_PREMIUM, SAFE_LUXURY_PREMIUM_GOODS, SCARCITY_SUPPLY_THRESHOLD, SCARCITY_SURCHARGE,
    STABLE_DRIFT_RATIO, STANDARD_SELL_RATIO, SUPPLY_WALK_DOWN, SUPPLY_WALK_UP, TREND_DRIFT_RATIO,
};
use crate::content::CommodityDef;
use crate::galaxy::StarSystem;
use crate::numbers::{round_f64_to_i64, round_f64_to_u32};
use crate::rng::RandomProvider;

/// Reasons a trade is refused. A refused trade changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TradeError {
    #[error("insufficient cargo space: {requested} units requested, {free} free")]
    InsufficientCargoSpace { requested: u32, free: u32 },
    #[error("insufficient credits: {cost} CR required, {available} CR available")]
    InsufficientCredits { cost: i64, available: i64 },
    #[error("insufficient supply: {requested} units requested, {available} on offer")]
    InsufficientSupply { requested: u32, available: u32 },
    #[error("insufficient cargo: {requested} units requested, {held} held")]
    InsufficientCargo { requested: u32, held: u32 },
    #[error("trade quantity must be positive")]
    ZeroQuantity,
    #[error("no trade post at {0}")]
    NoMarket(String),
    #[error("{0} is not traded here")]
    NotListed(String),
}

/// Sticky direction bias applied to price drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Rising,
    Falling,
    Stable,
}

impl Trend {
    pub const ALL: [Self; 3] = [Self::Rising, Self::Falling, Self::Stable];

    fn roll<R: Rng + ?Sized>(rng: &mut R) -> Self {
        rng.random_choice(&Self::ALL).copied().unwrap_or(Self::Stable)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketListing {
    pub commodity_id: String,
    pub price: u32,
    pub supply: u32,
    pub demand: u32,
    pub trend: Trend,
}

/// Market of a single trade-capable system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketData {
    pub system_id: String,
    pub listings: Vec<MarketListing>,
    /// Tick of the last price update.
    pub last_updated: u64,
}

impl MarketData {
    #[must_use]
    pub fn listing(&self, commodity_id: &str) -> Option<&MarketListing> {
        self.listings.iter().find(|listing| listing.commodity_id == commodity_id)
    }

    pub fn listing_mut(&mut self, commodity_id: &str) -> Option<&mut MarketListing> {
        self.listings
            .iter_mut()
            .find(|listing| listing.commodity_id == commodity_id)
    }
}

/// A stack of one commodity in the hold. Quantity is always positive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CargoItem {
    pub commodity_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeKind {
    Buy,
    Sell,
}

/// Entry of the append-only trade history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub commodity_id: String,
    pub quantity: u32,
    pub price_per_unit: u32,
    pub system_id: String,
    pub kind: TradeKind,
    pub tick: u64,
}

/// Composite local price multiplier for a commodity.
///
/// Three independent rules stack: technology goods are cheap in high-tech
/// systems and dear in low-tech ones, combat goods are cheap where danger is
/// high while luxuries cost more in safe space, and raw materials are cheap
/// wherever industry is primitive.
#[must_use]
pub fn price_modifier(system: &StarSystem, commodity_id: &str) -> f64 {
    let mut modifier = 1.0;

    if system.tech_level >= HIGH_TECH_LEVEL && HIGH_TECH_DISCOUNT_GOODS.contains(&commodity_id) {
        modifier *= HIGH_TECH_DISCOUNT;
    }
    if system.tech_level <= LOW_TECH_LEVEL && LOW_TECH_PREMIUM_GOODS.contains(&commodity_id) {
        modifier *= LOW_TECH_PREMIUM;
    }

    if system.danger_level >= HIGH_DANGER_LEVEL && DANGER_DISCOUNT_GOODS.contains(&commodity_id) {
        modifier *= DANGER_DISCOUNT;
    }
    if system.danger_level <= LOW_DANGER_LEVEL && SAFE_LUXURY_PREMIUM_GOODS.contains(&commodity_id) {
        modifier *= SAFE_LUXURY_PREMIUM;
    }

    if RAW_MATERIAL_GOODS.contains(&commodity_id) {
        modifier *= if system.tech_level <= RAW_MATERIAL_TECH_CUTOFF {
            RAW_MATERIAL_LOW_TECH
        } else {
            RAW_MATERIAL_HIGH_TECH
        };
    }

    modifier
}

/// Build the opening market of a trade system.
pub fn generate_market<R: Rng + ?Sized>(
    system: &StarSystem,
    commodities: &[CommodityDef],
    cfg: &EngineConfig,
    rng: &mut R,
) -> MarketData {
    let mut listings = Vec::with_capacity(commodities.len());
    for commodity in commodities {
        if !commodity.openly_traded_under(system.faction) && !rng.random_chance(cfg.contraband_chance) {
            continue;
        }
        let modifier = price_modifier(system, &commodity.id);
        let base = f64::from(commodity.base_price);
        let spread = base * commodity.volatility;
        let price = round_f64_to_u32(base * modifier + rng.random_float(-spread, spread))
            .max(MIN_LISTING_PRICE);

        let supply_bias = if modifier < 1.0 {
            MARKET_STOCK_FAVORED
        } else {
            MARKET_STOCK_DISFAVORED
        };
        let demand_bias = if modifier > 1.0 {
            MARKET_STOCK_FAVORED
        } else {
            MARKET_STOCK_DISFAVORED
        };
        let supply =
            round_f64_to_u32(rng.random_float(MARKET_STOCK_MIN, MARKET_STOCK_MAX) * supply_bias);
        let demand =
            round_f64_to_u32(rng.random_float(MARKET_STOCK_MIN, MARKET_STOCK_MAX) * demand_bias);

        listings.push(MarketListing {
            commodity_id: commodity.id.clone(),
            price,
            supply,
            demand,
            trend: Trend::roll(rng),
        });
    }

    debug!(
        "Market generated | system:{} listings:{}",
        system.id,
        listings.len()
    );

    MarketData {
        system_id: system.id.clone(),
        listings,
        last_updated: 0,
    }
}

/// Advance a market by one tick: drift prices along their trends, random-walk
/// stock levels and occasionally re-roll trends.
#[must_use]
pub fn update_market_prices<R: Rng + ?Sized>(
    market: &MarketData,
    commodities: &[CommodityDef],
    tick: u64,
    cfg: &EngineConfig,
    rng: &mut R,
) -> MarketData {
    let listings = market
        .listings
        .iter()
        .map(|listing| {
            let Some(commodity) = commodities.iter().find(|c| c.id == listing.commodity_id) else {
                warn!(
                    "Market {} lists unknown commodity {}; leaving it untouched",
                    market.system_id, listing.commodity_id
                );
                return listing.clone();
            };
            let base = f64::from(commodity.base_price);
            let drift = match listing.trend {
                Trend::Rising => rng.random_float(0.0, base * TREND_DRIFT_RATIO),
                Trend::Falling => rng.random_float(-base * TREND_DRIFT_RATIO, 0.0),
                Trend::Stable => {
                    rng.random_float(-base * STABLE_DRIFT_RATIO, base * STABLE_DRIFT_RATIO)
                }
            };

            let supply_change = if listing.supply > 0 {
                round_f64_to_i64(rng.random_float(SUPPLY_WALK_DOWN, SUPPLY_WALK_UP))
            } else {
                round_f64_to_i64(rng.random_float(0.0, SUPPLY_WALK_UP))
            };
            let demand_change = round_f64_to_i64(rng.random_float(-DEMAND_WALK, DEMAND_WALK));

            let trend = if rng.random_chance(cfg.trend_flip_chance) {
                Trend::roll(rng)
            } else {
                listing.trend
            };

            MarketListing {
                commodity_id: listing.commodity_id.clone(),
                price: round_f64_to_u32(f64::from(listing.price) + drift).max(MIN_LISTING_PRICE),
                supply: shift_stock(listing.supply, supply_change),
                demand: shift_stock(listing.demand, demand_change),
                trend,
            }
        })
        .collect();

    MarketData {
        system_id: market.system_id.clone(),
        listings,
        last_updated: tick,
    }
}

/// Apply a signed stock delta, flooring at zero.
#[must_use]
pub fn shift_stock(current: u32, delta: i64) -> u32 {
    let shifted = i64::from(current).saturating_add(delta).max(0);
    u32::try_from(shifted).unwrap_or(u32::MAX)
}

/// Total cost of buying `quantity` units, with a surcharge when stock is scarce.
#[must_use]
pub fn buy_price(listing: &MarketListing, quantity: u32) -> i64 {
    let surcharge = if listing.supply < SCARCITY_SUPPLY_THRESHOLD {
        SCARCITY_SURCHARGE
    } else {
        1.0
    };
    round_f64_to_i64(f64::from(listing.price) * f64::from(quantity) * surcharge)
}

/// Total revenue from selling `quantity` units. Always at or below the buy price.
#[must_use]
pub fn sell_price(listing: &MarketListing, quantity: u32) -> i64 {
    let ratio = if listing.demand < OVERSUPPLY_DEMAND_THRESHOLD {
        OVERSUPPLY_SELL_RATIO
    } else {
        STANDARD_SELL_RATIO
    };
    round_f64_to_i64(f64::from(listing.price) * f64::from(quantity) * ratio)
}

#[must_use]
pub fn cargo_used(cargo: &[CargoItem]) -> u32 {
    cargo.iter().map(|item| item.quantity).sum()
}

#[must_use]
pub fn cargo_held(cargo: &[CargoItem], commodity_id: &str) -> u32 {
    cargo
        .iter()
        .find(|item| item.commodity_id == commodity_id)
        .map_or(0, |item| item.quantity)
}

/// Check a purchase against hold space, then credits, then market supply.
///
/// # Errors
///
/// Returns the first constraint the purchase violates.
pub fn can_buy(
    credits: i64,
    cargo: &[CargoItem],
    cargo_capacity: u32,
    listing: &MarketListing,
    quantity: u32,
) -> Result<(), TradeError> {
    if quantity == 0 {
        return Err(TradeError::ZeroQuantity);
    }
    let used = cargo_used(cargo);
    if used.saturating_add(quantity) > cargo_capacity {
        return Err(TradeError::InsufficientCargoSpace {
            requested: quantity,
            free: cargo_capacity.saturating_sub(used),
        });
    }
    let cost = buy_price(listing, quantity);
    if cost > credits {
        return Err(TradeError::InsufficientCredits {
            cost,
            available: credits,
        });
    }
    if quantity > listing.supply {
        return Err(TradeError::InsufficientSupply {
            requested: quantity,
            available: listing.supply,
        });
    }
    Ok(())
}

/// Check a sale against what is actually in the hold.
///
/// # Errors
///
/// Returns an error for zero quantities or when selling more than is held.
pub fn can_sell(cargo: &[CargoItem], commodity_id: &str, quantity: u32) -> Result<(), TradeError> {
    if quantity == 0 {
        return Err(TradeError::ZeroQuantity);
    }
    let held = cargo_held(cargo, commodity_id);
    if quantity > held {
        return Err(TradeError::InsufficientCargo {
            requested: quantity,
            held,
        });
    }
    Ok(())
}

/// Merge purchased goods into the hold.
#[must_use]
pub fn execute_buy(cargo: &[CargoItem], commodity_id: &str, quantity: u32) -> Vec<CargoItem> {
    let mut next = cargo.to_vec();
    if let Some(stack) = next.iter_mut().find(|item| item.commodity_id == commodity_id) {
        stack.quantity = stack.quantity.saturating_add(quantity);
    } else {
        next.push(CargoItem {
            commodity_id: commodity_id.to_string(),
            quantity,
        });
    }
    next
}

/// Remove sold goods from the hold, pruning emptied stacks.
#[must_use]
pub fn execute_sell(cargo: &[CargoItem], commodity_id: &str, quantity: u32) -> Vec<CargoItem> {
    cargo
        .iter()
        .map(|item| {
            if item.commodity_id == commodity_id {
                CargoItem {
                    commodity_id: item.commodity_id.clone(),
                    quantity: item.quantity.saturating_sub(quantity),
                }
            } else {
                item.clone()
            }
        })
        .filter(|item| item.quantity > 0)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::Content;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn listing(price: u32, supply: u32, demand: u32) -> MarketListing {
        MarketListing {
            commodity_id: String::from("tritanium_ore"),
            price,
            supply,
            demand,
            trend: Trend::Stable,
        }
    }

    fn system(id: &str) -> StarSystem {
        Content::bundled().unwrap().system(id).cloned().unwrap()
    }

    #[test]
    fn modifiers_stack_by_rule() {
        let mut crystallis = system("crystallis");
        crystallis.tech_level = 10;
        crystallis.danger_level = 3;
        assert!((price_modifier(&crystallis, "positronic_cores") - 0.7).abs() < 1e-9);
        assert!((price_modifier(&crystallis, "tritanium_ore") - 1.2).abs() < 1e-9);
        assert!((price_modifier(&crystallis, "void_silk") - 1.0).abs() < 1e-9);

        let mut dustfall = system("dustfall");
        dustfall.tech_level = 2;
        dustfall.danger_level = 8;
        assert!((price_modifier(&dustfall, "quantum_processors") - 1.5).abs() < 1e-9);
        assert!((price_modifier(&dustfall, "combat_stims") - 0.8).abs() < 1e-9);
        assert!((price_modifier(&dustfall, "helium3") - 0.6).abs() < 1e-9);

        let mut safe = system("sol_tertius");
        safe.danger_level = 1;
        assert!((price_modifier(&safe, "nebula_wine") - 1.3).abs() < 1e-9);
    }

    #[test]
    fn generated_prices_and_stock_are_bounded() {
        let content = Content::bundled().unwrap();
        let cfg = EngineConfig::default();
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        for system in content.systems.iter().filter(|s| s.has_trade_post) {
            let market = generate_market(system, &content.commodities, &cfg, &mut rng);
            assert_eq!(market.system_id, system.id);
            assert!(market.listings.iter().all(|l| l.price >= 1));
            assert!(market.listings.iter().all(|l| l.supply <= 75 && l.demand <= 75));
        }
    }

    #[test]
    fn contraband_never_stocked_when_chance_is_zero() {
        let content = Content::bundled().unwrap();
        let cfg = EngineConfig {
            contraband_chance: 0.0,
            ..EngineConfig::default()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let kepler = system("kepler_station");
        let market = generate_market(&kepler, &content.commodities, &cfg, &mut rng);
        assert!(market.listing("combat_stims").is_none());
        assert!(market.listing("neural_hackers").is_none());
        assert_eq!(market.listings.len(), 10);

        let dustfall = system("dustfall");
        let market = generate_market(&dustfall, &content.commodities, &cfg, &mut rng);
        assert!(market.listing("combat_stims").is_some());
    }

    #[test]
    fn rising_trend_never_lowers_price() {
        let content = Content::bundled().unwrap();
        let cfg = EngineConfig {
            trend_flip_chance: 0.0,
            ..EngineConfig::default()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let mut market = MarketData {
            system_id: String::from("nexus_prime"),
            listings: vec![MarketListing {
                trend: Trend::Rising,
                ..listing(50, 20, 20)
            }],
            last_updated: 0,
        };
        for tick in 1..=30 {
            let previous = market.listings[0].price;
            market = update_market_prices(&market, &content.commodities, tick, &cfg, &mut rng);
            assert!(market.listings[0].price >= previous);
            assert_eq!(market.listings[0].trend, Trend::Rising);
            assert_eq!(market.last_updated, tick);
        }
    }

    #[test]
    fn unknown_listing_is_left_alone() {
        let content = Content::bundled().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let market = MarketData {
            system_id: String::from("nexus_prime"),
            listings: vec![MarketListing {
                commodity_id: String::from("mystery_goo"),
                ..listing(10, 0, 0)
            }],
            last_updated: 0,
        };
        let next = update_market_prices(&market, &content.commodities, 3, &EngineConfig::default(), &mut rng);
        assert_eq!(next.listings, market.listings);
    }

    #[test]
    fn quotes_apply_scarcity_and_oversupply() {
        assert_eq!(buy_price(&listing(50, 20, 20), 5), 250);
        assert_eq!(buy_price(&listing(50, 9, 20), 5), 275);
        assert_eq!(sell_price(&listing(50, 20, 20), 4), 190);
        assert_eq!(sell_price(&listing(50, 20, 9), 4), 170);
    }

    #[test]
    fn can_buy_checks_space_then_credits_then_supply() {
        let full_hold = vec![CargoItem {
            commodity_id: String::from("helium3"),
            quantity: 18,
        }];
        assert_eq!(
            can_buy(1_000_000, &full_hold, 20, &listing(50, 100, 20), 3),
            Err(TradeError::InsufficientCargoSpace {
                requested: 3,
                free: 2
            })
        );
        assert_eq!(
            can_buy(100, &[], 20, &listing(50, 1, 20), 5),
            Err(TradeError::InsufficientCredits {
                cost: 275,
                available: 100
            })
        );
        assert_eq!(
            can_buy(10_000, &[], 20, &listing(50, 4, 20), 5),
            Err(TradeError::InsufficientSupply {
                requested: 5,
                available: 4
            })
        );
        assert_eq!(can_buy(1_000, &[], 20, &listing(50, 20, 20), 5), Ok(()));
        assert_eq!(
            can_buy(1_000, &[], 20, &listing(50, 20, 20), 0),
            Err(TradeError::ZeroQuantity)
        );
    }

    #[test]
    fn buy_merges_and_sell_prunes() {
        let cargo = execute_buy(&[], "helium3", 4);
        let cargo = execute_buy(&cargo, "helium3", 3);
        let cargo = execute_buy(&cargo, "void_silk", 1);
        assert_eq!(cargo.len(), 2);
        assert_eq!(cargo_held(&cargo, "helium3"), 7);

        assert_eq!(
            can_sell(&cargo, "void_silk", 2),
            Err(TradeError::InsufficientCargo {
                requested: 2,
                held: 1
            })
        );
        let cargo = execute_sell(&cargo, "void_silk", 1);
        assert_eq!(cargo.len(), 1);
        assert_eq!(cargo_used(&cargo), 7);
    }

    #[test]
    fn stock_shift_floors_at_zero() {
        assert_eq!(shift_stock(2, -5), 0);
        assert_eq!(shift_stock(2, 5), 7);
    }
}
