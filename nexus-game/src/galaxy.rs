//! Star map, discovery and per-system markets.
use std::collections::BTreeMap;

use log::{debug, info};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::content::{Content, FactionId};
use crate::economy::{MarketData, generate_market, shift_stock, update_market_prices};
use crate::numbers::round_f64_to_u32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarType {
    YellowDwarf,
    RedGiant,
    BlueGiant,
    WhiteDwarf,
    NeutronStar,
    BinaryStar,
    Pulsar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanetType {
    Terrestrial,
    GasGiant,
    IceWorld,
    Volcanic,
    Ocean,
    Desert,
    ArtificialHabitat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Planet {
    pub id: String,
    pub name: String,
    pub kind: PlanetType,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub population: u64,
    #[serde(default)]
    pub has_station: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

impl Coordinates {
    /// Euclidean distance in map units.
    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// A node of the star map. Only `discovered` changes after initialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarSystem {
    pub id: String,
    pub name: String,
    pub star_type: StarType,
    pub coordinates: Coordinates,
    #[serde(default)]
    pub planets: Vec<Planet>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub faction: Option<FactionId>,
    /// 0-10
    pub danger_level: u8,
    /// 1-10
    pub tech_level: u8,
    pub connections: Vec<String>,
    #[serde(default)]
    pub discovered: bool,
    #[serde(default)]
    pub has_trade_post: bool,
    #[serde(default)]
    pub has_shipyard: bool,
    #[serde(default)]
    pub lore: String,
}

impl StarSystem {
    #[must_use]
    pub fn is_connected_to(&self, other: &str) -> bool {
        self.connections.iter().any(|id| id == other)
    }
}

/// Reasons a jump is refused. A refused jump changes nothing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TravelError {
    #[error("unknown system {0}")]
    UnknownSystem(String),
    #[error("no route from {from} to {to}")]
    NoRoute { from: String, to: String },
    #[error("not enough fuel: need {required}, have {available}")]
    InsufficientFuel { required: i32, available: i32 },
    #[error("a warp is already in progress")]
    InTransit,
    #[error("cannot jump during combat")]
    InCombat,
    #[error("no warp is pending")]
    NoPendingWarp,
}

/// A jump that has been paid for but not yet committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarpTicket {
    pub from: String,
    pub to: String,
    pub fuel_cost: i32,
    pub distance: f64,
}

/// Mutable galaxy state: systems plus the markets of discovered trade posts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Galaxy {
    pub systems: Vec<StarSystem>,
    pub markets: BTreeMap<String, MarketData>,
}

impl Galaxy {
    /// Copy the star map out of content and open markets where discovered.
    pub fn from_content<R: Rng + ?Sized>(content: &Content, cfg: &EngineConfig, rng: &mut R) -> Self {
        let mut galaxy = Self {
            systems: content.systems.clone(),
            markets: BTreeMap::new(),
        };
        for system in galaxy.systems.iter().filter(|s| s.discovered && s.has_trade_post) {
            let market = generate_market(system, &content.commodities, cfg, rng);
            galaxy.markets.insert(system.id.clone(), market);
        }
        galaxy.discover_connected(&content.start_system, content, cfg, rng);
        galaxy
    }

    #[must_use]
    pub fn system(&self, id: &str) -> Option<&StarSystem> {
        self.systems.iter().find(|system| system.id == id)
    }

    #[must_use]
    pub fn market(&self, system_id: &str) -> Option<&MarketData> {
        self.markets.get(system_id)
    }

    #[must_use]
    pub fn discovered_systems(&self) -> Vec<&StarSystem> {
        self.systems.iter().filter(|system| system.discovered).collect()
    }

    /// Discovered neighbours of a system.
    #[must_use]
    pub fn connections(&self, system_id: &str) -> Vec<&StarSystem> {
        self.system(system_id)
            .map(|system| {
                system
                    .connections
                    .iter()
                    .filter_map(|id| self.system(id))
                    .filter(|neighbour| neighbour.discovered)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Map distance between two systems.
    #[must_use]
    pub fn distance(&self, from: &str, to: &str) -> Option<f64> {
        let from = self.system(from)?;
        let to = self.system(to)?;
        Some(from.coordinates.distance_to(to.coordinates))
    }

    /// Fuel needed for a jump, `round(distance / divisor)`.
    #[must_use]
    pub fn travel_cost(&self, from: &str, to: &str, cfg: &EngineConfig) -> Option<u32> {
        self.distance(from, to)
            .map(|distance| round_f64_to_u32(distance / cfg.fuel_distance_divisor))
    }

    /// Validate a jump along an existing edge and price it in fuel.
    ///
    /// # Errors
    ///
    /// Fails for unknown systems, missing connections and empty tanks.
    pub fn plan_jump(
        &self,
        from: &str,
        to: &str,
        fuel: i32,
        cfg: &EngineConfig,
    ) -> Result<WarpTicket, TravelError> {
        let origin = self
            .system(from)
            .ok_or_else(|| TravelError::UnknownSystem(from.to_string()))?;
        let destination = self
            .system(to)
            .ok_or_else(|| TravelError::UnknownSystem(to.to_string()))?;
        if !origin.is_connected_to(to) {
            return Err(TravelError::NoRoute {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        let distance = origin.coordinates.distance_to(destination.coordinates);
        let fuel_cost = i32::try_from(round_f64_to_u32(distance / cfg.fuel_distance_divisor))
            .unwrap_or(i32::MAX);
        if fuel < fuel_cost {
            return Err(TravelError::InsufficientFuel {
                required: fuel_cost,
                available: fuel,
            });
        }
        Ok(WarpTicket {
            from: from.to_string(),
            to: to.to_string(),
            fuel_cost,
            distance,
        })
    }

    /// Mark a system discovered, opening its market on first discovery.
    /// Returns true if the system was newly discovered.
    pub fn discover_system<R: Rng + ?Sized>(
        &mut self,
        system_id: &str,
        content: &Content,
        cfg: &EngineConfig,
        rng: &mut R,
    ) -> bool {
        let Some(system) = self.systems.iter_mut().find(|system| system.id == system_id) else {
            return false;
        };
        if system.discovered {
            return false;
        }
        system.discovered = true;
        info!("System discovered | {}", system.id);
        if system.has_trade_post && !self.markets.contains_key(system_id) {
            let market = generate_market(system, &content.commodities, cfg, rng);
            self.markets.insert(system_id.to_string(), market);
        }
        true
    }

    /// Discover every neighbour of a system. Returns the newly discovered ids.
    pub fn discover_connected<R: Rng + ?Sized>(
        &mut self,
        system_id: &str,
        content: &Content,
        cfg: &EngineConfig,
        rng: &mut R,
    ) -> Vec<String> {
        let neighbours = self
            .system(system_id)
            .map(|system| system.connections.clone())
            .unwrap_or_default();
        neighbours
            .into_iter()
            .filter(|id| self.discover_system(id, content, cfg, rng))
            .collect()
    }

    /// Advance every open market by one tick.
    pub fn tick_markets<R: Rng + ?Sized>(
        &mut self,
        tick: u64,
        content: &Content,
        cfg: &EngineConfig,
        rng: &mut R,
    ) {
        for market in self.markets.values_mut() {
            *market = update_market_prices(market, &content.commodities, tick, cfg, rng);
        }
        debug!("Markets ticked | tick:{} markets:{}", tick, self.markets.len());
    }

    /// Apply a signed supply change after a trade.
    pub fn apply_trade_delta(&mut self, system_id: &str, commodity_id: &str, delta: i64) {
        if let Some(listing) = self
            .markets
            .get_mut(system_id)
            .and_then(|market| market.listing_mut(commodity_id))
        {
            listing.supply = shift_stock(listing.supply, delta);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn fresh() -> (Content, Galaxy, ChaCha20Rng) {
        let content = Content::bundled().unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(2024);
        let galaxy = Galaxy::from_content(&content, &EngineConfig::default(), &mut rng);
        (content, galaxy, rng)
    }

    #[test]
    fn only_discovered_trade_posts_have_markets() {
        let (_, galaxy, _) = fresh();
        for system in &galaxy.systems {
            assert_eq!(
                galaxy.market(&system.id).is_some(),
                system.discovered && system.has_trade_post,
                "{}",
                system.id
            );
        }
        assert!(galaxy.market("crystallis").is_none());
    }

    #[test]
    fn discovery_opens_market_once() {
        let (content, mut galaxy, mut rng) = fresh();
        let cfg = EngineConfig::default();
        let newly = galaxy.discover_connected("meridian", &content, &cfg, &mut rng);
        assert!(newly.contains(&String::from("crystallis")));
        assert!(newly.contains(&String::from("observatory")));
        assert!(galaxy.market("crystallis").is_some());
        assert!(!galaxy.discover_system("crystallis", &content, &cfg, &mut rng));
        assert!(galaxy.discover_connected("meridian", &content, &cfg, &mut rng).is_empty());
    }

    #[test]
    fn travel_cost_rounds_distance() {
        let (_, galaxy, _) = fresh();
        let cfg = EngineConfig::default();
        // (500,500) -> (620,430): distance 138.9
        assert_eq!(galaxy.travel_cost("nexus_prime", "meridian", &cfg), Some(7));
        assert_eq!(galaxy.travel_cost("nexus_prime", "nowhere", &cfg), None);
        // (620,430) -> (700,280): exactly 170, half a unit rounds up
        assert_eq!(galaxy.travel_cost("meridian", "observatory", &cfg), Some(9));
    }

    #[test]
    fn jumps_need_an_edge_and_fuel() {
        let (_, galaxy, _) = fresh();
        let cfg = EngineConfig::default();
        let ticket = galaxy.plan_jump("nexus_prime", "meridian", 100, &cfg).unwrap();
        assert_eq!(ticket.fuel_cost, 7);
        assert!((ticket.distance - 138.92).abs() < 0.01);
        assert_eq!(
            galaxy.plan_jump("nexus_prime", "terminus", 100, &cfg),
            Err(TravelError::NoRoute {
                from: String::from("nexus_prime"),
                to: String::from("terminus"),
            })
        );
        assert_eq!(
            galaxy.plan_jump("nexus_prime", "meridian", 6, &cfg),
            Err(TravelError::InsufficientFuel {
                required: 7,
                available: 6,
            })
        );
        assert!(matches!(
            galaxy.plan_jump("nexus_prime", "nowhere", 100, &cfg),
            Err(TravelError::UnknownSystem(_))
        ));
    }

    #[test]
    fn connections_list_discovered_neighbours_only() {
        let (_, galaxy, _) = fresh();
        let names: Vec<&str> = galaxy
            .connections("meridian")
            .iter()
            .map(|system| system.id.as_str())
            .collect();
        assert_eq!(names, vec!["nexus_prime"]);
    }

    #[test]
    fn trade_delta_floors_supply() {
        let (_, mut galaxy, _) = fresh();
        let supply = galaxy.market("nexus_prime").unwrap().listings[0].supply;
        let commodity = galaxy.market("nexus_prime").unwrap().listings[0].commodity_id.clone();
        galaxy.apply_trade_delta("nexus_prime", &commodity, -i64::from(supply) - 10);
        assert_eq!(galaxy.market("nexus_prime").unwrap().listings[0].supply, 0);
        galaxy.apply_trade_delta("nexus_prime", &commodity, 4);
        assert_eq!(galaxy.market("nexus_prime").unwrap().listings[0].supply, 4);
    }
}
