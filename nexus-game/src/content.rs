//! Static content tables: commodities, factions, the star map, ships, enemies
//! and the story catalog.
//!
//! Content is read-only for the whole lifetime of a session; the simulation
//! looks entries up by id and never mutates them.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ContentLoader;
use crate::galaxy::StarSystem;
use crate::ledger::Ship;
use crate::story::{Chapter, Consequence, GameEvent, Quest};

const COMMODITIES_JSON: &str = include_str!("../assets/data/commodities.json");
const FACTIONS_JSON: &str = include_str!("../assets/data/factions.json");
const GALAXY_JSON: &str = include_str!("../assets/data/galaxy.json");
const SHIPS_JSON: &str = include_str!("../assets/data/ships.json");
const ENEMIES_JSON: &str = include_str!("../assets/data/enemies.json");
const STORY_JSON: &str = include_str!("../assets/data/story.json");

/// Problems found while parsing or cross-checking content tables.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to parse {table}: {source}")]
    Parse {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("duplicate {kind} id `{id}`")]
    Duplicate { kind: &'static str, id: String },
    #[error("{owner} references unknown {kind} `{id}`")]
    UnknownReference {
        owner: String,
        kind: &'static str,
        id: String,
    },
    #[error("connection {from} -> {to} has no return edge")]
    AsymmetricConnection { from: String, to: String },
    #[error("{owner}: {detail}")]
    Invalid { owner: String, detail: String },
}

/// Major powers of the galaxy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FactionId {
    Foundation,
    Hegemony,
    FreeTraders,
    Synthetics,
    VoidRunners,
}

impl FactionId {
    pub const ALL: [Self; 5] = [
        Self::Foundation,
        Self::Hegemony,
        Self::FreeTraders,
        Self::Synthetics,
        Self::VoidRunners,
    ];

    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::Foundation => "foundation",
            Self::Hegemony => "hegemony",
            Self::FreeTraders => "free_traders",
            Self::Synthetics => "synthetics",
            Self::VoidRunners => "void_runners",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactionDef {
    pub id: FactionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub motto: String,
    #[serde(default)]
    pub leader: String,
    pub base_reputation: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommodityCategory {
    RawMaterials,
    Technology,
    Luxury,
    Contraband,
}

/// A tradeable good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommodityDef {
    pub id: String,
    pub name: String,
    pub category: CommodityCategory,
    pub base_price: u32,
    #[serde(default)]
    pub description: String,
    /// Fraction of the base price a listing may deviate by at generation.
    pub volatility: f64,
    /// Factions that tolerate an otherwise illegal good.
    #[serde(default)]
    pub legal_in: Vec<FactionId>,
    #[serde(default)]
    pub illegal: bool,
}

impl CommodityDef {
    /// Whether the good may be stocked openly under the given controlling faction.
    #[must_use]
    pub fn openly_traded_under(&self, faction: Option<FactionId>) -> bool {
        match faction {
            Some(faction) if self.illegal => self.legal_in.contains(&faction),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeaponKind {
    Kinetic,
    Energy,
    Missile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipWeapon {
    pub id: String,
    pub name: String,
    pub damage: i32,
    pub energy_cost: i32,
    /// Hit probability in `[0, 1]`.
    pub accuracy: f64,
    pub kind: WeaponKind,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum ShipClass {
    Scout,
    Trader,
    Fighter,
    Explorer,
}

impl ShipClass {
    pub const ALL: [Self; 4] = [Self::Scout, Self::Trader, Self::Fighter, Self::Explorer];
}

/// Hull layout a new captain starts with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StarterShip {
    pub class: ShipClass,
    pub name: String,
    pub hull: i32,
    pub shields: i32,
    pub energy: i32,
    pub fuel: i32,
    pub cargo_capacity: u32,
    pub speed: i32,
    pub weapons: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeSlot {
    Weapon,
    Shield,
    Engine,
    Cargo,
    Special,
}

/// Ship attribute an upgrade raises.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShipStat {
    MaxShields,
    MaxHull,
    MaxEnergy,
    Speed,
    CargoCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeEffect {
    pub stat: ShipStat,
    pub value: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpgradeDef {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub slot: UpgradeSlot,
    pub cost: i64,
    pub effect: UpgradeEffect,
    pub required_tech: u8,
}

/// Decision policy an enemy follows for the whole battle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AiBehavior {
    Aggressive,
    Defensive,
    #[default]
    Balanced,
    Cowardly,
}

/// Unscaled enemy blueprint; the stats are the danger-zero values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnemyTemplate {
    pub name: String,
    pub hull: i32,
    pub shields: i32,
    pub energy: i32,
    pub weapons: Vec<String>,
    pub credits: i64,
    pub xp: u32,
    #[serde(default)]
    pub faction: Option<FactionId>,
    #[serde(default)]
    pub ai: AiBehavior,
    #[serde(default)]
    pub description: String,
}

impl EnemyTemplate {
    /// Rough toughness rating used to gate templates by system danger.
    #[must_use]
    pub fn difficulty(&self) -> f64 {
        f64::from(self.hull + self.shields) / crate::constants::ENEMY_DIFFICULTY_DIVISOR
    }
}

#[derive(Debug, Clone, Deserialize)]
struct GalaxyTable {
    start_system: String,
    systems: Vec<StarSystem>,
}

#[derive(Debug, Clone, Deserialize)]
struct ShipsTable {
    weapons: Vec<ShipWeapon>,
    starters: Vec<StarterShip>,
    upgrades: Vec<UpgradeDef>,
}

#[derive(Debug, Clone, Deserialize)]
struct StoryTable {
    quests: Vec<Quest>,
    chapters: Vec<Chapter>,
    events: Vec<GameEvent>,
}

/// Raw JSON sources for each content table.
#[derive(Debug, Clone, Copy)]
pub struct ContentSources<'a> {
    pub commodities: &'a str,
    pub factions: &'a str,
    pub galaxy: &'a str,
    pub ships: &'a str,
    pub enemies: &'a str,
    pub story: &'a str,
}

impl ContentSources<'static> {
    /// Tables compiled into the crate.
    #[must_use]
    pub const fn bundled() -> Self {
        Self {
            commodities: COMMODITIES_JSON,
            factions: FACTIONS_JSON,
            galaxy: GALAXY_JSON,
            ships: SHIPS_JSON,
            enemies: ENEMIES_JSON,
            story: STORY_JSON,
        }
    }
}

/// The full read-only catalog a session plays against.
#[derive(Debug, Clone)]
pub struct Content {
    pub commodities: Vec<CommodityDef>,
    pub factions: Vec<FactionDef>,
    pub start_system: String,
    pub systems: Vec<StarSystem>,
    pub weapons: Vec<ShipWeapon>,
    pub starters: Vec<StarterShip>,
    pub upgrades: Vec<UpgradeDef>,
    pub enemies: Vec<EnemyTemplate>,
    pub quests: Vec<Quest>,
    pub chapters: Vec<Chapter>,
    pub events: Vec<GameEvent>,
}

fn parse<T: serde::de::DeserializeOwned>(table: &'static str, json: &str) -> Result<T, ContentError> {
    serde_json::from_str(json).map_err(|source| ContentError::Parse { table, source })
}

impl Content {
    /// Parse and validate the tables compiled into the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if a bundled table is malformed or inconsistent.
    pub fn bundled() -> Result<Self, ContentError> {
        Self::from_sources(ContentSources::bundled())
    }

    /// Parse and validate content from caller-supplied JSON tables.
    ///
    /// # Errors
    ///
    /// Returns an error if any table fails to parse or the tables disagree.
    pub fn from_sources(sources: ContentSources<'_>) -> Result<Self, ContentError> {
        let galaxy: GalaxyTable = parse("galaxy", sources.galaxy)?;
        let ships: ShipsTable = parse("ships", sources.ships)?;
        let story: StoryTable = parse("story", sources.story)?;
        let content = Self {
            commodities: parse("commodities", sources.commodities)?,
            factions: parse("factions", sources.factions)?,
            start_system: galaxy.start_system,
            systems: galaxy.systems,
            weapons: ships.weapons,
            starters: ships.starters,
            upgrades: ships.upgrades,
            enemies: parse("enemies", sources.enemies)?,
            quests: story.quests,
            chapters: story.chapters,
            events: story.events,
        };
        content.validate()?;
        Ok(content)
    }

    #[must_use]
    pub fn commodity(&self, id: &str) -> Option<&CommodityDef> {
        self.commodities.iter().find(|commodity| commodity.id == id)
    }

    #[must_use]
    pub fn faction(&self, id: FactionId) -> Option<&FactionDef> {
        self.factions.iter().find(|faction| faction.id == id)
    }

    #[must_use]
    pub fn weapon(&self, id: &str) -> Option<&ShipWeapon> {
        self.weapons.iter().find(|weapon| weapon.id == id)
    }

    #[must_use]
    pub fn upgrade(&self, id: &str) -> Option<&UpgradeDef> {
        self.upgrades.iter().find(|upgrade| upgrade.id == id)
    }

    #[must_use]
    pub fn system(&self, id: &str) -> Option<&StarSystem> {
        self.systems.iter().find(|system| system.id == id)
    }

    #[must_use]
    pub fn quest(&self, id: &str) -> Option<&Quest> {
        self.quests.iter().find(|quest| quest.id == id)
    }

    #[must_use]
    pub fn chapter(&self, id: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|chapter| chapter.id == id)
    }

    #[must_use]
    pub fn event(&self, id: &str) -> Option<&GameEvent> {
        self.events.iter().find(|event| event.id == id)
    }

    /// Starting reputation for every faction.
    #[must_use]
    pub fn base_reputations(&self) -> BTreeMap<FactionId, i32> {
        FactionId::ALL
            .iter()
            .map(|id| (*id, self.faction(*id).map_or(0, |def| def.base_reputation)))
            .collect()
    }

    /// Build a fresh, fully charged ship for the given class.
    ///
    /// # Errors
    ///
    /// Returns an error if no starter is defined for the class or it arms an unknown weapon.
    pub fn starter_ship(&self, class: ShipClass) -> Result<Ship, ContentError> {
        let starter = self
            .starters
            .iter()
            .find(|starter| starter.class == class)
            .ok_or_else(|| ContentError::UnknownReference {
                owner: String::from("starter ships"),
                kind: "ship class",
                id: format!("{class:?}"),
            })?;
        let weapons = self.resolve_weapons(&starter.name, &starter.weapons)?;
        Ok(Ship {
            name: starter.name.clone(),
            class,
            hull: starter.hull,
            max_hull: starter.hull,
            shields: starter.shields,
            max_shields: starter.shields,
            energy: starter.energy,
            max_energy: starter.energy,
            fuel: starter.fuel,
            max_fuel: starter.fuel,
            cargo_capacity: starter.cargo_capacity,
            weapons,
            upgrades: Vec::new(),
            speed: starter.speed,
        })
    }

    /// Resolve weapon ids to definitions.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first unknown weapon id.
    pub fn resolve_weapons(&self, owner: &str, ids: &[String]) -> Result<Vec<ShipWeapon>, ContentError> {
        ids.iter()
            .map(|id| {
                self.weapon(id)
                    .cloned()
                    .ok_or_else(|| ContentError::UnknownReference {
                        owner: owner.to_string(),
                        kind: "weapon",
                        id: id.clone(),
                    })
            })
            .collect()
    }

    /// Cross-check ids between tables.
    ///
    /// # Errors
    ///
    /// Returns the first inconsistency found.
    pub fn validate(&self) -> Result<(), ContentError> {
        ensure_unique("commodity", self.commodities.iter().map(|c| c.id.as_str()))?;
        ensure_unique("system", self.systems.iter().map(|s| s.id.as_str()))?;
        ensure_unique("weapon", self.weapons.iter().map(|w| w.id.as_str()))?;
        ensure_unique("upgrade", self.upgrades.iter().map(|u| u.id.as_str()))?;
        ensure_unique("quest", self.quests.iter().map(|q| q.id.as_str()))?;
        ensure_unique("event", self.events.iter().map(|e| e.id.as_str()))?;

        for commodity in &self.commodities {
            if !(0.0..=1.0).contains(&commodity.volatility) || commodity.base_price == 0 {
                return Err(ContentError::Invalid {
                    owner: commodity.id.clone(),
                    detail: String::from("volatility must be in [0, 1] and base price positive"),
                });
            }
        }

        self.validate_star_map()?;

        for starter in &self.starters {
            self.resolve_weapons(&starter.name, &starter.weapons)?;
        }
        for template in &self.enemies {
            if template.weapons.is_empty() {
                return Err(ContentError::Invalid {
                    owner: template.name.clone(),
                    detail: String::from("enemy templates need at least one weapon"),
                });
            }
            self.resolve_weapons(&template.name, &template.weapons)?;
        }

        self.validate_story()
    }

    fn validate_star_map(&self) -> Result<(), ContentError> {
        if self.system(&self.start_system).is_none() {
            return Err(ContentError::UnknownReference {
                owner: String::from("galaxy"),
                kind: "start system",
                id: self.start_system.clone(),
            });
        }
        for system in &self.systems {
            for target in &system.connections {
                let Some(other) = self.system(target) else {
                    return Err(ContentError::UnknownReference {
                        owner: system.id.clone(),
                        kind: "system",
                        id: target.clone(),
                    });
                };
                if !other.connections.contains(&system.id) {
                    return Err(ContentError::AsymmetricConnection {
                        from: system.id.clone(),
                        to: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn validate_story(&self) -> Result<(), ContentError> {
        for chapter in &self.chapters {
            for quest_id in &chapter.quests {
                self.expect_quest(&format!("chapter {}", chapter.id), quest_id)?;
            }
            let node_ids: BTreeSet<&str> = chapter.intro_dialogue.iter().map(|n| n.id.as_str()).collect();
            for node in &chapter.intro_dialogue {
                for option in &node.options {
                    if let Some(next) = &option.next_node_id
                        && !node_ids.contains(next.as_str())
                    {
                        return Err(ContentError::UnknownReference {
                            owner: format!("dialogue option {}", option.id),
                            kind: "dialogue node",
                            id: next.clone(),
                        });
                    }
                    self.validate_consequences(&option.id, &option.consequences)?;
                }
            }
        }
        for quest in &self.quests {
            if quest.objectives.iter().any(|objective| objective.required == 0) {
                return Err(ContentError::Invalid {
                    owner: quest.id.clone(),
                    detail: String::from("objectives must require at least one unit of progress"),
                });
            }
            self.validate_consequences(&quest.id, &quest.rewards)?;
        }
        for event in &self.events {
            if event.choices.is_empty() {
                return Err(ContentError::Invalid {
                    owner: event.id.clone(),
                    detail: String::from("events need at least one choice"),
                });
            }
            for choice in &event.choices {
                self.validate_consequences(&event.id, &choice.consequences)?;
            }
        }
        Ok(())
    }

    fn validate_consequences(&self, owner: &str, consequences: &[Consequence]) -> Result<(), ContentError> {
        for consequence in consequences {
            if let Consequence::Quest { quest_id } = consequence {
                self.expect_quest(owner, quest_id)?;
            }
        }
        Ok(())
    }

    fn expect_quest(&self, owner: &str, quest_id: &str) -> Result<(), ContentError> {
        if self.quest(quest_id).is_none() {
            return Err(ContentError::UnknownReference {
                owner: owner.to_string(),
                kind: "quest",
                id: quest_id.to_string(),
            });
        }
        Ok(())
    }
}

fn ensure_unique<'a>(kind: &'static str, ids: impl Iterator<Item = &'a str>) -> Result<(), ContentError> {
    let mut seen = BTreeSet::new();
    for id in ids {
        if !seen.insert(id) {
            return Err(ContentError::Duplicate {
                kind,
                id: id.to_string(),
            });
        }
    }
    Ok(())
}

/// Loader serving the tables compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledContent;

impl ContentLoader for BundledContent {
    type Error = ContentError;

    fn load_content(&self) -> Result<Content, Self::Error> {
        Content::bundled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_content_validates() {
        let content = Content::bundled().unwrap();
        assert_eq!(content.commodities.len(), 12);
        assert_eq!(content.factions.len(), 5);
        assert!(content.system(&content.start_system).is_some());
    }

    #[test]
    fn contraband_is_open_only_where_legalized() {
        let content = Content::bundled().unwrap();
        let stims = content.commodity("combat_stims").unwrap();
        assert!(stims.openly_traded_under(Some(FactionId::VoidRunners)));
        assert!(!stims.openly_traded_under(Some(FactionId::Hegemony)));
        assert!(stims.openly_traded_under(None));
        let ore = content.commodity("tritanium_ore").unwrap();
        assert!(ore.openly_traded_under(Some(FactionId::Hegemony)));
    }

    #[test]
    fn starter_ships_are_fully_charged() {
        let content = Content::bundled().unwrap();
        for class in ShipClass::ALL {
            let ship = content.starter_ship(class).unwrap();
            assert_eq!(ship.hull, ship.max_hull);
            assert_eq!(ship.fuel, ship.max_fuel);
            assert!(!ship.weapons.is_empty());
        }
    }

    #[test]
    fn asymmetric_connections_are_rejected() {
        let galaxy = r#"{
            "start_system": "a",
            "systems": [
                { "id": "a", "name": "A", "star_type": "yellow_dwarf", "coordinates": { "x": 0.0, "y": 0.0 },
                  "danger_level": 1, "tech_level": 5, "connections": ["b"] },
                { "id": "b", "name": "B", "star_type": "red_giant", "coordinates": { "x": 10.0, "y": 0.0 },
                  "danger_level": 1, "tech_level": 5, "connections": [] }
            ]
        }"#;
        let sources = ContentSources {
            galaxy,
            ..ContentSources::bundled()
        };
        let err = Content::from_sources(sources).unwrap_err();
        assert!(matches!(err, ContentError::AsymmetricConnection { ref from, .. } if from == "a"));
    }

    #[test]
    fn malformed_table_names_its_source() {
        let sources = ContentSources {
            enemies: "{ not json",
            ..ContentSources::bundled()
        };
        let err = Content::from_sources(sources).unwrap_err();
        assert!(err.to_string().starts_with("failed to parse enemies"));
    }
}
