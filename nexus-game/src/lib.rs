//! Nexus Chronicles Game Engine
//!
//! Platform-agnostic simulation core for the Nexus Chronicles space trading RPG:
//! galaxy travel, commodity markets, turn-based combat and the quest/dialogue
//! story engine. Rendering and input live elsewhere.

pub mod combat;
pub mod config;
pub mod constants;
pub mod content;
pub mod economy;
pub mod galaxy;
pub mod ledger;
pub mod notify;
pub mod numbers;
pub mod persistence;
pub mod rng;
pub mod session;
pub mod state;
pub mod story;

use log::{info, warn};

// Re-export commonly used types
pub use combat::{
    ActionResolution, CombatAction, CombatError, CombatLogEntry, CombatResult, CombatRewards,
    CombatState, EnemyIntent, EnemyShip, choose_enemy_action, execute_player_action,
    generate_enemy, init_combat, should_encounter,
};
pub use config::{ConfigError, EngineConfig};
pub use content::{
    BundledContent, CommodityDef, Content, ContentError, ContentSources, FactionId, ShipClass,
    ShipWeapon, UpgradeDef,
};
pub use economy::{
    CargoItem, MarketData, MarketListing, TradeError, TradeKind, TradeRecord, Trend, buy_price,
    can_buy, can_sell, execute_buy, execute_sell, generate_market, sell_price,
    update_market_prices,
};
pub use galaxy::{Galaxy, StarSystem, TravelError, WarpTicket};
pub use ledger::{FlagValue, Player, PlayerStats, ReputationTier, Ship, ShipUpdates, ShipyardError};
pub use notify::{Notification, NotificationQueue, NotificationSink, Severity};
pub use persistence::{
    FallbackStore, FileStore, MemoryStore, SaveSlotInfo, SaveStore, Snapshot, StorageError,
};
pub use rng::{RandomProvider, RngBundle};
pub use session::{Arrival, GameSession};
pub use state::GameState;
pub use story::{
    Consequence, DialogueStep, GameEvent, Quest, QuestStatus, StoryError, StoryState,
};

/// Source of the static content tables.
pub trait ContentLoader {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load and validate every content table.
    ///
    /// # Errors
    ///
    /// Returns an error if the content cannot be read or fails validation.
    fn load_content(&self) -> Result<Content, Self::Error>;
}

/// Creates sessions and moves them in and out of save slots.
pub struct GameEngine<L, S>
where
    L: ContentLoader,
    S: SaveStore,
{
    content_loader: L,
    store: S,
    config: EngineConfig,
}

impl<L, S> GameEngine<L, S>
where
    L: ContentLoader,
    S: SaveStore,
{
    /// Create an engine with default tunables.
    pub fn new(content_loader: L, store: S) -> Self {
        Self {
            content_loader,
            store,
            config: EngineConfig::default(),
        }
    }

    /// Create an engine with custom tunables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is out of range.
    pub fn with_config(content_loader: L, store: S, config: EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            content_loader,
            store,
            config,
        })
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Start a new game.
    ///
    /// # Errors
    ///
    /// Returns an error if content cannot be loaded or lacks the starter ship.
    pub fn create_session(
        &self,
        seed: u64,
        player_name: &str,
        class: ShipClass,
    ) -> Result<GameSession, anyhow::Error> {
        let content = self.content_loader.load_content()?;
        Ok(GameSession::new(
            content,
            self.config.clone(),
            seed,
            player_name,
            class,
        )?)
    }

    /// Write the session into `slot`, reporting the outcome to its sink.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the save fails.
    pub fn save<N: NotificationSink>(
        &self,
        session: &mut GameSession<N>,
        slot: &str,
    ) -> Result<(), S::Error> {
        self.write_slot(session, slot, "Game saved.")
    }

    /// Save to the autosave slot if the session asked for it since the last
    /// autosave. Returns whether a save was written.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the save fails.
    pub fn autosave<N: NotificationSink>(&self, session: &mut GameSession<N>) -> Result<bool, S::Error> {
        if !session.take_autosave_request() {
            return Ok(false);
        }
        self.write_slot(session, &self.config.autosave_slot, "Autosaved.")?;
        Ok(true)
    }

    fn write_slot<N: NotificationSink>(
        &self,
        session: &mut GameSession<N>,
        slot: &str,
        done: &str,
    ) -> Result<(), S::Error> {
        let snapshot = Snapshot::capture(session.state());
        match self.store.save(slot, &snapshot) {
            Ok(()) => {
                info!("Saved | slot:{slot} tick:{}", snapshot.state.tick);
                session.notify(done, Severity::Success);
                Ok(())
            }
            Err(err) => {
                warn!("Save failed | slot:{slot} {err}");
                session.notify(format!("Save failed: {err}"), Severity::Danger);
                Err(err)
            }
        }
    }

    /// Load a slot into a fresh session.
    ///
    /// # Errors
    ///
    /// Returns an error if the slot cannot be read or content cannot be loaded.
    pub fn load_session(&self, slot: &str) -> Result<Option<GameSession>, anyhow::Error> {
        let Some(snapshot) = self.store.load(slot)? else {
            return Ok(None);
        };
        let content = self.content_loader.load_content()?;
        info!("Loaded | slot:{slot} tick:{}", snapshot.state.tick);
        Ok(Some(GameSession::from_state(
            content,
            self.config.clone(),
            snapshot.state,
            NotificationQueue::new(),
        )))
    }

    /// Replace a running session's state with a slot. Failures leave the
    /// session untouched and are reported through its sink.
    pub fn load_into<N: NotificationSink>(&self, session: &mut GameSession<N>, slot: &str) -> bool {
        match self.store.load(slot) {
            Ok(Some(snapshot)) => {
                info!("Loaded | slot:{slot} tick:{}", snapshot.state.tick);
                session.replace_state(snapshot.state);
                session.notify("Game loaded.", Severity::Success);
                true
            }
            Ok(None) => {
                session.notify(format!("No save data in slot {slot}."), Severity::Warning);
                false
            }
            Err(err) => {
                warn!("Load failed | slot:{slot} {err}");
                session.notify(format!("Load failed: {err}"), Severity::Danger);
                false
            }
        }
    }

    /// Delete a slot.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the slot cannot be removed.
    pub fn delete(&self, slot: &str) -> Result<(), S::Error> {
        self.store.delete(slot)
    }

    /// List every save slot.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the slots cannot be enumerated.
    pub fn list_saves(&self) -> Result<Vec<SaveSlotInfo>, S::Error> {
        self.store.list()
    }
}
