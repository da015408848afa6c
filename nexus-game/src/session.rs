//! A running game: the root state plus the content, tunables and random
//! streams every operation needs.
//!
//! Each public operation either applies fully or is rejected with a typed
//! reason and no mutation. Outcomes and rejections are reported to the
//! session's [`NotificationSink`].

use log::{debug, info, warn};

use crate::combat::{
    CombatAction, CombatError, CombatResult, CombatState, execute_player_action, generate_enemy,
    init_combat, should_encounter,
};
use crate::config::EngineConfig;
use crate::content::{Content, ContentError, ShipClass};
use crate::economy::{
    TradeError, TradeKind, TradeRecord, buy_price, can_buy, can_sell, execute_buy, execute_sell,
    sell_price,
};
use crate::galaxy::{StarSystem, TravelError, WarpTicket};
use crate::ledger::ShipyardError;
use crate::notify::{Notification, NotificationQueue, NotificationSink, Severity};
use crate::numbers::round_f64_to_i32;
use crate::rng::RngBundle;
use crate::state::GameState;
use crate::story::{DialogueOption, DialogueStep, EventRequest, GameEvent, QuestStatus, StoryError};

/// What happened when a jump was committed. Exactly one per arrival.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arrival {
    /// A story event is now pending.
    Event { event_id: String },
    /// Hostile contact; combat is active.
    Combat { enemy: String },
    Quiet,
}

/// Progress markers compared before and after story-affecting operations.
struct ProgressMark {
    chapter: u32,
    level: u32,
    completed: Vec<String>,
}

pub struct GameSession<N = NotificationQueue> {
    content: Content,
    config: EngineConfig,
    rngs: RngBundle,
    state: GameState,
    sink: N,
    autosave_requested: bool,
}

impl GameSession<NotificationQueue> {
    /// Start a new game that buffers its notifications.
    ///
    /// # Errors
    ///
    /// Returns an error if the content has no starter for `class`.
    pub fn new(
        content: Content,
        config: EngineConfig,
        seed: u64,
        player_name: &str,
        class: ShipClass,
    ) -> Result<Self, ContentError> {
        Self::with_sink(content, config, seed, player_name, class, NotificationQueue::new())
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.sink.drain()
    }
}

impl<N: NotificationSink> GameSession<N> {
    /// Start a new game reporting to `sink`. The chapter one briefing opens at once.
    ///
    /// # Errors
    ///
    /// Returns an error if the content has no starter for `class`.
    pub fn with_sink(
        content: Content,
        config: EngineConfig,
        seed: u64,
        player_name: &str,
        class: ShipClass,
        sink: N,
    ) -> Result<Self, ContentError> {
        let rngs = RngBundle::from_user_seed(seed);
        let mut state = GameState::new(seed, player_name, class, &content, &config, &rngs)?;
        state.story.start_chapter_dialogue(&content);
        info!("New game | seed:{seed} captain:{player_name} class:{class:?}");
        let mut session = Self {
            content,
            config,
            rngs,
            state,
            sink,
            autosave_requested: false,
        };
        session.notify(
            format!("Welcome aboard, Captain {player_name}."),
            Severity::Success,
        );
        Ok(session)
    }

    /// Resume from restored state. Random streams are rebuilt from seed and tick.
    #[must_use]
    pub fn from_state(content: Content, config: EngineConfig, state: GameState, sink: N) -> Self {
        let rngs = RngBundle::resume(state.seed, state.tick);
        Self {
            content,
            config,
            rngs,
            state,
            sink,
            autosave_requested: false,
        }
    }

    /// Swap in restored state, keeping content, tunables and sink.
    pub fn replace_state(&mut self, state: GameState) {
        self.rngs = RngBundle::resume(state.seed, state.tick);
        self.state = state;
        self.autosave_requested = false;
    }

    #[must_use]
    pub const fn state(&self) -> &GameState {
        &self.state
    }

    /// Mutate state directly, bypassing validation.
    pub fn with_state_mut<R>(&mut self, f: impl FnOnce(&mut GameState) -> R) -> R {
        f(&mut self.state)
    }

    #[must_use]
    pub const fn content(&self) -> &Content {
        &self.content
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub const fn rngs(&self) -> &RngBundle {
        &self.rngs
    }

    #[must_use]
    pub const fn sink(&self) -> &N {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut N {
        &mut self.sink
    }

    #[must_use]
    pub fn into_state(self) -> GameState {
        self.state
    }

    pub fn notify(&mut self, message: impl Into<String>, severity: Severity) {
        self.sink.notify(message.into(), severity, self.state.tick);
    }

    /// Whether an autosave was requested since the last call. Clears the request.
    pub fn take_autosave_request(&mut self) -> bool {
        std::mem::take(&mut self.autosave_requested)
    }

    /// Discovered neighbours of the current system.
    #[must_use]
    pub fn destinations(&self) -> Vec<&StarSystem> {
        self.state.galaxy.connections(&self.state.player.current_system)
    }

    #[must_use]
    pub fn dialogue_options(&self) -> Vec<&DialogueOption> {
        self.state
            .story
            .available_options(&self.content, &self.state.player)
    }

    #[must_use]
    pub fn pending_event(&self) -> Option<&GameEvent> {
        self.state.story.pending_event(&self.content)
    }

    // Travel

    /// Validate a jump, burn its fuel and put the ship in transit.
    ///
    /// # Errors
    ///
    /// Rejects jumps while in transit or in combat, along missing routes and
    /// without enough fuel. A rejected jump changes nothing.
    pub fn begin_travel(&mut self, destination: &str) -> Result<WarpTicket, TravelError> {
        let ticket = match self.plan_travel(destination) {
            Ok(ticket) => ticket,
            Err(err) => {
                warn!("Jump rejected | {} -> {destination}: {err}", self.state.player.current_system);
                self.notify(format!("Cannot jump: {err}"), Severity::Warning);
                return Err(err);
            }
        };
        let player = &mut self.state.player;
        player.ship.fuel -= ticket.fuel_cost;
        player.stats.distance_traveled += ticket.distance;
        self.state.pending_warp = Some(ticket.clone());
        debug!(
            "Warp started | {} -> {} fuel:{} distance:{:.1}",
            ticket.from, ticket.to, ticket.fuel_cost, ticket.distance
        );
        Ok(ticket)
    }

    fn plan_travel(&self, destination: &str) -> Result<WarpTicket, TravelError> {
        if self.state.pending_warp.is_some() {
            return Err(TravelError::InTransit);
        }
        if self.state.combat.active || self.state.combat.enemy.is_some() {
            return Err(TravelError::InCombat);
        }
        self.state.galaxy.plan_jump(
            &self.state.player.current_system,
            destination,
            self.state.player.ship.fuel,
            &self.config,
        )
    }

    /// Commit the pending jump: arrive, discover, tick the markets, advance
    /// the story, then roll for an event and, failing that, an encounter.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError::NoPendingWarp`] when no jump is in progress.
    pub fn complete_travel(&mut self) -> Result<Arrival, TravelError> {
        let Some(ticket) = self.state.pending_warp.take() else {
            return Err(TravelError::NoPendingWarp);
        };
        let mark = self.progress_mark();
        let destination = ticket.to;

        let first_visit = self.state.player.set_current_system(&destination);
        let discovered = self.state.galaxy.discover_connected(
            &destination,
            &self.content,
            &self.config,
            &mut *self.rngs.market(),
        );
        self.state.tick += 1;
        self.state.galaxy.tick_markets(
            self.state.tick,
            &self.content,
            &self.config,
            &mut *self.rngs.market(),
        );
        self.state.story.on_system_visited(
            &destination,
            first_visit,
            &mut self.state.player,
            &self.content,
        );
        info!(
            "Arrived | {destination} tick:{} first_visit:{first_visit} discovered:{}",
            self.state.tick,
            discovered.len()
        );

        let (danger_level, faction, name) = self
            .state
            .galaxy
            .system(&destination)
            .map_or((0, None, destination.clone()), |system| {
                (system.danger_level, system.faction, system.name.clone())
            });
        self.notify(format!("Arrived at {name}."), Severity::Info);
        for system_id in &discovered {
            let label = self
                .state
                .galaxy
                .system(system_id)
                .map_or_else(|| system_id.clone(), |system| system.name.clone());
            self.notify(format!("Discovered {label}."), Severity::Info);
        }
        self.announce_progress(&mark);

        let request = EventRequest {
            danger_level,
            faction,
            player: &self.state.player,
        };
        let event = self
            .state
            .story
            .try_random_event(&request, &self.content, &self.config, &mut *self.rngs.story())
            .map(|event| (event.id.clone(), event.title.clone()));
        if let Some((event_id, title)) = event {
            self.notify(format!("Event: {title}"), Severity::Info);
            return Ok(Arrival::Event { event_id });
        }

        if should_encounter(danger_level, &self.config, &mut *self.rngs.encounter()) {
            let rolled = generate_enemy(danger_level, None, &self.content, &mut *self.rngs.encounter());
            match rolled {
                Ok(enemy) => {
                    let enemy_name = enemy.name.clone();
                    self.state.combat = init_combat(enemy);
                    self.notify(format!("Hostile contact: {enemy_name}!"), Severity::Danger);
                    return Ok(Arrival::Combat { enemy: enemy_name });
                }
                Err(err) => warn!("Encounter skipped | {err}"),
            }
        }

        self.autosave_requested = true;
        Ok(Arrival::Quiet)
    }

    /// Jump and arrive in one step.
    ///
    /// # Errors
    ///
    /// Same as [`Self::begin_travel`].
    pub fn travel(&mut self, destination: &str) -> Result<Arrival, TravelError> {
        self.begin_travel(destination)?;
        self.complete_travel()
    }

    // Trade

    /// Buy from the local market. Returns the credits paid.
    ///
    /// # Errors
    ///
    /// Rejects the purchase without side effects when there is no market, the
    /// good is not listed, or hold space, credits or supply fall short.
    pub fn buy(&mut self, commodity_id: &str, quantity: u32) -> Result<i64, TradeError> {
        let mark = self.progress_mark();
        match self.try_buy(commodity_id, quantity) {
            Ok(cost) => {
                let name = self.commodity_name(commodity_id);
                self.notify(format!("Bought {quantity} {name} for {cost} CR."), Severity::Success);
                self.announce_progress(&mark);
                Ok(cost)
            }
            Err(err) => {
                self.notify(format!("Purchase refused: {err}"), Severity::Warning);
                Err(err)
            }
        }
    }

    fn try_buy(&mut self, commodity_id: &str, quantity: u32) -> Result<i64, TradeError> {
        let system_id = self.state.player.current_system.clone();
        let listing = self
            .state
            .galaxy
            .market(&system_id)
            .ok_or_else(|| TradeError::NoMarket(system_id.clone()))?
            .listing(commodity_id)
            .ok_or_else(|| TradeError::NotListed(commodity_id.to_string()))?;
        let player = &self.state.player;
        can_buy(
            player.credits,
            &player.cargo,
            player.ship.cargo_capacity,
            listing,
            quantity,
        )?;
        let cost = buy_price(listing, quantity);
        let price_per_unit = listing.price;

        let player = &mut self.state.player;
        player.add_credits(-cost);
        player.cargo = execute_buy(&player.cargo, commodity_id, quantity);
        self.state
            .galaxy
            .apply_trade_delta(&system_id, commodity_id, -i64::from(quantity));
        self.commit_trade(commodity_id, quantity, price_per_unit, system_id, TradeKind::Buy, cost);
        Ok(cost)
    }

    /// Sell to the local market. Returns the credits received.
    ///
    /// # Errors
    ///
    /// Rejects the sale without side effects when there is no market, the good
    /// is not listed here, or the hold does not carry enough of it.
    pub fn sell(&mut self, commodity_id: &str, quantity: u32) -> Result<i64, TradeError> {
        let mark = self.progress_mark();
        match self.try_sell(commodity_id, quantity) {
            Ok(revenue) => {
                let name = self.commodity_name(commodity_id);
                self.notify(format!("Sold {quantity} {name} for {revenue} CR."), Severity::Success);
                self.announce_progress(&mark);
                Ok(revenue)
            }
            Err(err) => {
                self.notify(format!("Sale refused: {err}"), Severity::Warning);
                Err(err)
            }
        }
    }

    fn try_sell(&mut self, commodity_id: &str, quantity: u32) -> Result<i64, TradeError> {
        let system_id = self.state.player.current_system.clone();
        let listing = self
            .state
            .galaxy
            .market(&system_id)
            .ok_or_else(|| TradeError::NoMarket(system_id.clone()))?
            .listing(commodity_id)
            .ok_or_else(|| TradeError::NotListed(commodity_id.to_string()))?;
        can_sell(&self.state.player.cargo, commodity_id, quantity)?;
        let revenue = sell_price(listing, quantity);
        let price_per_unit = listing.price;

        let player = &mut self.state.player;
        player.add_credits(revenue);
        player.cargo = execute_sell(&player.cargo, commodity_id, quantity);
        self.state
            .galaxy
            .apply_trade_delta(&system_id, commodity_id, i64::from(quantity));
        self.commit_trade(commodity_id, quantity, price_per_unit, system_id, TradeKind::Sell, revenue);
        Ok(revenue)
    }

    fn commit_trade(
        &mut self,
        commodity_id: &str,
        quantity: u32,
        price_per_unit: u32,
        system_id: String,
        kind: TradeKind,
        credits: i64,
    ) {
        self.state.player.record_trade(TradeRecord {
            commodity_id: commodity_id.to_string(),
            quantity,
            price_per_unit,
            system_id,
            kind,
            tick: self.state.tick,
        });
        debug!("Trade | {kind:?} {quantity}x{commodity_id} credits:{credits}");
        self.state
            .story
            .on_trade_completed(credits, &mut self.state.player, &self.content);
    }

    fn commodity_name(&self, commodity_id: &str) -> String {
        self.content
            .commodity(commodity_id)
            .map_or_else(|| commodity_id.to_string(), |commodity| commodity.name.clone())
    }

    // Shipyard

    /// Fill the tank. Returns the credits paid.
    ///
    /// # Errors
    ///
    /// Rejects the refuel when it is unaffordable.
    pub fn refuel(&mut self) -> Result<i64, ShipyardError> {
        let result = self.state.player.refuel(self.config.refuel_rate);
        self.report_shipyard(&result, "Ship refueled");
        result
    }

    /// Restore hull and shields. Returns the credits paid.
    ///
    /// # Errors
    ///
    /// Rejects the repair when the hull is intact or the bill is unaffordable.
    pub fn repair(&mut self) -> Result<i64, ShipyardError> {
        let result = self.state.player.repair(self.config.repair_rate);
        self.report_shipyard(&result, "Ship repaired");
        result
    }

    /// Fit an upgrade at the local shipyard.
    ///
    /// # Errors
    ///
    /// Rejects unknown upgrades, systems without a shipyard or with too little
    /// tech, duplicates and unaffordable upgrades.
    pub fn install_upgrade(&mut self, upgrade_id: &str) -> Result<(), ShipyardError> {
        let result = self.try_install(upgrade_id);
        match &result {
            Ok(()) => {
                let name = self
                    .content
                    .upgrade(upgrade_id)
                    .map_or_else(|| upgrade_id.to_string(), |upgrade| upgrade.name.clone());
                self.notify(format!("Installed {name}."), Severity::Success);
            }
            Err(err) => self.notify(format!("Shipyard refused: {err}"), Severity::Warning),
        }
        result
    }

    fn try_install(&mut self, upgrade_id: &str) -> Result<(), ShipyardError> {
        let upgrade = self
            .content
            .upgrade(upgrade_id)
            .ok_or_else(|| ShipyardError::UnknownUpgrade(upgrade_id.to_string()))?;
        let current = &self.state.player.current_system;
        let system = self
            .state
            .galaxy
            .system(current)
            .filter(|system| system.has_shipyard)
            .ok_or_else(|| ShipyardError::NoShipyard(current.clone()))?;
        if system.tech_level < upgrade.required_tech {
            return Err(ShipyardError::TechLevelTooLow {
                required: upgrade.required_tech,
                available: system.tech_level,
            });
        }
        self.state.player.install_upgrade(upgrade)
    }

    fn report_shipyard(&mut self, result: &Result<i64, ShipyardError>, done: &str) {
        match result {
            Ok(cost) => self.notify(format!("{done} for {cost} CR."), Severity::Success),
            Err(err) => self.notify(format!("Shipyard refused: {err}"), Severity::Warning),
        }
    }

    // Combat

    /// Pick a fight with a named template in the current system.
    ///
    /// # Errors
    ///
    /// Fails while another battle is on or when no enemy can be built.
    pub fn engage(&mut self, template: Option<&str>) -> Result<(), CombatError> {
        if self.state.combat.enemy.is_some() {
            return Err(CombatError::AlreadyActive);
        }
        let danger_level = self
            .state
            .current_system()
            .map_or(0, |system| system.danger_level);
        let enemy = generate_enemy(danger_level, template, &self.content, &mut *self.rngs.encounter())?;
        let name = enemy.name.clone();
        self.state.combat = init_combat(enemy);
        self.notify(format!("Hostile contact: {name}!"), Severity::Danger);
        Ok(())
    }

    /// Resolve one combat round. A decided battle pays out or is scored at once.
    ///
    /// # Errors
    ///
    /// Rejects actions when no battle is running.
    pub fn combat_action(&mut self, action: CombatAction) -> Result<CombatResult, CombatError> {
        let resolution = execute_player_action(
            action,
            &self.state.player.ship,
            &self.state.combat,
            &self.config,
            &mut *self.rngs.combat(),
        )?;
        self.state.player.apply_ship_updates(resolution.ship_updates);
        self.state.combat = resolution.state;

        let result = self.state.combat.result;
        let enemy_name = self
            .state
            .combat
            .enemy
            .as_ref()
            .map(|enemy| enemy.name.clone())
            .unwrap_or_default();
        match result {
            CombatResult::Victory { retreated } => {
                let stats = &mut self.state.player.stats;
                stats.combats_won = stats.combats_won.saturating_add(1);
                let rewards = self.state.combat.rewards(&self.config);
                let mut levels = 0;
                if let Some(rewards) = rewards {
                    self.state.player.add_credits(rewards.credits);
                    levels = self.state.player.add_xp(rewards.xp);
                    let verb = if retreated { "retreated" } else { "destroyed" };
                    self.notify(
                        format!(
                            "{enemy_name} {verb}. +{} CR, +{} XP.",
                            rewards.credits, rewards.xp
                        ),
                        Severity::Success,
                    );
                }
                if levels > 0 {
                    let level = self.state.player.level;
                    self.notify(format!("Level up! Now level {level}."), Severity::Success);
                }
            }
            CombatResult::Defeat => {
                let stats = &mut self.state.player.stats;
                stats.combats_lost = stats.combats_lost.saturating_add(1);
                self.notify(format!("Defeated by {enemy_name}."), Severity::Danger);
            }
            CombatResult::Fled => self.notify("Escaped the battle.", Severity::Info),
            CombatResult::Pending => {}
        }
        Ok(result)
    }

    /// Close a decided battle: apply the defeat penalty or credit story
    /// objectives, then clear combat and request an autosave.
    ///
    /// # Errors
    ///
    /// Fails when there is no battle or it is still undecided.
    pub fn finish_combat(&mut self) -> Result<CombatResult, CombatError> {
        if self.state.combat.enemy.is_none() {
            return Err(CombatError::NotActive);
        }
        let result = self.state.combat.result;
        if !result.is_terminal() {
            return Err(CombatError::Unresolved);
        }
        let mark = self.progress_mark();
        match result {
            CombatResult::Defeat => {
                let ship = &mut self.state.player.ship;
                ship.hull = round_f64_to_i32(f64::from(ship.max_hull) * self.config.defeat_hull_ratio);
                ship.shields = 0;
                let hull = ship.hull;
                let penalty = self
                    .state
                    .player
                    .apply_credit_penalty(self.config.defeat_credit_penalty);
                self.notify(
                    format!("Emergency systems restored {hull} hull. Lost {penalty} CR."),
                    Severity::Danger,
                );
            }
            CombatResult::Victory { .. } => {
                self.state
                    .story
                    .on_combat_won(&mut self.state.player, &self.content);
            }
            CombatResult::Fled | CombatResult::Pending => {}
        }
        self.announce_progress(&mark);
        self.state.combat = CombatState::default();
        self.autosave_requested = true;
        Ok(result)
    }

    // Story

    /// Pick a dialogue option on the open node.
    ///
    /// # Errors
    ///
    /// Rejects unknown or unavailable options without side effects.
    pub fn select_dialogue_option(&mut self, option_id: &str) -> Result<DialogueStep, StoryError> {
        let mark = self.progress_mark();
        let result = self.state.story.select_dialogue_option(
            option_id,
            &mut self.state.player,
            &self.content,
        );
        match &result {
            Ok(_) => self.announce_progress(&mark),
            Err(err) => self.notify(format!("Cannot choose that: {err}"), Severity::Warning),
        }
        result
    }

    /// Resolve the pending event. Returns the outcome text.
    ///
    /// # Errors
    ///
    /// Rejects out-of-range choices and calls without a pending event.
    pub fn resolve_event(&mut self, choice_index: usize) -> Result<String, StoryError> {
        let mark = self.progress_mark();
        let result =
            self.state
                .story
                .resolve_event(choice_index, &mut self.state.player, &self.content);
        match &result {
            Ok(outcome) => {
                let outcome = outcome.clone();
                self.notify(outcome, Severity::Info);
                self.announce_progress(&mark);
            }
            Err(err) => self.notify(format!("Cannot choose that: {err}"), Severity::Warning),
        }
        result
    }

    fn progress_mark(&self) -> ProgressMark {
        ProgressMark {
            chapter: self.state.story.chapter,
            level: self.state.player.level,
            completed: self
                .state
                .story
                .completed_quests()
                .map(|quest| quest.id.clone())
                .collect(),
        }
    }

    fn announce_progress(&mut self, mark: &ProgressMark) {
        let finished: Vec<String> = self
            .state
            .story
            .quests
            .iter()
            .filter(|quest| quest.status == QuestStatus::Completed && !mark.completed.contains(&quest.id))
            .map(|quest| quest.title.clone())
            .collect();
        for title in finished {
            self.notify(format!("Quest completed: {title}"), Severity::Success);
        }
        if self.state.player.level > mark.level {
            let level = self.state.player.level;
            self.notify(format!("Level up! Now level {level}."), Severity::Success);
        }
        if self.state.story.chapter > mark.chapter {
            let chapter = self.state.story.chapter;
            let title = self
                .content
                .chapter(chapter)
                .map_or_else(String::new, |chapter| chapter.title.clone());
            info!("Chapter advanced | {chapter}");
            self.notify(format!("Chapter {chapter}: {title}"), Severity::Success);
        }
    }
}
