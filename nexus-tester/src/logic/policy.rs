use std::fmt;

use nexus_game::combat::heavy_cost;
use nexus_game::numbers::round_f64_to_i64;
use nexus_game::story::DialogueOption;
use nexus_game::{
    CombatAction, Consequence, EnemyShip, GameEvent, GameSession, Ship, ShipClass, StarSystem,
    buy_price, sell_price,
};
use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha20Rng;

/// Energy the ship's emergency repair action consumes.
const FIELD_REPAIR_ENERGY: i32 = 20;
/// Credits every policy keeps back for fuel and repairs.
const CREDIT_RESERVE: i64 = 150;
/// Docked actions allowed per tick before the pilot moves on.
const DOCKED_ACTIONS_PER_TICK: u32 = 6;

/// One step the autopilot wants to take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PilotAction {
    ChooseDialogue(String),
    ResolveEvent(usize),
    Combat(CombatAction),
    FinishCombat,
    Sell { commodity_id: String, quantity: u32 },
    Buy { commodity_id: String, quantity: u32 },
    Refuel,
    Repair,
    Upgrade(String),
    Travel(String),
    /// Nothing useful is possible.
    Idle,
}

/// Decision hooks for automated play. [`Autopilot`] handles the shared
/// bookkeeping and asks the policy only where strategies differ.
pub trait PilotPolicy {
    /// Name used for logging/debug output.
    fn name(&self) -> &'static str;

    /// Hull the captain starts with.
    fn ship_class(&self) -> ShipClass;

    fn pick_dialogue(&mut self, options: &[&DialogueOption]) -> Option<String> {
        options.first().map(|option| option.id.clone())
    }

    fn pick_event_choice(&mut self, event: &GameEvent) -> usize;

    fn pick_combat_action(&mut self, ship: &Ship, enemy: &EnemyShip) -> CombatAction;

    /// Trading or outfitting while docked. `None` means ready to leave.
    fn plan_docked(&mut self, _session: &GameSession) -> Option<PilotAction> {
        None
    }

    /// Pick a jump target among neighbours the tank can reach.
    fn pick_destination(&mut self, session: &GameSession, reachable: &[&StarSystem]) -> Option<String>;
}

/// Built-in strategies for automated runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GameplayStrategy {
    Trader,
    Explorer,
    Fighter,
}

impl GameplayStrategy {
    pub const ALL: [Self; 3] = [Self::Trader, Self::Explorer, Self::Fighter];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            GameplayStrategy::Trader => "Trader",
            GameplayStrategy::Explorer => "Explorer",
            GameplayStrategy::Fighter => "Fighter",
        }
    }

    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            GameplayStrategy::Trader => "trader",
            GameplayStrategy::Explorer => "explorer",
            GameplayStrategy::Fighter => "fighter",
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            GameplayStrategy::Trader => "Buys cheap goods and sells them at the next trade post",
            GameplayStrategy::Explorer => "Pushes toward unvisited systems and follows the story",
            GameplayStrategy::Fighter => "Outfits at shipyards and hunts in dangerous space",
        }
    }

    /// Parse a `--strategy` value; `all` expands to every strategy.
    #[must_use]
    pub fn parse_list(value: &str) -> Vec<Self> {
        match value {
            "all" => Self::ALL.to_vec(),
            other => Self::ALL
                .into_iter()
                .filter(|strategy| strategy.key() == other)
                .collect(),
        }
    }

    #[must_use]
    pub fn create_policy(self, seed: u64) -> Box<dyn PilotPolicy> {
        let rng = ChaCha20Rng::seed_from_u64(seed);
        match self {
            GameplayStrategy::Trader => Box::new(TraderPolicy { rng }),
            GameplayStrategy::Explorer => Box::new(ExplorerPolicy { rng }),
            GameplayStrategy::Fighter => Box::new(FighterPolicy { rng }),
        }
    }
}

impl fmt::Display for GameplayStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Drives a policy: combat first, then pending story, upkeep, docked
/// business and finally the next jump.
pub struct Autopilot {
    policy: Box<dyn PilotPolicy>,
    docked_tick: u64,
    docked_actions: u32,
    docked_closed: bool,
}

impl Autopilot {
    #[must_use]
    pub fn new(policy: Box<dyn PilotPolicy>) -> Self {
        Self {
            policy,
            docked_tick: 0,
            docked_actions: 0,
            docked_closed: false,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.policy.name()
    }

    #[must_use]
    pub fn ship_class(&self) -> ShipClass {
        self.policy.ship_class()
    }

    /// A refused action ends docked business for the current tick so the
    /// pilot cannot retry the same order forever.
    pub fn note_rejection(&mut self, tick: u64) {
        self.docked_tick = tick;
        self.docked_closed = true;
    }

    pub fn next_action(&mut self, session: &GameSession) -> PilotAction {
        let state = session.state();
        if state.tick != self.docked_tick {
            self.docked_tick = state.tick;
            self.docked_actions = 0;
            self.docked_closed = false;
        }

        if let Some(enemy) = &state.combat.enemy {
            if state.combat.result.is_terminal() {
                return PilotAction::FinishCombat;
            }
            return PilotAction::Combat(self.policy.pick_combat_action(&state.player.ship, enemy));
        }
        if let Some(event) = session.pending_event() {
            return PilotAction::ResolveEvent(self.policy.pick_event_choice(event));
        }
        let options = session.dialogue_options();
        if !options.is_empty()
            && let Some(option_id) = self.policy.pick_dialogue(&options)
        {
            return PilotAction::ChooseDialogue(option_id);
        }
        if let Some(upkeep) = upkeep(session) {
            return upkeep;
        }
        if !self.docked_closed && self.docked_actions < DOCKED_ACTIONS_PER_TICK {
            if let Some(action) = self.policy.plan_docked(session) {
                self.docked_actions += 1;
                return action;
            }
            self.docked_closed = true;
        }

        let reachable = reachable_destinations(session);
        if reachable.is_empty() {
            return if can_afford_refuel(session) {
                PilotAction::Refuel
            } else {
                PilotAction::Idle
            };
        }
        self.policy
            .pick_destination(session, &reachable)
            .map_or(PilotAction::Idle, PilotAction::Travel)
    }
}

fn repair_cost(session: &GameSession) -> i64 {
    let ship = &session.state().player.ship;
    round_f64_to_i64(f64::from(ship.missing_hull()) * session.config().repair_rate)
}

fn refuel_cost(session: &GameSession) -> i64 {
    let ship = &session.state().player.ship;
    round_f64_to_i64(f64::from(ship.missing_fuel()) * session.config().refuel_rate)
}

fn can_afford_refuel(session: &GameSession) -> bool {
    let ship = &session.state().player.ship;
    ship.fuel < ship.max_fuel && refuel_cost(session) <= session.state().player.credits
}

/// Patch the hull below half and top the tank up below forty percent.
fn upkeep(session: &GameSession) -> Option<PilotAction> {
    let player = &session.state().player;
    let ship = &player.ship;
    if ship.hull * 2 < ship.max_hull && repair_cost(session) <= player.credits {
        return Some(PilotAction::Repair);
    }
    if ship.fuel * 5 < ship.max_fuel * 2 && can_afford_refuel(session) {
        return Some(PilotAction::Refuel);
    }
    None
}

fn reachable_destinations(session: &GameSession) -> Vec<&StarSystem> {
    let state = session.state();
    let fuel = u32::try_from(state.player.ship.fuel.max(0)).unwrap_or(0);
    session
        .destinations()
        .into_iter()
        .filter(|system| {
            state
                .galaxy
                .travel_cost(&state.player.current_system, &system.id, session.config())
                .is_some_and(|cost| cost <= fuel)
        })
        .collect()
}

/// Weighted value of a set of consequences.
fn score_consequences(consequences: &[Consequence], credit_weight: i64, xp_weight: i64) -> i64 {
    consequences
        .iter()
        .map(|consequence| match consequence {
            Consequence::Credits { amount } => amount * credit_weight,
            Consequence::Xp { amount } => i64::from(*amount) * xp_weight,
            Consequence::Reputation { delta, .. } => i64::from(*delta) * 5,
            Consequence::Quest { .. } => 50,
            Consequence::Flag { .. } | Consequence::Item { .. } => 0,
        })
        .sum()
}

fn best_choice(event: &GameEvent, credit_weight: i64, xp_weight: i64) -> usize {
    event
        .choices
        .iter()
        .enumerate()
        .max_by_key(|(index, choice)| {
            (
                score_consequences(&choice.consequences, credit_weight, xp_weight),
                std::cmp::Reverse(*index),
            )
        })
        .map_or(0, |(index, _)| index)
}

/// Fight while energy lasts, patch up when low, recharge otherwise.
fn steady_combat(ship: &Ship, flee_below: i32) -> CombatAction {
    if ship.hull * 100 < ship.max_hull * flee_below {
        return CombatAction::Flee;
    }
    if ship.hull * 3 < ship.max_hull && ship.energy >= FIELD_REPAIR_ENERGY {
        return CombatAction::Repair;
    }
    match ship.primary_weapon() {
        Some(weapon) if ship.energy >= weapon.energy_cost => CombatAction::Attack,
        Some(_) => CombatAction::Defend,
        None => CombatAction::Flee,
    }
}

/// Sell everything held wherever it was not bought.
fn sell_elsewhere(session: &GameSession) -> Option<PilotAction> {
    let state = session.state();
    let market = state.current_market()?;
    let here = &state.player.current_system;
    state.player.cargo.iter().find_map(|item| {
        let bought_here = state
            .player
            .trade_history
            .iter()
            .rev()
            .find(|record| record.commodity_id == item.commodity_id)
            .is_some_and(|record| record.system_id == *here);
        let listing = market.listing(&item.commodity_id)?;
        (!bought_here && sell_price(listing, item.quantity) > 0).then(|| PilotAction::Sell {
            commodity_id: item.commodity_id.clone(),
            quantity: item.quantity,
        })
    })
}

struct TraderPolicy {
    rng: ChaCha20Rng,
}

impl TraderPolicy {
    /// The listing furthest below its base price, sized to hold and budget.
    fn cheapest_buy(session: &GameSession) -> Option<PilotAction> {
        let state = session.state();
        let market = state.current_market()?;
        let player = &state.player;
        if !player.cargo.is_empty() {
            return None;
        }
        let budget = player.credits - CREDIT_RESERVE;
        let free = player.ship.cargo_capacity;
        market
            .listings
            .iter()
            .filter_map(|listing| {
                let base = session.content().commodity(&listing.commodity_id)?.base_price;
                let ratio = f64::from(listing.price) / f64::from(base.max(1));
                (ratio < 1.0).then_some((listing, ratio))
            })
            .min_by(|(_, a), (_, b)| a.total_cmp(b))
            .and_then(|(listing, _)| {
                let mut quantity = free.min(listing.supply);
                while quantity > 0 && buy_price(listing, quantity) > budget {
                    quantity -= 1;
                }
                (quantity > 0).then(|| PilotAction::Buy {
                    commodity_id: listing.commodity_id.clone(),
                    quantity,
                })
            })
    }
}

impl PilotPolicy for TraderPolicy {
    fn name(&self) -> &'static str {
        "Trader"
    }

    fn ship_class(&self) -> ShipClass {
        ShipClass::Trader
    }

    fn pick_event_choice(&mut self, event: &GameEvent) -> usize {
        best_choice(event, 3, 1)
    }

    fn pick_combat_action(&mut self, ship: &Ship, _enemy: &EnemyShip) -> CombatAction {
        steady_combat(ship, 50)
    }

    fn plan_docked(&mut self, session: &GameSession) -> Option<PilotAction> {
        sell_elsewhere(session).or_else(|| Self::cheapest_buy(session))
    }

    fn pick_destination(&mut self, _session: &GameSession, reachable: &[&StarSystem]) -> Option<String> {
        let posts: Vec<&&StarSystem> = reachable.iter().filter(|system| system.has_trade_post).collect();
        let pool: Vec<&&StarSystem> = if posts.is_empty() {
            reachable.iter().collect()
        } else {
            posts
        };
        let safest = pool.iter().map(|system| system.danger_level).min()?;
        let calm: Vec<&&StarSystem> = pool
            .into_iter()
            .filter(|system| system.danger_level <= safest.saturating_add(1))
            .collect();
        calm.choose(&mut self.rng).map(|system| system.id.clone())
    }
}

struct ExplorerPolicy {
    rng: ChaCha20Rng,
}

impl PilotPolicy for ExplorerPolicy {
    fn name(&self) -> &'static str {
        "Explorer"
    }

    fn ship_class(&self) -> ShipClass {
        ShipClass::Explorer
    }

    fn pick_event_choice(&mut self, event: &GameEvent) -> usize {
        best_choice(event, 1, 3)
    }

    fn pick_combat_action(&mut self, ship: &Ship, _enemy: &EnemyShip) -> CombatAction {
        if ship.shields == 0 && ship.energy < ship.max_energy / 2 {
            return CombatAction::Defend;
        }
        steady_combat(ship, 30)
    }

    fn plan_docked(&mut self, session: &GameSession) -> Option<PilotAction> {
        sell_elsewhere(session)
    }

    fn pick_destination(&mut self, session: &GameSession, reachable: &[&StarSystem]) -> Option<String> {
        let visited = &session.state().player.visited_systems;
        let fresh: Vec<&&StarSystem> = reachable
            .iter()
            .filter(|system| !visited.contains(&system.id))
            .collect();
        if let Some(system) = fresh.choose(&mut self.rng) {
            return Some(system.id.clone());
        }
        reachable.choose(&mut self.rng).map(|system| system.id.clone())
    }
}

struct FighterPolicy {
    rng: ChaCha20Rng,
}

impl PilotPolicy for FighterPolicy {
    fn name(&self) -> &'static str {
        "Fighter"
    }

    fn ship_class(&self) -> ShipClass {
        ShipClass::Fighter
    }

    fn pick_dialogue(&mut self, options: &[&DialogueOption]) -> Option<String> {
        options.last().map(|option| option.id.clone())
    }

    fn pick_event_choice(&mut self, event: &GameEvent) -> usize {
        best_choice(event, 1, 4)
    }

    fn pick_combat_action(&mut self, ship: &Ship, enemy: &EnemyShip) -> CombatAction {
        if let Some(weapon) = ship.primary_weapon()
            && ship.hull * 3 >= ship.max_hull
            && enemy.shields > 0
            && ship.energy >= heavy_cost(weapon) + weapon.energy_cost
        {
            return CombatAction::HeavyAttack;
        }
        steady_combat(ship, 15)
    }

    /// Buy the first affordable upgrade the local shipyard can fit.
    fn plan_docked(&mut self, session: &GameSession) -> Option<PilotAction> {
        let state = session.state();
        let system = state.current_system()?;
        if !system.has_shipyard {
            return None;
        }
        let ship = &state.player.ship;
        session
            .content()
            .upgrades
            .iter()
            .find(|upgrade| {
                upgrade.required_tech <= system.tech_level
                    && !ship.upgrades.contains(&upgrade.id)
                    && upgrade.cost + CREDIT_RESERVE * 2 <= state.player.credits
            })
            .map(|upgrade| PilotAction::Upgrade(upgrade.id.clone()))
    }

    fn pick_destination(&mut self, _session: &GameSession, reachable: &[&StarSystem]) -> Option<String> {
        let hottest = reachable.iter().map(|system| system.danger_level).max()?;
        let hunting: Vec<&&StarSystem> = reachable
            .iter()
            .filter(|system| system.danger_level.saturating_add(2) >= hottest)
            .collect();
        hunting.choose(&mut self.rng).map(|system| system.id.clone())
    }
}
