use nexus_game::combat::{CombatAction, execute_player_action, generate_enemy, init_combat};
use nexus_game::economy::{MarketListing, Trend};
use nexus_game::{
    Content, EngineConfig, FactionId, GameState, Player, RngBundle, ShipClass, TradeError,
    buy_price, can_buy, generate_market, sell_price, update_market_prices,
};
use proptest::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

fn fresh_player(seed: u64) -> (Content, Player) {
    let content = Content::bundled().unwrap();
    let rngs = RngBundle::from_user_seed(seed);
    let state =
        GameState::new(seed, "Ren", ShipClass::Fighter, &content, &EngineConfig::default(), &rngs)
            .unwrap();
    (content, state.player)
}

fn trend() -> impl Strategy<Value = Trend> {
    prop_oneof![Just(Trend::Rising), Just(Trend::Falling), Just(Trend::Stable)]
}

fn listing() -> impl Strategy<Value = MarketListing> {
    (1u32..5_000, 0u32..400, 0u32..400, trend()).prop_map(|(price, supply, demand, trend)| {
        MarketListing {
            commodity_id: String::from("helium3"),
            price,
            supply,
            demand,
            trend,
        }
    })
}

fn action() -> impl Strategy<Value = CombatAction> {
    prop_oneof![
        Just(CombatAction::Attack),
        Just(CombatAction::HeavyAttack),
        Just(CombatAction::Defend),
        Just(CombatAction::Repair),
        Just(CombatAction::Flee),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prices_stay_positive_through_ticks(seed in any::<u64>(), ticks in 1u64..40) {
        let content = Content::bundled().unwrap();
        let cfg = EngineConfig::default();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        for system in content.systems.iter().filter(|system| system.has_trade_post) {
            let mut market = generate_market(system, &content.commodities, &cfg, &mut rng);
            prop_assert!(market.listings.iter().all(|listing| listing.price >= 1));
            for tick in 1..=ticks {
                market = update_market_prices(&market, &content.commodities, tick, &cfg, &mut rng);
                prop_assert!(market.listings.iter().all(|listing| listing.price >= 1));
            }
        }
    }

    #[test]
    fn spread_favors_the_market(listing in listing(), quantity in 1u32..200) {
        prop_assert!(sell_price(&listing, quantity) <= buy_price(&listing, quantity));
    }

    #[test]
    fn hold_space_is_checked_before_credits(
        listing in listing(),
        used in 0u32..60,
        quantity in 1u32..60,
        credits in 0i64..10_000_000,
    ) {
        let capacity = 60;
        let cargo = if used == 0 {
            Vec::new()
        } else {
            vec![nexus_game::CargoItem { commodity_id: String::from("tritanium_ore"), quantity: used }]
        };
        let verdict = can_buy(credits, &cargo, capacity, &listing, quantity);
        if used + quantity > capacity {
            let over_capacity = matches!(verdict, Err(TradeError::InsufficientCargoSpace { .. }));
            prop_assert!(over_capacity);
        }
    }

    #[test]
    fn reputation_stays_bounded(deltas in prop::collection::vec(-250i32..250, 1..40)) {
        let (_, mut player) = fresh_player(1);
        for delta in deltas {
            let value = player.add_reputation(FactionId::Hegemony, delta);
            prop_assert!((-100..=100).contains(&value));
        }
    }

    #[test]
    fn xp_never_sticks_above_threshold(gains in prop::collection::vec(0u32..5_000, 1..30)) {
        let (_, mut player) = fresh_player(2);
        let mut level = player.level;
        for gain in gains {
            player.add_xp(gain);
            prop_assert!(player.xp < player.level * 100);
            prop_assert!(player.level >= level);
            level = player.level;
        }
    }

    #[test]
    fn combat_never_goes_negative(
        seed in any::<u64>(),
        danger in 0u8..=10,
        actions in prop::collection::vec(action(), 1..80),
    ) {
        let (content, mut player) = fresh_player(seed);
        let cfg = EngineConfig::default();
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let enemy = generate_enemy(danger, None, &content, &mut rng).unwrap();
        let mut state = init_combat(enemy);
        for action in actions {
            let Ok(resolution) = execute_player_action(action, &player.ship, &state, &cfg, &mut rng) else {
                break;
            };
            player.apply_ship_updates(resolution.ship_updates);
            state = resolution.state;
            let enemy = state.enemy.as_ref().unwrap();
            prop_assert!(enemy.hull >= 0 && enemy.shields >= 0);
            prop_assert!(player.ship.hull >= 0 && player.ship.shields >= 0);
            if enemy.hull <= 0 || player.ship.hull <= 0 {
                prop_assert!(state.result.is_terminal());
            }
            if state.result.is_terminal() {
                prop_assert!(!state.active);
                break;
            }
        }
    }

    #[test]
    fn objectives_never_overshoot(trades in prop::collection::vec(-500i64..2_000, 1..20)) {
        let content = Content::bundled().unwrap();
        let rngs = RngBundle::from_user_seed(4);
        let mut state =
            GameState::new(4, "Ren", ShipClass::Trader, &content, &EngineConfig::default(), &rngs)
                .unwrap();
        let GameState { player, story, .. } = &mut state;
        story.on_system_visited("meridian", true, player, &content);
        for credits in trades {
            story.on_trade_completed(credits, player, &content);
            for quest in &story.quests {
                for objective in &quest.objectives {
                    prop_assert!(objective.current <= objective.required);
                    prop_assert_eq!(objective.completed, objective.current >= objective.required);
                }
                if quest.status == nexus_game::QuestStatus::Completed {
                    prop_assert!(quest.objectives_done());
                }
            }
        }
        prop_assert!(player.stats.quests_completed <= 1);
    }
}
