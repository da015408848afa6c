//! Random arrival events.
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};

use super::{Consequence, StoryError, StoryState};
use crate::config::EngineConfig;
use crate::content::{Content, FactionId};
use crate::ledger::Player;
use crate::rng::RandomProvider;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Encounter,
    Discovery,
    Distress,
    Anomaly,
    Market,
    Story,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventChoice {
    pub text: String,
    #[serde(default)]
    pub consequences: Vec<Consequence>,
    pub outcome: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventCondition {
    pub min_danger: Option<u8>,
    pub max_danger: Option<u8>,
    /// Destination must be controlled by this faction.
    pub faction: Option<FactionId>,
    /// Flag that must be truthy.
    pub flag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: String,
    pub title: String,
    pub description: String,
    pub kind: EventKind,
    pub choices: Vec<EventChoice>,
    #[serde(default)]
    pub condition: Option<EventCondition>,
}

/// Where the player just arrived.
#[derive(Debug, Clone, Copy)]
pub struct EventRequest<'a> {
    pub danger_level: u8,
    pub faction: Option<FactionId>,
    pub player: &'a Player,
}

impl EventCondition {
    fn admits(&self, request: &EventRequest<'_>, story: &StoryState) -> bool {
        if self.min_danger.is_some_and(|min| request.danger_level < min) {
            return false;
        }
        if self.max_danger.is_some_and(|max| request.danger_level > max) {
            return false;
        }
        if let Some(faction) = self.faction
            && request.faction != Some(faction)
        {
            return false;
        }
        self.flag
            .as_deref()
            .is_none_or(|flag| story.flag_is_set(flag, request.player))
    }
}

impl StoryState {
    /// Events that could fire for this arrival.
    #[must_use]
    pub fn eligible_events<'c>(&self, request: &EventRequest<'_>, content: &'c Content) -> Vec<&'c GameEvent> {
        content
            .events
            .iter()
            .filter(|event| !self.completed_events.contains(&event.id))
            .filter(|event| {
                event
                    .condition
                    .as_ref()
                    .is_none_or(|condition| condition.admits(request, self))
            })
            .collect()
    }

    /// Roll for an arrival event and make it pending.
    ///
    /// Nothing is rolled while another event is still pending.
    pub fn try_random_event<'c, R: Rng + ?Sized>(
        &mut self,
        request: &EventRequest<'_>,
        content: &'c Content,
        cfg: &EngineConfig,
        rng: &mut R,
    ) -> Option<&'c GameEvent> {
        if self.active_event.is_some() {
            return None;
        }
        if !rng.random_chance(cfg.event_chance) {
            return None;
        }
        let eligible = self.eligible_events(request, content);
        let event = rng.random_choice(&eligible).copied()?;
        debug!("Event triggered | {} danger:{}", event.id, request.danger_level);
        self.active_event = Some(event.id.clone());
        Some(event)
    }

    #[must_use]
    pub fn pending_event<'c>(&self, content: &'c Content) -> Option<&'c GameEvent> {
        self.active_event
            .as_deref()
            .and_then(|event_id| content.event(event_id))
    }

    /// Resolve the pending event with one of its choices and return the outcome text.
    ///
    /// # Errors
    ///
    /// Fails without side effects when no event is pending or the index is out of range.
    pub fn resolve_event(
        &mut self,
        choice_index: usize,
        player: &mut Player,
        content: &Content,
    ) -> Result<String, StoryError> {
        let Some(event_id) = self.active_event.clone() else {
            return Err(StoryError::NoActiveEvent);
        };
        let event = content
            .event(&event_id)
            .ok_or_else(|| StoryError::UnknownEvent(event_id.clone()))?;
        let choice = event.choices.get(choice_index).ok_or(StoryError::InvalidChoice {
            index: choice_index,
            count: event.choices.len(),
        })?;

        self.active_event = None;
        self.completed_events.push(event_id);
        self.apply_consequences(&choice.consequences, player, content);
        Ok(choice.outcome.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::tests::fixture;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn always() -> EngineConfig {
        EngineConfig {
            event_chance: 1.0,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn danger_and_faction_conditions_filter() {
        let (content, player, story) = fixture();
        let calm = EventRequest {
            danger_level: 1,
            faction: Some(FactionId::FreeTraders),
            player: &player,
        };
        let ids: Vec<&str> = story
            .eligible_events(&calm, &content)
            .iter()
            .map(|event| event.id.as_str())
            .collect();
        assert!(!ids.contains(&"evt_pirate_ambush"));
        assert!(!ids.contains(&"evt_hegemony_patrol"));
        assert!(!ids.contains(&"evt_archive_core"));
        assert!(ids.contains(&"evt_distress_signal"));

        let patrolled = EventRequest {
            danger_level: 5,
            faction: Some(FactionId::Hegemony),
            player: &player,
        };
        let ids: Vec<&str> = story
            .eligible_events(&patrolled, &content)
            .iter()
            .map(|event| event.id.as_str())
            .collect();
        assert!(ids.contains(&"evt_pirate_ambush"));
        assert!(ids.contains(&"evt_hegemony_patrol"));
    }

    #[test]
    fn flag_condition_unlocks_story_event() {
        let (content, mut player, story) = fixture();
        player.set_flag("selene_meeting", true.into());
        let deep = EventRequest {
            danger_level: 8,
            faction: None,
            player: &player,
        };
        assert!(
            story
                .eligible_events(&deep, &content)
                .iter()
                .any(|event| event.id == "evt_archive_core")
        );
    }

    #[test]
    fn resolved_events_never_return() {
        let (content, mut player, mut story) = fixture();
        let mut rng = ChaCha20Rng::seed_from_u64(12);
        let arrival = player.clone();
        let request = EventRequest {
            danger_level: 3,
            faction: None,
            player: &arrival,
        };
        let first = story
            .try_random_event(&request, &content, &always(), &mut rng)
            .unwrap()
            .id
            .clone();
        // Pending event blocks further rolls.
        assert!(story.try_random_event(&request, &content, &always(), &mut rng).is_none());

        let outcome = story.resolve_event(0, &mut player, &content).unwrap();
        assert!(!outcome.is_empty());
        assert!(story.active_event.is_none());
        assert!(story.completed_events.contains(&first));
        assert!(
            !story
                .eligible_events(&request, &content)
                .iter()
                .any(|event| event.id == first)
        );
    }

    #[test]
    fn bad_choice_keeps_event_pending() {
        let (content, mut player, mut story) = fixture();
        story.active_event = Some(String::from("evt_nebula_storm"));
        let before = player.clone();
        assert_eq!(
            story.resolve_event(9, &mut player, &content),
            Err(StoryError::InvalidChoice { index: 9, count: 2 })
        );
        assert_eq!(story.active_event.as_deref(), Some("evt_nebula_storm"));
        assert_eq!(player, before);
        story.active_event = None;
        assert_eq!(
            story.resolve_event(0, &mut player, &content),
            Err(StoryError::NoActiveEvent)
        );
    }

    #[test]
    fn zero_chance_never_fires() {
        let (content, player, mut story) = fixture();
        let mut rng = ChaCha20Rng::seed_from_u64(13);
        let cfg = EngineConfig {
            event_chance: 0.0,
            ..EngineConfig::default()
        };
        let request = EventRequest {
            danger_level: 9,
            faction: None,
            player: &player,
        };
        for _ in 0..50 {
            assert!(story.try_random_event(&request, &content, &cfg, &mut rng).is_none());
        }
    }
}
