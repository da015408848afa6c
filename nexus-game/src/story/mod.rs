//! Narrative state: dialogue traversal, quests and random events.
//!
//! [`StoryState`] owns chapter progress, quest progress, story flags and event
//! history. Every operation that has side effects on the player takes the
//! [`Player`] explicitly and mutates it through the ledger.

pub mod dialogue;
pub mod events;
pub mod quests;

use std::collections::BTreeMap;

use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::content::{Content, FactionId};
use crate::ledger::{FlagValue, Player};

pub use dialogue::{
    Chapter, DialogueCursor, DialogueNode, DialogueOption, DialogueRequirement, DialogueStep,
    StatRequirement,
};
pub use events::{EventChoice, EventCondition, EventKind, EventRequest, GameEvent};
pub use quests::{ObjectiveKind, ObjectiveTrigger, Quest, QuestObjective, QuestStatus};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoryError {
    #[error("no dialogue is in progress")]
    NoActiveDialogue,
    #[error("dialogue node {node} has no option {option}")]
    UnknownOption { node: String, option: String },
    #[error("dialogue option {0} is not available")]
    RequirementUnmet(String),
    #[error("no event is pending")]
    NoActiveEvent,
    #[error("unknown event {0}")]
    UnknownEvent(String),
    #[error("event choice {index} is out of range ({count} choices)")]
    InvalidChoice { index: usize, count: usize },
}

/// A typed effect of a dialogue option, event choice or quest reward.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Consequence {
    Credits { amount: i64 },
    Xp { amount: u32 },
    Reputation { faction: FactionId, delta: i32 },
    Flag { key: String, value: FlagValue },
    /// Activates a locked or available quest.
    Quest { quest_id: String },
    /// Reserved for inventory items; no content produces or consumes these yet.
    Item {
        item_id: String,
        #[serde(default)]
        quantity: u32,
    },
}

/// Everything the story engine persists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryState {
    pub chapter: u32,
    pub quests: Vec<Quest>,
    #[serde(default)]
    pub flags: BTreeMap<String, FlagValue>,
    #[serde(default)]
    pub completed_events: Vec<String>,
    #[serde(default)]
    pub dialogue: Option<DialogueCursor>,
    #[serde(default)]
    pub active_event: Option<String>,
}

impl StoryState {
    /// Fresh story at chapter one; chapter-one quests marked available start active.
    #[must_use]
    pub fn new(content: &Content) -> Self {
        let mut quests = content.quests.clone();
        for quest in &mut quests {
            for objective in &mut quest.objectives {
                objective.current = 0;
                objective.completed = false;
            }
            if quest.chapter == 1 && quest.status == QuestStatus::Available {
                quest.status = QuestStatus::Active;
            }
        }
        Self {
            chapter: 1,
            quests,
            flags: BTreeMap::new(),
            completed_events: Vec::new(),
            dialogue: None,
            active_event: None,
        }
    }

    #[must_use]
    pub fn quest(&self, quest_id: &str) -> Option<&Quest> {
        self.quests.iter().find(|quest| quest.id == quest_id)
    }

    pub fn active_quests(&self) -> impl Iterator<Item = &Quest> {
        self.quests
            .iter()
            .filter(|quest| quest.status == QuestStatus::Active)
    }

    pub fn completed_quests(&self) -> impl Iterator<Item = &Quest> {
        self.quests
            .iter()
            .filter(|quest| quest.status == QuestStatus::Completed)
    }

    /// Truthy in either flag store.
    #[must_use]
    pub fn flag_is_set(&self, key: &str, player: &Player) -> bool {
        self.flags.get(key).is_some_and(FlagValue::is_truthy)
            || player.flag(key).is_some_and(FlagValue::is_truthy)
    }

    /// Apply consequences in order.
    pub fn apply_consequences(
        &mut self,
        consequences: &[Consequence],
        player: &mut Player,
        content: &Content,
    ) {
        for consequence in consequences {
            self.apply_consequence(consequence, player, content);
        }
    }

    fn apply_consequence(&mut self, consequence: &Consequence, player: &mut Player, content: &Content) {
        match consequence {
            Consequence::Credits { amount } => player.add_credits(*amount),
            Consequence::Xp { amount } => {
                player.add_xp(*amount);
            }
            Consequence::Reputation { faction, delta } => {
                player.add_reputation(*faction, *delta);
            }
            Consequence::Flag { key, value } => {
                self.flags.insert(key.clone(), value.clone());
                player.set_flag(key, value.clone());
                if value.is_truthy() {
                    self.advance_objectives(&ObjectiveTrigger::Flag(key), player, content);
                }
            }
            Consequence::Quest { quest_id } => self.activate_quest(quest_id, player, content),
            Consequence::Item { item_id, quantity } => {
                debug!("Item consequence ignored | {item_id} x{quantity}");
            }
        }
    }

    /// Mark chapter `N` done and move to `N + 1` when `chapter_N_complete` is set.
    fn check_chapter_progression(&mut self, player: &mut Player, content: &Content) {
        let flag = format!("chapter_{}_complete", self.chapter);
        if !self.flag_is_set(&flag, player) {
            return;
        }
        let Some(next) = content.chapter(self.chapter + 1) else {
            return;
        };
        self.chapter = next.id;
        info!("Chapter advanced | chapter:{} {}", next.id, next.title);
        let unlocked: Vec<String> = self
            .quests
            .iter_mut()
            .filter(|quest| quest.chapter == next.id && quest.status == QuestStatus::Locked)
            .map(|quest| {
                quest.status = QuestStatus::Active;
                quest.id.clone()
            })
            .collect();
        self.start_chapter_dialogue(content);
        for quest_id in unlocked {
            self.sync_flag_objectives(&quest_id, player, content);
        }
        // Rewards applied during the sync can complete the new chapter as well.
        self.check_chapter_progression(player, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::ShipClass;

    pub(crate) fn fixture() -> (Content, Player, StoryState) {
        let content = Content::bundled().unwrap();
        let ship = content.starter_ship(ShipClass::Explorer).unwrap();
        let player = Player::new(
            String::from("p"),
            "Tess",
            ship,
            1_000,
            content.base_reputations(),
            &content.start_system,
        );
        let story = StoryState::new(&content);
        (content, player, story)
    }

    #[test]
    fn new_story_activates_available_chapter_one_quests() {
        let (_, _, story) = fixture();
        assert_eq!(story.chapter, 1);
        let active: Vec<&str> = story.active_quests().map(|quest| quest.id.as_str()).collect();
        assert_eq!(active, vec!["q_first_steps"]);
        assert_eq!(story.quest("q_follow_signal").unwrap().status, QuestStatus::Locked);
    }

    #[test]
    fn consequences_write_both_flag_stores() {
        let (content, mut player, mut story) = fixture();
        story.apply_consequences(
            &[
                Consequence::Credits { amount: 250 },
                Consequence::Xp { amount: 120 },
                Consequence::Reputation {
                    faction: FactionId::Hegemony,
                    delta: -200,
                },
                Consequence::Flag {
                    key: String::from("met_selene"),
                    value: FlagValue::Bool(true),
                },
                Consequence::Item {
                    item_id: String::from("relic"),
                    quantity: 1,
                },
            ],
            &mut player,
            &content,
        );
        assert_eq!(player.credits, 1_250);
        assert_eq!(player.level, 2);
        assert_eq!(player.xp, 20);
        assert_eq!(player.reputation(FactionId::Hegemony), -100);
        assert_eq!(story.flags.get("met_selene"), Some(&FlagValue::Bool(true)));
        assert_eq!(player.flag("met_selene"), Some(&FlagValue::Bool(true)));
    }

    #[test]
    fn consequence_json_is_tagged() {
        let parsed: Vec<Consequence> = serde_json::from_str(
            r#"[
                {"type": "reputation", "faction": "synthetics", "delta": 5},
                {"type": "flag", "key": "ending", "value": "release"},
                {"type": "quest", "quest_id": "q_deep_archive"}
            ]"#,
        )
        .unwrap();
        assert_eq!(
            parsed[1],
            Consequence::Flag {
                key: String::from("ending"),
                value: FlagValue::Text(String::from("release")),
            }
        );
        assert!(matches!(parsed[2], Consequence::Quest { .. }));
    }

    #[test]
    fn chapter_flag_advances_and_unlocks() {
        let (content, mut player, mut story) = fixture();
        story.apply_consequences(
            &[Consequence::Flag {
                key: String::from("chapter_1_complete"),
                value: FlagValue::Bool(true),
            }],
            &mut player,
            &content,
        );
        // Progression is only checked when a quest completes.
        assert_eq!(story.chapter, 1);
        story.check_chapter_progression(&mut player, &content);
        assert_eq!(story.chapter, 2);
        assert_eq!(story.quest("q_meet_foundation").unwrap().status, QuestStatus::Active);
        assert_eq!(story.quest("q_deep_archive").unwrap().status, QuestStatus::Active);
        assert_eq!(story.dialogue.as_ref().map(|cursor| cursor.chapter), Some(2));
    }
}
