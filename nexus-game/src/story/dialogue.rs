//! Chapter intro dialogue: a node graph walked by explicit jumps.
use log::warn;
use serde::{Deserialize, Serialize};

use super::{Consequence, StoryError, StoryState};
use crate::constants::REPUTATION_MIN;
use crate::content::{Content, FactionId};
use crate::ledger::Player;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRequirement {
    pub key: String,
    pub min: i64,
}

/// Gate on a dialogue option. Every populated field must hold.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueRequirement {
    pub faction: Option<FactionId>,
    pub min_reputation: Option<i32>,
    /// Items are reserved, so an item gate never opens.
    pub item: Option<String>,
    pub stat: Option<StatRequirement>,
}

impl DialogueRequirement {
    #[must_use]
    pub fn is_met(&self, player: &Player) -> bool {
        if let Some(faction) = self.faction
            && player.reputation(faction) < self.min_reputation.unwrap_or(REPUTATION_MIN)
        {
            return false;
        }
        if self.item.is_some() {
            return false;
        }
        if let Some(stat) = &self.stat
            && player.stats.value(&stat.key).is_none_or(|value| value < stat.min)
        {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueOption {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub requires: Option<DialogueRequirement>,
    #[serde(default)]
    pub consequences: Vec<Consequence>,
    /// `None` ends the conversation.
    #[serde(default)]
    pub next_node_id: Option<String>,
}

impl DialogueOption {
    #[must_use]
    pub fn is_available(&self, player: &Player) -> bool {
        self.requires
            .as_ref()
            .is_none_or(|requirement| requirement.is_met(player))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueNode {
    pub id: String,
    pub speaker: String,
    pub text: String,
    pub options: Vec<DialogueOption>,
    #[serde(default)]
    pub portrait: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: u32,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub intro_dialogue: Vec<DialogueNode>,
    pub quests: Vec<String>,
}

impl Chapter {
    #[must_use]
    pub fn node(&self, node_id: &str) -> Option<&DialogueNode> {
        self.intro_dialogue.iter().find(|node| node.id == node_id)
    }
}

/// Position inside a chapter's dialogue graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialogueCursor {
    pub chapter: u32,
    pub node_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialogueStep {
    /// The conversation moved to this node.
    Continue(String),
    Ended,
}

impl StoryState {
    /// Open the current chapter's intro dialogue. Returns false if it has none.
    pub fn start_chapter_dialogue(&mut self, content: &Content) -> bool {
        let Some(first) = content
            .chapter(self.chapter)
            .and_then(|chapter| chapter.intro_dialogue.first())
        else {
            return false;
        };
        self.dialogue = Some(DialogueCursor {
            chapter: self.chapter,
            node_id: first.id.clone(),
        });
        true
    }

    #[must_use]
    pub fn current_dialogue_node<'c>(&self, content: &'c Content) -> Option<&'c DialogueNode> {
        let cursor = self.dialogue.as_ref()?;
        content.chapter(cursor.chapter)?.node(&cursor.node_id)
    }

    /// Options of the current node the player may pick right now.
    #[must_use]
    pub fn available_options<'c>(&self, content: &'c Content, player: &Player) -> Vec<&'c DialogueOption> {
        self.current_dialogue_node(content)
            .map(|node| {
                node.options
                    .iter()
                    .filter(|option| option.is_available(player))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn end_dialogue(&mut self) {
        self.dialogue = None;
    }

    /// Pick an option: apply its consequences, then jump or end.
    ///
    /// # Errors
    ///
    /// Fails without side effects when no dialogue is open, the option does not
    /// exist on the current node, or its requirement is not met.
    pub fn select_dialogue_option(
        &mut self,
        option_id: &str,
        player: &mut Player,
        content: &Content,
    ) -> Result<DialogueStep, StoryError> {
        let Some(cursor) = self.dialogue.clone() else {
            return Err(StoryError::NoActiveDialogue);
        };
        let Some(chapter) = content.chapter(cursor.chapter) else {
            warn!("Dialogue cursor points at missing chapter {}", cursor.chapter);
            return Err(StoryError::NoActiveDialogue);
        };
        let Some(node) = chapter.node(&cursor.node_id) else {
            warn!("Dialogue cursor points at missing node {}", cursor.node_id);
            return Err(StoryError::NoActiveDialogue);
        };
        let Some(option) = node.options.iter().find(|option| option.id == option_id) else {
            warn!("Unknown dialogue option | node:{} option:{}", node.id, option_id);
            return Err(StoryError::UnknownOption {
                node: node.id.clone(),
                option: option_id.to_string(),
            });
        };
        if !option.is_available(player) {
            warn!("Unavailable dialogue option | node:{} option:{}", node.id, option_id);
            return Err(StoryError::RequirementUnmet(option_id.to_string()));
        }

        self.dialogue = None;
        self.apply_consequences(&option.consequences, player, content);

        // A consequence may have opened the next chapter's dialogue.
        if self.dialogue.is_none()
            && let Some(next) = &option.next_node_id
        {
            if chapter.node(next).is_some() {
                self.dialogue = Some(DialogueCursor {
                    chapter: chapter.id,
                    node_id: next.clone(),
                });
            } else {
                warn!("Dialogue option {} jumps to missing node {}", option.id, next);
            }
        }
        Ok(self
            .dialogue
            .as_ref()
            .map_or(DialogueStep::Ended, |cursor| DialogueStep::Continue(cursor.node_id.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::QuestStatus;
    use crate::story::tests::fixture;

    #[test]
    fn walking_chapter_one_activates_the_signal_quest() {
        let (content, mut player, mut story) = fixture();
        assert!(story.start_chapter_dialogue(&content));
        assert_eq!(
            story.select_dialogue_option("ch1_1a", &mut player, &content),
            Ok(DialogueStep::Continue(String::from("ch1_intro_2")))
        );
        assert_eq!(
            story.select_dialogue_option("ch1_2b", &mut player, &content),
            Ok(DialogueStep::Continue(String::from("ch1_intro_4")))
        );
        assert_eq!(
            story.select_dialogue_option("ch1_4a", &mut player, &content),
            Ok(DialogueStep::Ended)
        );
        assert!(story.dialogue.is_none());
        assert_eq!(story.quest("q_follow_signal").unwrap().status, QuestStatus::Active);
    }

    #[test]
    fn unknown_option_changes_nothing() {
        let (content, mut player, mut story) = fixture();
        story.start_chapter_dialogue(&content);
        let before = story.clone();
        let result = story.select_dialogue_option("nope", &mut player, &content);
        assert!(matches!(result, Err(StoryError::UnknownOption { .. })));
        assert_eq!(story, before);
        let mut idle = StoryState::new(&content);
        assert_eq!(
            idle.select_dialogue_option("ch1_1a", &mut player, &content),
            Err(StoryError::NoActiveDialogue)
        );
    }

    #[test]
    fn reputation_gates_options() {
        let (content, mut player, mut story) = fixture();
        story.chapter = 4;
        story.start_chapter_dialogue(&content);
        // Free Traders start at 15: the 21+ gate stays shut.
        let open: Vec<&str> = story
            .available_options(&content, &player)
            .iter()
            .map(|option| option.id.as_str())
            .collect();
        assert!(!open.contains(&"ch4_1b"));
        assert_eq!(
            story.select_dialogue_option("ch4_1b", &mut player, &content),
            Err(StoryError::RequirementUnmet(String::from("ch4_1b")))
        );
        player.add_reputation(FactionId::FreeTraders, 10);
        assert!(story.select_dialogue_option("ch4_1b", &mut player, &content).is_ok());
        assert!(player.flag("friendly_rep").is_some_and(|flag| flag.is_truthy()));
    }

    #[test]
    fn requirements_combine() {
        let (_, mut player, _) = fixture();
        let stat_gate = DialogueRequirement {
            stat: Some(StatRequirement {
                key: String::from("combats_won"),
                min: 5,
            }),
            ..DialogueRequirement::default()
        };
        assert!(!stat_gate.is_met(&player));
        player.stats.combats_won = 5;
        assert!(stat_gate.is_met(&player));

        let item_gate = DialogueRequirement {
            item: Some(String::from("architect_key")),
            ..DialogueRequirement::default()
        };
        assert!(!item_gate.is_met(&player));

        let unknown_stat = DialogueRequirement {
            stat: Some(StatRequirement {
                key: String::from("bogus"),
                min: 0,
            }),
            ..DialogueRequirement::default()
        };
        assert!(!unknown_stat.is_met(&player));
    }
}
