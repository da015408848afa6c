//! Quest definitions and objective tracking.
use log::{info, warn};
use serde::{Deserialize, Serialize};

use super::{Consequence, StoryState};
use crate::content::Content;
use crate::ledger::Player;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Locked,
    Available,
    Active,
    Completed,
    /// Reserved; nothing transitions a quest here yet.
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectiveKind {
    Travel,
    Trade,
    Combat,
    Dialogue,
    Explore,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestObjective {
    pub id: String,
    pub description: String,
    pub kind: ObjectiveKind,
    pub target: String,
    #[serde(default)]
    pub current: u32,
    pub required: u32,
    #[serde(default)]
    pub completed: bool,
}

const ANY_TARGET: &str = "any";
const NEW_SYSTEMS_TARGET: &str = "new_systems";
const CREDITS_TARGET_PREFIX: &str = "credits_";

/// Something that happened in the game which may move objectives forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectiveTrigger<'a> {
    Visit { system_id: &'a str, first_visit: bool },
    /// A completed trade and the credits that changed hands.
    Trade { credits: i64 },
    CombatWon,
    /// A flag became truthy.
    Flag(&'a str),
}

impl QuestObjective {
    /// Progress this objective gains from a trigger, if it matches at all.
    #[must_use]
    pub fn gain(&self, trigger: &ObjectiveTrigger<'_>) -> Option<u32> {
        let target = self.target.as_str();
        match (self.kind, *trigger) {
            (ObjectiveKind::Travel, ObjectiveTrigger::Visit { system_id, .. })
                if target == system_id || target == ANY_TARGET =>
            {
                Some(1)
            }
            // `new_systems` counts first visits only, so returning to a known
            // system never pays out. Deliberately stricter than counting every
            // arrival.
            (ObjectiveKind::Explore, ObjectiveTrigger::Visit { system_id, first_visit })
                if target == system_id || (target == NEW_SYSTEMS_TARGET && first_visit) =>
            {
                Some(1)
            }
            (ObjectiveKind::Trade, ObjectiveTrigger::Trade { credits }) => {
                if target.starts_with(CREDITS_TARGET_PREFIX) {
                    Some(u32::try_from(credits.max(0)).unwrap_or(u32::MAX))
                } else if target == ANY_TARGET {
                    Some(1)
                } else {
                    None
                }
            }
            (ObjectiveKind::Combat, ObjectiveTrigger::CombatWon) => Some(1),
            (ObjectiveKind::Dialogue, ObjectiveTrigger::Flag(key))
                if target == key =>
            {
                Some(1)
            }
            _ => None,
        }
    }

    /// Add progress, clamped at `required`.
    pub fn advance(&mut self, amount: u32) {
        if self.completed {
            return;
        }
        self.current = self.current.saturating_add(amount).min(self.required);
        self.completed = self.current >= self.required;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub chapter: u32,
    pub status: QuestStatus,
    pub objectives: Vec<QuestObjective>,
    #[serde(default)]
    pub rewards: Vec<Consequence>,
    #[serde(default)]
    pub is_main: bool,
}

impl Quest {
    #[must_use]
    pub fn objectives_done(&self) -> bool {
        self.objectives.iter().all(|objective| objective.completed)
    }
}

impl StoryState {
    /// Move a locked or available quest to active.
    pub fn activate_quest(&mut self, quest_id: &str, player: &mut Player, content: &Content) {
        let Some(quest) = self.quests.iter_mut().find(|quest| quest.id == quest_id) else {
            warn!("Unknown quest activation | {quest_id}");
            return;
        };
        if !matches!(quest.status, QuestStatus::Locked | QuestStatus::Available) {
            return;
        }
        quest.status = QuestStatus::Active;
        info!("Quest activated | {quest_id}");
        self.sync_flag_objectives(quest_id, player, content);
    }

    pub fn on_system_visited(
        &mut self,
        system_id: &str,
        first_visit: bool,
        player: &mut Player,
        content: &Content,
    ) {
        self.advance_objectives(
            &ObjectiveTrigger::Visit {
                system_id,
                first_visit,
            },
            player,
            content,
        );
    }

    pub fn on_trade_completed(&mut self, credits: i64, player: &mut Player, content: &Content) {
        self.advance_objectives(&ObjectiveTrigger::Trade { credits }, player, content);
    }

    pub fn on_combat_won(&mut self, player: &mut Player, content: &Content) {
        self.advance_objectives(&ObjectiveTrigger::CombatWon, player, content);
    }

    /// Feed a trigger to every active quest, then complete the ones it finished.
    pub(crate) fn advance_objectives(
        &mut self,
        trigger: &ObjectiveTrigger<'_>,
        player: &mut Player,
        content: &Content,
    ) {
        let mut finished = Vec::new();
        for quest in self
            .quests
            .iter_mut()
            .filter(|quest| quest.status == QuestStatus::Active)
        {
            for objective in &mut quest.objectives {
                if objective.completed {
                    continue;
                }
                if let Some(amount) = objective.gain(trigger) {
                    objective.advance(amount);
                }
            }
            if quest.objectives_done() {
                finished.push(quest.id.clone());
            }
        }
        for quest_id in finished {
            self.complete_quest(&quest_id, player, content);
        }
    }

    /// Catch a freshly activated quest up with flags that were set earlier.
    pub(crate) fn sync_flag_objectives(&mut self, quest_id: &str, player: &mut Player, content: &Content) {
        let Some(index) = self.quests.iter().position(|quest| quest.id == quest_id) else {
            return;
        };
        if self.quests[index].status != QuestStatus::Active {
            return;
        }
        let already_set: Vec<bool> = self.quests[index]
            .objectives
            .iter()
            .map(|objective| {
                matches!(objective.kind, ObjectiveKind::Dialogue | ObjectiveKind::Explore)
                    && !objective.completed
                    && self.flag_is_set(&objective.target, player)
            })
            .collect();
        let quest = &mut self.quests[index];
        for (objective, set) in quest.objectives.iter_mut().zip(already_set) {
            if set {
                objective.advance(1);
            }
        }
        if quest.objectives_done() {
            self.complete_quest(quest_id, player, content);
        }
    }

    /// Complete an active quest and pay its rewards exactly once.
    fn complete_quest(&mut self, quest_id: &str, player: &mut Player, content: &Content) {
        let Some(quest) = self
            .quests
            .iter_mut()
            .find(|quest| quest.id == quest_id && quest.status == QuestStatus::Active)
        else {
            return;
        };
        quest.status = QuestStatus::Completed;
        let rewards = quest.rewards.clone();
        info!("Quest completed | {quest_id}");
        player.stats.quests_completed = player.stats.quests_completed.saturating_add(1);
        self.apply_consequences(&rewards, player, content);
        self.check_chapter_progression(player, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::story::tests::fixture;

    #[test]
    fn last_objective_completes_quest_once() {
        let (content, mut player, mut story) = fixture();
        // First Steps: visit, trade once, move 500 credits of goods.
        story.on_system_visited("meridian", true, &mut player, &content);
        story.on_trade_completed(300, &mut player, &content);
        let quest = story.quest("q_first_steps").unwrap();
        assert_eq!(quest.status, QuestStatus::Active);
        assert!(quest.objectives[0].completed);
        assert!(quest.objectives[1].completed);
        assert_eq!(quest.objectives[2].current, 300);

        story.on_trade_completed(900, &mut player, &content);
        let quest = story.quest("q_first_steps").unwrap();
        assert_eq!(quest.status, QuestStatus::Completed);
        assert_eq!(quest.objectives[2].current, 500);
        assert_eq!(player.credits, 1_200);
        assert_eq!(player.stats.quests_completed, 1);

        story.on_trade_completed(900, &mut player, &content);
        assert_eq!(player.credits, 1_200);
        assert_eq!(player.stats.quests_completed, 1);
    }

    #[test]
    fn new_systems_only_count_first_visits() {
        let (content, mut player, mut story) = fixture();
        story.activate_quest("q_follow_signal", &mut player, &content);
        story.on_system_visited("meridian", true, &mut player, &content);
        story.on_system_visited("meridian", false, &mut player, &content);
        let quest = story.quest("q_follow_signal").unwrap();
        assert_eq!(quest.objectives[0].current, 1);
        assert_eq!(quest.objectives[1].current, 0);
    }

    #[test]
    fn flags_only_advance_dialogue_objectives() {
        let objective = |kind| QuestObjective {
            id: String::from("o"),
            description: String::new(),
            kind,
            target: String::from("met_archivist"),
            current: 0,
            required: 1,
            completed: false,
        };
        let trigger = ObjectiveTrigger::Flag("met_archivist");
        assert_eq!(objective(ObjectiveKind::Dialogue).gain(&trigger), Some(1));
        assert_eq!(objective(ObjectiveKind::Explore).gain(&trigger), None);
    }

    #[test]
    fn follow_signal_completion_opens_chapter_two() {
        let (content, mut player, mut story) = fixture();
        story.activate_quest("q_follow_signal", &mut player, &content);
        for system in ["meridian", "crystallis", "observatory"] {
            story.on_system_visited(system, true, &mut player, &content);
        }
        assert_eq!(story.quest("q_follow_signal").unwrap().status, QuestStatus::Completed);
        assert_eq!(story.chapter, 2);
        assert_eq!(story.quest("q_meet_foundation").unwrap().status, QuestStatus::Active);
        assert_eq!(player.credits, 1_500);
    }

    #[test]
    fn activation_catches_up_on_earlier_flags() {
        let (content, mut player, mut story) = fixture();
        player.set_flag("selene_meeting", true.into());
        story.quests.iter_mut().for_each(|quest| {
            if quest.id == "q_meet_foundation" {
                quest.status = QuestStatus::Available;
            }
        });
        story.activate_quest("q_meet_foundation", &mut player, &content);
        let quest = story.quest("q_meet_foundation").unwrap();
        assert!(quest.objectives[1].completed);
        assert!(!quest.objectives[0].completed);
    }

    #[test]
    fn combat_objectives_count_any_win() {
        let objective = QuestObjective {
            id: String::from("o"),
            description: String::new(),
            kind: ObjectiveKind::Combat,
            target: String::from("archive_guardian"),
            current: 0,
            required: 1,
            completed: false,
        };
        assert_eq!(objective.gain(&ObjectiveTrigger::CombatWon), Some(1));
        assert_eq!(objective.gain(&ObjectiveTrigger::Trade { credits: 10 }), None);
    }

    #[test]
    fn progress_never_passes_required() {
        let mut objective = QuestObjective {
            id: String::from("o"),
            description: String::new(),
            kind: ObjectiveKind::Trade,
            target: String::from("credits_500"),
            current: 0,
            required: 500,
            completed: false,
        };
        objective.advance(u32::MAX);
        assert_eq!(objective.current, 500);
        assert!(objective.completed);
        assert_eq!(
            objective.gain(&ObjectiveTrigger::Trade { credits: -40 }),
            Some(0)
        );
    }

    #[test]
    fn completed_quests_ignore_activation() {
        let (content, mut player, mut story) = fixture();
        story.quests[0].status = QuestStatus::Completed;
        let quest_id = story.quests[0].id.clone();
        story.activate_quest(&quest_id, &mut player, &content);
        assert_eq!(story.quests[0].status, QuestStatus::Completed);
    }
}
