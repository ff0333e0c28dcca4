//! Daily log data model: records, payload, summaries, and edit actions.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Something blocking progress and what is needed to clear it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockerItem {
    pub item: String,
    pub needs: String,
}

/// A decision that is waiting on someone or something.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionNeededItem {
    pub item: String,
    pub needs: String,
}

/// End-of-day workspace cleanup checklist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupStatus {
    pub cleared_desktop: bool,
    pub closed_files_tabs: bool,
    pub updated_calendar: bool,
    pub desk_reset: bool,
}

/// One checklist entry of [`CleanupStatus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTask {
    ClearedDesktop,
    ClosedFilesTabs,
    UpdatedCalendar,
    DeskReset,
}

impl CleanupStatus {
    /// Flip a single checklist flag, leaving the others untouched.
    pub fn toggle(&mut self, task: CleanupTask) {
        let flag = match task {
            CleanupTask::ClearedDesktop => &mut self.cleared_desktop,
            CleanupTask::ClosedFilesTabs => &mut self.closed_files_tabs,
            CleanupTask::UpdatedCalendar => &mut self.updated_calendar,
            CleanupTask::DeskReset => &mut self.desk_reset,
        };
        *flag = !*flag;
    }
}

/// The reflection content stored in a daily log (`log_data`).
///
/// Every field has a default and missing keys deserialize to it, so a stored
/// payload is always fully populated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogData {
    pub accomplished: Vec<String>,
    pub in_progress: Vec<String>,
    /// Keyed by an `in_progress` entry. Not cleaned up when that entry is
    /// removed through [`LogData::remove_item`].
    pub not_done_reasoning: BTreeMap<String, String>,
    pub blockers: Vec<BlockerItem>,
    pub decisions_needed: Vec<DecisionNeededItem>,
    pub tomorrow_priorities: Vec<String>,
    pub loose_thoughts: Vec<String>,
    pub cleanup: CleanupStatus,
    pub shutdown_ritual: String,
}

/// Free-text list sections of the form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSection {
    Accomplished,
    InProgress,
    TomorrowPriorities,
    LooseThoughts,
}

impl LogData {
    fn list_mut(&mut self, section: ListSection) -> &mut Vec<String> {
        match section {
            ListSection::Accomplished => &mut self.accomplished,
            ListSection::InProgress => &mut self.in_progress,
            ListSection::TomorrowPriorities => &mut self.tomorrow_priorities,
            ListSection::LooseThoughts => &mut self.loose_thoughts,
        }
    }

    /// Append a trimmed value to a list section. Empty values and exact
    /// duplicates are ignored. Returns whether the list changed.
    pub fn add_item(&mut self, section: ListSection, value: &str) -> bool {
        let value = value.trim();
        let items = self.list_mut(section);
        if value.is_empty() || items.iter().any(|i| i == value) {
            return false;
        }
        items.push(value.to_string());
        true
    }

    /// Remove every exact match of `value` from a list section.
    ///
    /// For [`ListSection::InProgress`] this leaves any `not_done_reasoning`
    /// entry for the value in place.
    pub fn remove_item(&mut self, section: ListSection, value: &str) -> bool {
        let items = self.list_mut(section);
        let before = items.len();
        items.retain(|i| i != value);
        items.len() != before
    }

    /// Remove an in-progress item together with its reasoning entry.
    pub fn remove_in_progress(&mut self, item: &str) -> bool {
        let removed_item = self.remove_item(ListSection::InProgress, item);
        let removed_reason = self.not_done_reasoning.remove(item).is_some();
        removed_item || removed_reason
    }

    /// Record why an item is still in progress. Blank reasons are ignored.
    pub fn set_reasoning(&mut self, item: &str, reason: &str) -> bool {
        let reason = reason.trim();
        if item.is_empty() || reason.is_empty() {
            return false;
        }
        let previous = self
            .not_done_reasoning
            .insert(item.to_string(), reason.to_string());
        previous.as_deref() != Some(reason)
    }

    /// Append a blocker. Both parts are trimmed and must be non-empty.
    pub fn add_blocker(&mut self, item: &str, needs: &str) -> bool {
        match trimmed_pair(item, needs) {
            Some((item, needs)) => {
                self.blockers.push(BlockerItem { item, needs });
                true
            }
            None => false,
        }
    }

    /// Remove the blocker at `index`; out-of-range indices are ignored.
    pub fn remove_blocker(&mut self, index: usize) -> bool {
        if index < self.blockers.len() {
            self.blockers.remove(index);
            true
        } else {
            false
        }
    }

    /// Append a pending decision. Both parts are trimmed and must be non-empty.
    pub fn add_decision(&mut self, item: &str, needs: &str) -> bool {
        match trimmed_pair(item, needs) {
            Some((item, needs)) => {
                self.decisions_needed.push(DecisionNeededItem { item, needs });
                true
            }
            None => false,
        }
    }

    /// Remove the decision at `index`; out-of-range indices are ignored.
    pub fn remove_decision(&mut self, index: usize) -> bool {
        if index < self.decisions_needed.len() {
            self.decisions_needed.remove(index);
            true
        } else {
            false
        }
    }

    /// Apply an edit action. Returns whether the payload changed.
    pub fn apply(&mut self, action: &LogAction) -> bool {
        match action {
            LogAction::AddItem { section, value } => self.add_item(*section, value),
            LogAction::RemoveItem { section, value } => self.remove_item(*section, value),
            LogAction::RemoveInProgress { item } => self.remove_in_progress(item),
            LogAction::SetReasoning { item, reason } => self.set_reasoning(item, reason),
            LogAction::AddBlocker { item, needs } => self.add_blocker(item, needs),
            LogAction::RemoveBlocker { index } => self.remove_blocker(*index),
            LogAction::AddDecision { item, needs } => self.add_decision(item, needs),
            LogAction::RemoveDecision { index } => self.remove_decision(*index),
            LogAction::ToggleCleanup { task } => {
                self.cleanup.toggle(*task);
                true
            }
            LogAction::SetShutdownRitual { text } => {
                if self.shutdown_ritual == *text {
                    return false;
                }
                self.shutdown_ritual = text.clone();
                true
            }
        }
    }
}

fn trimmed_pair(item: &str, needs: &str) -> Option<(String, String)> {
    let (item, needs) = (item.trim(), needs.trim());
    if item.is_empty() || needs.is_empty() {
        None
    } else {
        Some((item.to_string(), needs.to_string()))
    }
}

/// A partial payload update. Present fields replace the stored field wholesale.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accomplished: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub in_progress: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_done_reasoning: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blockers: Option<Vec<BlockerItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decisions_needed: Option<Vec<DecisionNeededItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tomorrow_priorities: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loose_thoughts: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup: Option<CleanupStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shutdown_ritual: Option<String>,
}

impl LogPatch {
    /// Whether the patch carries no fields at all.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this patch over `base`, returning the full payload to store.
    pub fn merge_into(self, mut base: LogData) -> LogData {
        if let Some(v) = self.accomplished {
            base.accomplished = v;
        }
        if let Some(v) = self.in_progress {
            base.in_progress = v;
        }
        if let Some(v) = self.not_done_reasoning {
            base.not_done_reasoning = v;
        }
        if let Some(v) = self.blockers {
            base.blockers = v;
        }
        if let Some(v) = self.decisions_needed {
            base.decisions_needed = v;
        }
        if let Some(v) = self.tomorrow_priorities {
            base.tomorrow_priorities = v;
        }
        if let Some(v) = self.loose_thoughts {
            base.loose_thoughts = v;
        }
        if let Some(v) = self.cleanup {
            base.cleanup = v;
        }
        if let Some(v) = self.shutdown_ritual {
            base.shutdown_ritual = v;
        }
        base
    }
}

/// Form edits a client can request against a daily log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LogAction {
    AddItem { section: ListSection, value: String },
    RemoveItem { section: ListSection, value: String },
    /// Remove an in-progress item and its reasoning entry.
    RemoveInProgress { item: String },
    SetReasoning { item: String, reason: String },
    AddBlocker { item: String, needs: String },
    RemoveBlocker { index: usize },
    AddDecision { item: String, needs: String },
    RemoveDecision { index: usize },
    ToggleCleanup { task: CleanupTask },
    SetShutdownRitual { text: String },
}

/// One daily reflection record, unique per (user, date).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyLog {
    /// Assigned by the store on creation.
    pub id: Uuid,
    /// Owner; never changes after creation.
    pub user_id: Uuid,
    /// Calendar date, serialized as `YYYY-MM-DD`.
    pub date: NaiveDate,
    pub log_data: LogData,
    /// Incremented by the store on every write.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Listing projection of a daily log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogSummary {
    pub id: Uuid,
    pub date: NaiveDate,
    pub accomplished: Vec<String>,
    pub in_progress: Vec<String>,
}
