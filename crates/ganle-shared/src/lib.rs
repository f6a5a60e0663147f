use std::fmt;
use std::str::FromStr;

use serde::{
  Deserialize,
  Serialize
};

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
  #[default]
  Todo,
  InProgress,
  Completed
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
  High,
  #[default]
  Medium,
  Low
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "lowercase")]
pub enum RepeatRule {
  #[default]
  None,
  Daily,
  Weekly,
  Monthly,
  Custom
}

impl RepeatRule {
  pub fn is_recurring(self) -> bool {
    !matches!(self, RepeatRule::None)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct SubTask {
  pub id:        String,
  #[serde(default)]
  pub title:     String,
  #[serde(default)]
  pub completed: bool
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskDto {
  pub id:           String,
  #[serde(default)]
  pub title:        String,
  #[serde(default)]
  pub description:  String,
  #[serde(default)]
  pub status:       TaskStatus,
  #[serde(default)]
  pub priority:     TaskPriority,
  pub project_id:   Option<String>,
  #[serde(default)]
  pub tags:         Vec<String>,
  #[serde(default)]
  pub subtasks:     Vec<SubTask>,
  pub due_date:     Option<String>,
  pub reminder:     Option<String>,
  #[serde(default)]
  pub repeat:       RepeatRule,
  #[serde(default)]
  pub favorite:     bool,
  pub created_at:   String,
  pub updated_at:   String,
  pub completed_at: Option<String>
}

impl TaskDto {
  pub fn is_completed(&self) -> bool {
    self.status == TaskStatus::Completed
  }

  /// Date portion of the due value.
  /// Accepts both `YYYY-MM-DD` and
  /// `YYYY-MM-DDTHH:MM[:SS]`.
  pub fn due_day(&self) -> Option<&str> {
    self
      .due_date
      .as_deref()
      .and_then(|due| due.split('T').next())
      .filter(|day| !day.is_empty())
  }

  pub fn has_tag(
    &self,
    tag_id: &str
  ) -> bool {
    self.tags.iter().any(|tag| tag == tag_id)
  }

  /// `lowered_query` must already be
  /// lowercase.
  pub fn matches_query(
    &self,
    lowered_query: &str
  ) -> bool {
    self
      .title
      .to_lowercase()
      .contains(lowered_query)
      || self
        .description
        .to_lowercase()
        .contains(lowered_query)
  }
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct ProjectDto {
  pub id:         String,
  pub name:       String,
  #[serde(default)]
  pub color:      String,
  #[serde(default)]
  pub icon:       String,
  #[serde(default)]
  pub archived:   bool,
  pub created_at: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
pub struct TagDto {
  pub id:    String,
  pub name:  String,
  #[serde(default)]
  pub color: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Default,
)]
#[serde(rename_all = "camelCase")]
pub struct SettingsDto {
  #[serde(default)]
  pub is_dark: bool
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
  Hash,
)]
#[serde(rename_all = "lowercase")]
pub enum SmartList {
  Today,
  Week,
  All,
  Completed,
  Favorite
}

impl SmartList {
  pub const ALL: [SmartList; 5] = [
    SmartList::Today,
    SmartList::Week,
    SmartList::All,
    SmartList::Completed,
    SmartList::Favorite
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      | SmartList::Today => "today",
      | SmartList::Week => "week",
      | SmartList::All => "all",
      | SmartList::Completed => {
        "completed"
      }
      | SmartList::Favorite => {
        "favorite"
      }
    }
  }
}

impl FromStr for SmartList {
  type Err = String;

  fn from_str(
    raw: &str
  ) -> Result<Self, Self::Err> {
    SmartList::ALL
      .into_iter()
      .find(|list| list.as_str() == raw)
      .ok_or_else(|| {
        format!("unknown smart list: {raw}")
      })
  }
}

/// Which derived list the interface is
/// showing. Serialized as
/// `{"type": "...", "id": "..."}`.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(
  tag = "type",
  content = "id",
  rename_all = "lowercase"
)]
pub enum ViewSelector {
  Smart(SmartList),
  Project(String),
  Tag(String)
}

impl Default for ViewSelector {
  fn default() -> Self {
    ViewSelector::Smart(SmartList::Today)
  }
}

impl ViewSelector {
  pub fn kind(&self) -> &'static str {
    match self {
      | ViewSelector::Smart(_) => "smart",
      | ViewSelector::Project(_) => {
        "project"
      }
      | ViewSelector::Tag(_) => "tag"
    }
  }

  pub fn id(&self) -> &str {
    match self {
      | ViewSelector::Smart(list) => {
        list.as_str()
      }
      | ViewSelector::Project(id)
      | ViewSelector::Tag(id) => id
    }
  }

  pub fn project_id(&self) -> Option<&str> {
    match self {
      | ViewSelector::Project(id) => {
        Some(id)
      }
      | _ => None
    }
  }

  pub fn tag_id(&self) -> Option<&str> {
    match self {
      | ViewSelector::Tag(id) => Some(id),
      | _ => None
    }
  }

  pub fn from_parts(
    kind: &str,
    id: &str
  ) -> Result<Self, String> {
    match kind {
      | "smart" => {
        Ok(ViewSelector::Smart(id.parse()?))
      }
      | "project" if !id.is_empty() => {
        Ok(ViewSelector::Project(
          id.to_string()
        ))
      }
      | "tag" if !id.is_empty() => {
        Ok(ViewSelector::Tag(id.to_string()))
      }
      | _ => {
        Err(format!(
          "invalid view selector: \
           {kind}:{id}"
        ))
      }
    }
  }
}

impl fmt::Display for ViewSelector {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>
  ) -> fmt::Result {
    write!(f, "{}:{}", self.kind(), self.id())
  }
}

/// Parses `smart:today`,
/// `project:<id>` or `tag:<id>`. A bare
/// smart list name is accepted too.
impl FromStr for ViewSelector {
  type Err = String;

  fn from_str(
    raw: &str
  ) -> Result<Self, Self::Err> {
    let raw = raw.trim();
    match raw.split_once(':') {
      | Some((kind, id)) => {
        ViewSelector::from_parts(
          kind.trim(),
          id.trim()
        )
      }
      | None => {
        Ok(ViewSelector::Smart(raw.parse()?))
      }
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "lowercase")]
pub enum WindowMode {
  Minimal,
  Standard
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskCreate {
  pub title:      String,
  pub due_date:   Option<String>,
  pub priority:   TaskPriority,
  pub project_id: Option<String>,
  pub tag_id:     Option<String>,
  pub repeat:     RepeatRule
}

/// Partial task update. `Some(None)`
/// clears an optional field.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
  PartialEq,
)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
  pub title:       Option<String>,
  pub description: Option<String>,
  pub status:      Option<TaskStatus>,
  pub priority:    Option<TaskPriority>,
  pub project_id: Option<Option<String>>,
  pub tags:        Option<Vec<String>>,
  pub due_date: Option<Option<String>>,
  pub reminder: Option<Option<String>>,
  pub repeat:      Option<RepeatRule>,
  pub favorite:    Option<bool>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TaskUpdateArgs {
  pub id:      String,
  pub updates: TaskPatch
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct IdArg {
  pub id: String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct SubtaskArgs {
  pub task_id:    String,
  pub subtask_id: Option<String>,
  pub title:      Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TagCreate {
  pub name:  String,
  pub color: String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct TagPatch {
  pub name:  Option<String>,
  pub color: Option<String>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct TagUpdateArgs {
  pub id:      String,
  pub updates: TagPatch
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ProjectCreate {
  pub name:  String,
  pub color: String,
  pub icon:  String
}

#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  Default,
)]
pub struct ProjectPatch {
  pub name:     Option<String>,
  pub color:    Option<String>,
  pub icon:     Option<String>,
  pub archived: Option<bool>
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct ProjectUpdateArgs {
  pub id:      String,
  pub updates: ProjectPatch
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
#[serde(rename_all = "camelCase")]
pub struct ReorderArgs {
  pub from_index: usize,
  pub to_index:   usize,
  pub view_type:  String,
  pub view_id:    String
}

#[derive(
  Debug, Clone, Serialize, Deserialize,
)]
pub struct SettingsUpdate {
  pub key:   String,
  pub value: String
}
