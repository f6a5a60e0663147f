//! In-process backend holding the durable
//! state in memory.
//!
//! Follows the persistence engine's rules:
//! repeat regeneration on completion,
//! cascading tag and project removal, view
//! scoped reordering and one-shot reminders.
//! It also supports fault injection so
//! callers can exercise failure paths.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{
  DateTime,
  Datelike,
  Duration,
  NaiveDate,
  NaiveDateTime,
  NaiveTime,
  TimeZone,
  Utc
};
use chrono_tz::Tz;
use ganle_shared::{
  IdArg,
  ProjectCreate,
  ProjectDto,
  ProjectUpdateArgs,
  ReorderArgs,
  RepeatRule,
  SettingsDto,
  SettingsUpdate,
  SubTask,
  SubtaskArgs,
  TagCreate,
  TagDto,
  TagUpdateArgs,
  TaskCreate,
  TaskDto,
  TaskStatus,
  TaskUpdateArgs,
  ViewSelector,
  WindowMode
};
use parking_lot::{
  Mutex,
  MutexGuard
};
use serde::{
  Deserialize,
  Serialize
};
use tracing::{
  debug,
  info,
  instrument
};
use uuid::Uuid;

use crate::clock::NowFn;
use crate::error::{
  GatewayError,
  GatewayResult
};
use crate::gateway::{
  Applied,
  BackendGateway
};
use crate::views::{
  DateWindow,
  matches_view
};

const REMINDER_LEAD_MINUTES: i64 = 5;
const MONTH_FALLBACK_DAYS: i64 = 30;
const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Seed data for [`MemoryBackend`], in the
/// same camelCase shape the backend returns.
#[derive(
  Debug,
  Clone,
  Default,
  Serialize,
  Deserialize,
  PartialEq,
  Eq,
)]
#[serde(rename_all = "camelCase", default)]
pub struct MemorySnapshot {
  pub tasks:    Vec<TaskDto>,
  pub projects: Vec<ProjectDto>,
  pub tags:     Vec<TagDto>,
  pub settings: SettingsDto
}

impl MemorySnapshot {
  pub fn from_json(
    raw: &str
  ) -> anyhow::Result<Self> {
    serde_json::from_str(raw)
      .context("failed to parse seed snapshot")
  }

  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let raw = std::fs::read_to_string(path)
      .with_context(|| {
        format!(
          "failed to read seed snapshot {}",
          path.display()
        )
      })?;
    Self::from_json(&raw).with_context(|| {
      format!("invalid seed snapshot {}", path.display())
    })
  }
}

#[derive(Default)]
struct State {
  data:        MemorySnapshot,
  window_mode: Option<WindowMode>,
  reminded:    HashSet<String>,
  unavailable: Option<String>,
  failing:     HashSet<String>
}

pub struct MemoryBackend {
  state: Mutex<State>,
  now:   NowFn,
  tz:    Tz
}

impl Default for MemoryBackend {
  fn default() -> Self {
    Self::seeded(MemorySnapshot::default())
  }
}

impl MemoryBackend {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn seeded(snapshot: MemorySnapshot) -> Self {
    Self {
      state: Mutex::new(State {
        data: snapshot,
        ..State::default()
      }),
      now:   Arc::new(Utc::now),
      tz:    chrono_tz::UTC
    }
  }

  /// Replaces the wall clock, e.g. with a
  /// fixed instant in tests.
  pub fn with_clock(
    mut self,
    now: impl Fn() -> DateTime<Utc>
    + Send
    + Sync
    + 'static,
    tz: Tz
  ) -> Self {
    self.now = Arc::new(now);
    self.tz = tz;
    self
  }

  /// While set, every call fails with
  /// [`GatewayError::Unavailable`].
  pub fn set_unavailable(
    &self,
    reason: Option<&str>
  ) {
    self.state.lock().unavailable =
      reason.map(str::to_string);
  }

  /// Makes every later call of the named
  /// operation fail until cleared.
  pub fn fail_operation(&self, op: &str) {
    self.state.lock().failing.insert(op.to_string());
  }

  pub fn clear_failures(&self) {
    let mut state = self.state.lock();
    state.failing.clear();
    state.unavailable = None;
  }

  pub fn snapshot(&self) -> MemorySnapshot {
    self.state.lock().data.clone()
  }

  pub fn window_mode(&self) -> Option<WindowMode> {
    self.state.lock().window_mode
  }

  fn enter(
    &self,
    op: &str
  ) -> GatewayResult<MutexGuard<'_, State>> {
    let state = self.state.lock();
    if let Some(reason) = &state.unavailable {
      return Err(GatewayError::Unavailable(
        reason.clone()
      ));
    }
    if state.failing.contains(op) {
      return Err(GatewayError::Unavailable(
        format!("{op} failed")
      ));
    }
    Ok(state)
  }

  fn timestamp(&self) -> String {
    (self.now)().format(TIMESTAMP_FORMAT).to_string()
  }

  fn today(&self) -> NaiveDate {
    (self.now)().with_timezone(&self.tz).date_naive()
  }
}

fn task_mut<'a>(
  data: &'a mut MemorySnapshot,
  id: &str
) -> GatewayResult<&'a mut TaskDto> {
  data
    .tasks
    .iter_mut()
    .find(|task| task.id == id)
    .ok_or_else(|| GatewayError::not_found("task", id))
}

fn require_title(
  title: Option<&str>,
  what: &str
) -> GatewayResult<String> {
  match title.map(str::trim) {
    | Some(title) if !title.is_empty() => {
      Ok(title.to_string())
    }
    | _ => {
      Err(GatewayError::Rejected(format!(
        "{what} title is empty"
      )))
    }
  }
}

fn subtask_id(args: &SubtaskArgs) -> GatewayResult<&str> {
  args.subtask_id.as_deref().ok_or_else(|| {
    GatewayError::Rejected(
      "subtask id is required".to_string()
    )
  })
}

fn subtask_mut<'a>(
  task: &'a mut TaskDto,
  id: &str
) -> GatewayResult<&'a mut SubTask> {
  task
    .subtasks
    .iter_mut()
    .find(|sub| sub.id == id)
    .ok_or_else(|| GatewayError::not_found("subtask", id))
}

/// Sets the status and keeps `completed_at`
/// present exactly when completed.
fn set_status(
  task: &mut TaskDto,
  status: TaskStatus,
  stamp: &str
) {
  task.status = status;
  if status == TaskStatus::Completed {
    if task.completed_at.is_none() {
      task.completed_at = Some(stamp.to_string());
    }
  } else {
    task.completed_at = None;
  }
}

/// Due date of the next instance of a
/// recurring task, or `None` when it does
/// not recur.
pub fn next_due_date(
  due: &str,
  repeat: RepeatRule
) -> Option<String> {
  let day = due.split('T').next().unwrap_or(due);
  let parsed =
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;

  let next = match repeat {
    | RepeatRule::Daily => parsed + Duration::days(1),
    | RepeatRule::Weekly => parsed + Duration::days(7),
    | RepeatRule::Monthly => {
      let (year, month) = if parsed.month() == 12 {
        (parsed.year() + 1, 1)
      } else {
        (parsed.year(), parsed.month() + 1)
      };
      NaiveDate::from_ymd_opt(year, month, parsed.day())
        .unwrap_or_else(|| {
          parsed + Duration::days(MONTH_FALLBACK_DAYS)
        })
    }
    | RepeatRule::None | RepeatRule::Custom => {
      return None;
    }
  };

  Some(next.format("%Y-%m-%d").to_string())
}

/// Instant a due or reminder value refers
/// to. Date-only values mean the end of that
/// day.
pub fn parse_moment(
  raw: &str,
  tz: Tz
) -> Option<DateTime<Utc>> {
  if let Ok(exact) = DateTime::parse_from_rfc3339(raw) {
    return Some(exact.with_timezone(&Utc));
  }

  let naive = match raw.split_once('T') {
    | Some((day, time)) => {
      let day =
        NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()?;
      let time = time.trim_end_matches('Z');
      let time =
        NaiveTime::parse_from_str(time, "%H:%M:%S")
          .or_else(|_| {
            NaiveTime::parse_from_str(time, "%H:%M")
          })
          .ok()?;
      NaiveDateTime::new(day, time)
    }
    | None => {
      let day =
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
      day.and_hms_opt(23, 59, 59)?
    }
  };

  tz.from_local_datetime(&naive)
    .single()
    .map(|local| local.with_timezone(&Utc))
}

fn next_instance(
  task: &TaskDto,
  stamp: &str
) -> Option<TaskDto> {
  let due = task.due_date.as_deref()?;
  let next_due = next_due_date(due, task.repeat)?;

  Some(TaskDto {
    id:           format!("task-{}", Uuid::new_v4()),
    title:        task.title.clone(),
    description:  String::new(),
    status:       TaskStatus::Todo,
    priority:     task.priority,
    project_id:   task.project_id.clone(),
    tags:         task.tags.clone(),
    subtasks:     vec![],
    due_date:     Some(next_due),
    reminder:     None,
    repeat:       task.repeat,
    favorite:     false,
    created_at:   stamp.to_string(),
    updated_at:   stamp.to_string(),
    completed_at: None
  })
}

#[async_trait]
impl BackendGateway for MemoryBackend {
  async fn get_all_tasks(
    &self
  ) -> GatewayResult<Vec<TaskDto>> {
    Ok(self.enter("get_all_tasks")?.data.tasks.clone())
  }

  async fn get_all_projects(
    &self
  ) -> GatewayResult<Vec<ProjectDto>> {
    Ok(
      self
        .enter("get_all_projects")?
        .data
        .projects
        .clone()
    )
  }

  async fn get_all_tags(
    &self
  ) -> GatewayResult<Vec<TagDto>> {
    Ok(self.enter("get_all_tags")?.data.tags.clone())
  }

  async fn get_settings(
    &self
  ) -> GatewayResult<SettingsDto> {
    Ok(
      self
        .enter("get_settings")?
        .data
        .settings
        .clone()
    )
  }

  #[instrument(skip(self))]
  async fn update_settings(
    &self,
    args: SettingsUpdate
  ) -> GatewayResult<()> {
    let mut state = self.enter("update_settings")?;
    match args.key.as_str() {
      | "isDark" => {
        state.data.settings.is_dark =
          args.value.parse().map_err(|_| {
            GatewayError::Rejected(format!(
              "isDark expects a boolean, got {}",
              args.value
            ))
          })?;
        Ok(())
      }
      | other => {
        Err(GatewayError::Rejected(format!(
          "unknown setting: {other}"
        )))
      }
    }
  }

  #[instrument(skip(self))]
  async fn set_window_mode(
    &self,
    mode: WindowMode
  ) -> GatewayResult<()> {
    self.enter("set_window_mode")?.window_mode =
      Some(mode);
    Ok(())
  }

  #[instrument(skip(self, args))]
  async fn create_task(
    &self,
    args: TaskCreate
  ) -> GatewayResult<Applied<TaskDto>> {
    let title = require_title(Some(args.title.as_str()), "task")?;
    let stamp = self.timestamp();
    let mut state = self.enter("create_task")?;

    let task = TaskDto {
      id: format!("task-{}", Uuid::new_v4()),
      title,
      description: String::new(),
      status: TaskStatus::Todo,
      priority: args.priority,
      project_id: args.project_id,
      tags: args.tag_id.into_iter().collect(),
      subtasks: vec![],
      due_date: args.due_date,
      reminder: None,
      repeat: args.repeat,
      favorite: false,
      created_at: stamp.clone(),
      updated_at: stamp,
      completed_at: None
    };
    state.data.tasks.push(task.clone());
    debug!(task_id = %task.id, "task created");
    Ok(Applied::target(task))
  }

  #[instrument(skip(self, args), fields(task_id = %args.id))]
  async fn update_task(
    &self,
    args: TaskUpdateArgs
  ) -> GatewayResult<Applied<TaskDto>> {
    let stamp = self.timestamp();
    let mut state = self.enter("update_task")?;
    let task = task_mut(&mut state.data, &args.id)?;
    let patch = args.updates;

    if let Some(title) = patch.title {
      task.title = require_title(Some(title.as_str()), "task")?;
    }
    if let Some(description) = patch.description {
      task.description = description;
    }
    if let Some(status) = patch.status {
      set_status(task, status, &stamp);
    }
    if let Some(priority) = patch.priority {
      task.priority = priority;
    }
    if let Some(project_id) = patch.project_id {
      task.project_id = project_id;
    }
    if let Some(tags) = patch.tags {
      task.tags = tags;
    }
    if let Some(due_date) = patch.due_date {
      task.due_date = due_date;
    }
    if let Some(reminder) = patch.reminder {
      task.reminder = reminder;
    }
    if let Some(repeat) = patch.repeat {
      task.repeat = repeat;
    }
    if let Some(favorite) = patch.favorite {
      task.favorite = favorite;
    }
    task.updated_at = stamp;

    Ok(Applied::target(task.clone()))
  }

  #[instrument(skip(self), fields(task_id = %args.id))]
  async fn toggle_task_status(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<TaskDto>> {
    let stamp = self.timestamp();
    let mut state = self.enter("toggle_task_status")?;
    let task = task_mut(&mut state.data, &args.id)?;

    let next = if task.is_completed() {
      TaskStatus::Todo
    } else {
      TaskStatus::Completed
    };
    set_status(task, next, &stamp);
    task.updated_at = stamp.clone();
    let toggled = task.clone();

    if !toggled.is_completed() {
      return Ok(Applied::target(toggled));
    }
    match next_instance(&toggled, &stamp) {
      | Some(spawned) => {
        info!(
          task_id = %toggled.id,
          next_id = %spawned.id,
          due = ?spawned.due_date,
          "created next recurring instance"
        );
        state.data.tasks.push(spawned);
        Ok(Applied::graph(toggled))
      }
      | None => Ok(Applied::target(toggled))
    }
  }

  #[instrument(skip(self), fields(task_id = %args.id))]
  async fn toggle_favorite(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<TaskDto>> {
    let stamp = self.timestamp();
    let mut state = self.enter("toggle_favorite")?;
    let task = task_mut(&mut state.data, &args.id)?;
    task.favorite = !task.favorite;
    task.updated_at = stamp;
    Ok(Applied::target(task.clone()))
  }

  #[instrument(skip(self), fields(task_id = %args.id))]
  async fn delete_task(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<()>> {
    let mut state = self.enter("delete_task")?;
    let before = state.data.tasks.len();
    state.data.tasks.retain(|task| task.id != args.id);
    if state.data.tasks.len() == before {
      return Err(GatewayError::not_found("task", args.id));
    }
    state.reminded.remove(&args.id);
    Ok(Applied::target(()))
  }

  #[instrument(skip(self, args), fields(task_id = %args.task_id))]
  async fn add_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>> {
    let title =
      require_title(args.title.as_deref(), "subtask")?;
    let stamp = self.timestamp();
    let mut state = self.enter("add_subtask")?;
    let task = task_mut(&mut state.data, &args.task_id)?;
    task.subtasks.push(SubTask {
      id: format!("sub-{}", Uuid::new_v4()),
      title,
      completed: false
    });
    task.updated_at = stamp;
    Ok(Applied::target(()))
  }

  #[instrument(skip(self, args), fields(task_id = %args.task_id))]
  async fn toggle_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>> {
    let stamp = self.timestamp();
    let mut state = self.enter("toggle_subtask")?;
    let task = task_mut(&mut state.data, &args.task_id)?;
    let sub = subtask_mut(task, subtask_id(&args)?)?;
    sub.completed = !sub.completed;
    task.updated_at = stamp;
    Ok(Applied::target(()))
  }

  #[instrument(skip(self, args), fields(task_id = %args.task_id))]
  async fn delete_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>> {
    let stamp = self.timestamp();
    let mut state = self.enter("delete_subtask")?;
    let task = task_mut(&mut state.data, &args.task_id)?;
    let id = subtask_id(&args)?;
    let before = task.subtasks.len();
    task.subtasks.retain(|sub| sub.id != id);
    if task.subtasks.len() == before {
      return Err(GatewayError::not_found("subtask", id));
    }
    task.updated_at = stamp;
    Ok(Applied::target(()))
  }

  #[instrument(skip(self, args), fields(task_id = %args.task_id))]
  async fn update_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>> {
    let title =
      require_title(args.title.as_deref(), "subtask")?;
    let stamp = self.timestamp();
    let mut state = self.enter("update_subtask")?;
    let task = task_mut(&mut state.data, &args.task_id)?;
    subtask_mut(task, subtask_id(&args)?)?.title = title;
    task.updated_at = stamp;
    Ok(Applied::target(()))
  }

  #[instrument(skip(self, args))]
  async fn create_tag(
    &self,
    args: TagCreate
  ) -> GatewayResult<Applied<TagDto>> {
    let name = require_title(Some(args.name.as_str()), "tag")?;
    let mut state = self.enter("create_tag")?;
    let tag = TagDto {
      id: format!("tag-{}", Uuid::new_v4()),
      name,
      color: args.color
    };
    state.data.tags.push(tag.clone());
    Ok(Applied::target(tag))
  }

  #[instrument(skip(self, args), fields(tag_id = %args.id))]
  async fn update_tag(
    &self,
    args: TagUpdateArgs
  ) -> GatewayResult<Applied<TagDto>> {
    let mut state = self.enter("update_tag")?;
    let tag = state
      .data
      .tags
      .iter_mut()
      .find(|tag| tag.id == args.id)
      .ok_or_else(|| {
        GatewayError::not_found("tag", &args.id)
      })?;
    if let Some(name) = args.updates.name {
      tag.name = require_title(Some(name.as_str()), "tag")?;
    }
    if let Some(color) = args.updates.color {
      tag.color = color;
    }
    Ok(Applied::target(tag.clone()))
  }

  #[instrument(skip(self), fields(tag_id = %args.id))]
  async fn delete_tag(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<()>> {
    let mut state = self.enter("delete_tag")?;
    let before = state.data.tags.len();
    state.data.tags.retain(|tag| tag.id != args.id);
    if state.data.tags.len() == before {
      return Err(GatewayError::not_found("tag", args.id));
    }

    let mut stripped = 0usize;
    for task in &mut state.data.tasks {
      let had = task.tags.len();
      task.tags.retain(|tag| *tag != args.id);
      stripped += had - task.tags.len();
    }
    debug!(stripped, "tag removed from tasks");
    Ok(Applied::graph(()))
  }

  #[instrument(skip(self, args))]
  async fn create_project(
    &self,
    args: ProjectCreate
  ) -> GatewayResult<Applied<ProjectDto>> {
    let name = require_title(Some(args.name.as_str()), "project")?;
    let stamp = self.timestamp();
    let mut state = self.enter("create_project")?;
    let project = ProjectDto {
      id: format!("project-{}", Uuid::new_v4()),
      name,
      color: args.color,
      icon: args.icon,
      archived: false,
      created_at: stamp
    };
    state.data.projects.push(project.clone());
    Ok(Applied::target(project))
  }

  #[instrument(skip(self, args), fields(project_id = %args.id))]
  async fn update_project(
    &self,
    args: ProjectUpdateArgs
  ) -> GatewayResult<Applied<ProjectDto>> {
    let mut state = self.enter("update_project")?;
    let project = state
      .data
      .projects
      .iter_mut()
      .find(|project| project.id == args.id)
      .ok_or_else(|| {
        GatewayError::not_found("project", &args.id)
      })?;
    let patch = args.updates;
    if let Some(name) = patch.name {
      project.name =
        require_title(Some(name.as_str()), "project")?;
    }
    if let Some(color) = patch.color {
      project.color = color;
    }
    if let Some(icon) = patch.icon {
      project.icon = icon;
    }
    if let Some(archived) = patch.archived {
      project.archived = archived;
    }
    Ok(Applied::target(project.clone()))
  }

  #[instrument(skip(self), fields(project_id = %args.id))]
  async fn delete_project(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<()>> {
    let mut state = self.enter("delete_project")?;
    let before = state.data.projects.len();
    state
      .data
      .projects
      .retain(|project| project.id != args.id);
    if state.data.projects.len() == before {
      return Err(GatewayError::not_found(
        "project", args.id
      ));
    }

    for task in &mut state.data.tasks {
      if task.project_id.as_deref() == Some(args.id.as_str())
      {
        task.project_id = None;
      }
    }
    Ok(Applied::graph(()))
  }

  /// Moves a task within the members of the
  /// given view; tasks outside the view keep
  /// their slots.
  #[instrument(skip(self))]
  async fn reorder_tasks(
    &self,
    args: ReorderArgs
  ) -> GatewayResult<()> {
    let view =
      ViewSelector::from_parts(&args.view_type, &args.view_id)
        .map_err(GatewayError::Rejected)?;
    let window = DateWindow::new(self.today());
    let mut state = self.enter("reorder_tasks")?;
    let tasks = &mut state.data.tasks;

    let slots: Vec<usize> = tasks
      .iter()
      .enumerate()
      .filter(|(_, task)| matches_view(task, &view, &window))
      .map(|(idx, _)| idx)
      .collect();
    if args.from_index >= slots.len()
      || args.to_index >= slots.len()
    {
      return Err(GatewayError::Rejected(format!(
        "reorder index out of range: {} -> {} of {}",
        args.from_index,
        args.to_index,
        slots.len()
      )));
    }

    let mut members: Vec<TaskDto> = slots
      .iter()
      .map(|&idx| tasks[idx].clone())
      .collect();
    let moved = members.remove(args.from_index);
    members.insert(args.to_index, moved);
    for (slot, task) in slots.into_iter().zip(members) {
      tasks[slot] = task;
    }
    Ok(())
  }

  async fn check_reminders(
    &self
  ) -> GatewayResult<Option<TaskDto>> {
    let now = (self.now)();
    let lead = Duration::minutes(REMINDER_LEAD_MINUTES);
    let mut state = self.enter("check_reminders")?;

    let due = state.data.tasks.iter().find(|task| {
      if task.is_completed()
        || state.reminded.contains(&task.id)
      {
        return false;
      }
      let Some(raw) =
        task.reminder.as_deref().or(task.due_date.as_deref())
      else {
        return false;
      };
      parse_moment(raw, self.tz).is_some_and(|at| {
        let remaining = at - now;
        remaining > Duration::zero() && remaining <= lead
      })
    });

    let Some(task) = due.cloned() else {
      return Ok(None);
    };
    state.reminded.insert(task.id.clone());
    debug!(task_id = %task.id, "reminder due");
    Ok(Some(task))
  }
}
