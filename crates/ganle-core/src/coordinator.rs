//! Every write path of the client.
//!
//! A mutation is a backend call followed by a
//! cache reconciliation. How the cache is
//! reconciled is decided by the operation's
//! [`ReconcilePolicy`], escalated to a full
//! refetch when the backend reports that the
//! mutation reached beyond its target.
//!
//! Failures are logged and swallowed: the
//! interface observes them only as a change
//! that never shows up. Each operation
//! returns a [`Reconciled`] status so callers
//! and tests can see what happened.

use ganle_shared::{
  IdArg,
  ProjectCreate,
  ProjectPatch,
  ProjectUpdateArgs,
  ReorderArgs,
  RepeatRule,
  SettingsUpdate,
  SubtaskArgs,
  TagCreate,
  TagPatch,
  TagUpdateArgs,
  TaskCreate,
  TaskDto,
  TaskPatch,
  TaskPriority,
  TaskUpdateArgs,
  WindowMode
};
use tracing::{
  debug,
  error,
  info,
  instrument,
  warn
};

use crate::cache::{
  CacheHandle,
  EntityCache,
  Placement
};
use crate::clock::ClockHandle;
use crate::error::{
  GatewayError,
  GatewayResult
};
use crate::gateway::{
  Applied,
  EffectScope,
  SharedGateway
};
use crate::views;

const DARK_MODE_SETTING: &str = "isDark";

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum ReconcilePolicy {
  /// Cache changes first; the backend call
  /// follows and its failure is not rolled
  /// back.
  ImmediateLocal,
  /// Cache changes only with the entity the
  /// backend returned.
  ConfirmThenLocal,
  /// Cache reloads the task list after the
  /// backend confirmed.
  ConfirmThenRefetch
}

impl ReconcilePolicy {
  pub fn escalate(
    self,
    scope: EffectScope
  ) -> Self {
    match (self, scope) {
      | (ReconcilePolicy::ImmediateLocal, _) => {
        ReconcilePolicy::ImmediateLocal
      }
      | (_, EffectScope::Graph) => {
        ReconcilePolicy::ConfirmThenRefetch
      }
      | (policy, EffectScope::Target) => policy
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash,
)]
pub enum MutationKind {
  CreateTask,
  UpdateTask,
  SetTaskRepeat,
  ToggleStatus,
  ToggleFavorite,
  DeleteTask,
  AddSubtask,
  ToggleSubtask,
  DeleteSubtask,
  UpdateSubtask,
  CreateTag,
  UpdateTag,
  DeleteTag,
  CreateProject,
  UpdateProject,
  DeleteProject,
  Reorder,
  ReorderByIds,
  ToggleTheme,
  ToggleMinimalMode
}

impl MutationKind {
  /// Baseline reconciliation per operation.
  pub const fn policy(self) -> ReconcilePolicy {
    use MutationKind::*;
    use ReconcilePolicy::*;

    match self {
      | CreateTask | UpdateTask
      | ToggleFavorite | DeleteTask
      | CreateTag | UpdateTag
      | CreateProject | UpdateProject => {
        ConfirmThenLocal
      }
      | SetTaskRepeat | ToggleStatus
      | AddSubtask | ToggleSubtask
      | DeleteSubtask | UpdateSubtask
      | DeleteTag | DeleteProject => {
        ConfirmThenRefetch
      }
      | Reorder | ReorderByIds
      | ToggleTheme | ToggleMinimalMode => {
        ImmediateLocal
      }
    }
  }

  pub const fn name(self) -> &'static str {
    use MutationKind::*;

    match self {
      | CreateTask => "create_task",
      | UpdateTask => "update_task",
      | SetTaskRepeat => "set_task_repeat",
      | ToggleStatus => "toggle_task_status",
      | ToggleFavorite => "toggle_favorite",
      | DeleteTask => "delete_task",
      | AddSubtask => "add_subtask",
      | ToggleSubtask => "toggle_subtask",
      | DeleteSubtask => "delete_subtask",
      | UpdateSubtask => "update_subtask",
      | CreateTag => "create_tag",
      | UpdateTag => "update_tag",
      | DeleteTag => "delete_tag",
      | CreateProject => "create_project",
      | UpdateProject => "update_project",
      | DeleteProject => "delete_project",
      | Reorder => "reorder_tasks",
      | ReorderByIds => "reorder_by_ids",
      | ToggleTheme => "toggle_theme",
      | ToggleMinimalMode => {
        "toggle_minimal_mode"
      }
    }
  }
}

/// What a mutation did to the cache.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum Reconciled {
  /// Applied locally without waiting for the
  /// backend, and the backend acknowledged.
  Local,
  Upserted,
  Removed,
  Refetched,
  /// Nothing to do: index out of range, or
  /// the entity is no longer cached.
  Skipped,
  /// Local state moved ahead of the backend.
  Diverged,
  /// The backend call failed; the cache was
  /// left untouched.
  Aborted
}

/// Input for [`MutationCoordinator::create_task`].
/// Project and tag default from the current
/// view.
#[derive(Debug, Clone, Default)]
pub struct NewTask {
  pub title:    String,
  pub due_date: Option<String>,
  pub priority: TaskPriority,
  pub tag_id:   Option<String>,
  pub repeat:   RepeatRule
}

impl NewTask {
  pub fn titled(title: impl Into<String>) -> Self {
    Self {
      title: title.into(),
      ..Self::default()
    }
  }

  pub fn due(mut self, due: impl Into<String>) -> Self {
    self.due_date = Some(due.into());
    self
  }

  pub fn repeating(mut self, repeat: RepeatRule) -> Self {
    self.repeat = repeat;
    self
  }
}

#[derive(Clone)]
pub struct MutationCoordinator {
  gateway: SharedGateway,
  cache:   CacheHandle,
  clock:   ClockHandle
}

impl MutationCoordinator {
  pub fn new(
    gateway: SharedGateway,
    cache: CacheHandle,
    clock: ClockHandle
  ) -> Self {
    Self {
      gateway,
      cache,
      clock
    }
  }

  pub fn cache(&self) -> &CacheHandle {
    &self.cache
  }

  /// Loads tasks, projects, tags and
  /// settings concurrently and swaps them in
  /// together.
  #[instrument(skip(self))]
  pub async fn load_all(&self) -> Reconciled {
    let loaded = tokio::try_join!(
      self.gateway.get_all_tasks(),
      self.gateway.get_all_projects(),
      self.gateway.get_all_tags(),
      self.gateway.get_settings()
    );

    match loaded {
      | Ok((tasks, projects, tags, settings)) => {
        info!(
          tasks = tasks.len(),
          projects = projects.len(),
          tags = tags.len(),
          is_dark = settings.is_dark,
          "loaded state from backend"
        );
        self.cache.update(|cache| {
          cache.replace_tasks(tasks);
          cache.replace_projects(projects);
          cache.replace_tags(tags);
          cache.settings = settings;
          cache.diverged = false;
        });
        Reconciled::Refetched
      }
      | Err(err) => {
        error!(error = %err, "failed to load state from backend");
        Reconciled::Aborted
      }
    }
  }

  /// Reloads everything, discarding local
  /// changes the backend never acknowledged.
  pub async fn resync(&self) -> Reconciled {
    self.load_all().await
  }

  #[instrument(skip(self, task), fields(title_len = task.title.len()))]
  pub async fn create_task(
    &self,
    task: NewTask
  ) -> Reconciled {
    let view = self
      .cache
      .read(|cache| cache.current_view.clone());
    let args = TaskCreate {
      title:      task.title,
      due_date:   task.due_date,
      priority:   task.priority,
      project_id: view.project_id().map(str::to_string),
      tag_id:     task
        .tag_id
        .or_else(|| view.tag_id().map(str::to_string)),
      repeat:     task.repeat
    };

    let result = self.gateway.create_task(args).await;
    self
      .reconcile_task(
        MutationKind::CreateTask,
        result,
        |cache, task| {
          cache.upsert_task(task, Placement::Front);
          true
        }
      )
      .await
  }

  #[instrument(skip(self, updates))]
  pub async fn update_task(
    &self,
    id: &str,
    updates: TaskPatch
  ) -> Reconciled {
    let result = self
      .gateway
      .update_task(TaskUpdateArgs {
        id: id.to_string(),
        updates
      })
      .await;
    self
      .reconcile_task(
        MutationKind::UpdateTask,
        result,
        EntityCache::replace_task
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn set_task_repeat(
    &self,
    id: &str,
    repeat: RepeatRule
  ) -> Reconciled {
    let result = self
      .gateway
      .update_task(TaskUpdateArgs {
        id:      id.to_string(),
        updates: TaskPatch {
          repeat: Some(repeat),
          ..TaskPatch::default()
        }
      })
      .await;
    self
      .reconcile_task(
        MutationKind::SetTaskRepeat,
        result,
        EntityCache::replace_task
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn toggle_status(
    &self,
    id: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .toggle_task_status(id_arg(id))
      .await;
    self
      .reconcile_task(
        MutationKind::ToggleStatus,
        result,
        EntityCache::replace_task
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn toggle_favorite(
    &self,
    id: &str
  ) -> Reconciled {
    let result =
      self.gateway.toggle_favorite(id_arg(id)).await;
    self
      .reconcile_task(
        MutationKind::ToggleFavorite,
        result,
        EntityCache::replace_task
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn delete_task(
    &self,
    id: &str
  ) -> Reconciled {
    let result =
      self.gateway.delete_task(id_arg(id)).await;
    self
      .reconcile_removal(
        MutationKind::DeleteTask,
        result,
        |cache| cache.remove_task(id).is_some()
      )
      .await
  }

  #[instrument(skip(self, title))]
  pub async fn add_subtask(
    &self,
    task_id: &str,
    title: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .add_subtask(SubtaskArgs {
        task_id:    task_id.to_string(),
        subtask_id: None,
        title:      Some(title.to_string())
      })
      .await;
    self
      .reconcile_removal(
        MutationKind::AddSubtask,
        result,
        |_| false
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn toggle_subtask(
    &self,
    task_id: &str,
    subtask_id: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .toggle_subtask(subtask_arg(task_id, subtask_id, None))
      .await;
    self
      .reconcile_removal(
        MutationKind::ToggleSubtask,
        result,
        |_| false
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn delete_subtask(
    &self,
    task_id: &str,
    subtask_id: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .delete_subtask(subtask_arg(task_id, subtask_id, None))
      .await;
    self
      .reconcile_removal(
        MutationKind::DeleteSubtask,
        result,
        |_| false
      )
      .await
  }

  #[instrument(skip(self, title))]
  pub async fn update_subtask(
    &self,
    task_id: &str,
    subtask_id: &str,
    title: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .update_subtask(subtask_arg(
        task_id,
        subtask_id,
        Some(title)
      ))
      .await;
    self
      .reconcile_removal(
        MutationKind::UpdateSubtask,
        result,
        |_| false
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn create_tag(
    &self,
    name: &str,
    color: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .create_tag(TagCreate {
        name:  name.to_string(),
        color: color.to_string()
      })
      .await;
    self
      .reconcile_entity(
        MutationKind::CreateTag,
        result,
        |cache, tag| {
          cache.upsert_tag(tag);
          true
        }
      )
      .await
  }

  #[instrument(skip(self, updates))]
  pub async fn update_tag(
    &self,
    id: &str,
    updates: TagPatch
  ) -> Reconciled {
    let result = self
      .gateway
      .update_tag(TagUpdateArgs {
        id: id.to_string(),
        updates
      })
      .await;
    self
      .reconcile_entity(
        MutationKind::UpdateTag,
        result,
        EntityCache::replace_tag
      )
      .await
  }

  /// The backend strips the tag from every
  /// task, so the task list is reloaded.
  #[instrument(skip(self))]
  pub async fn delete_tag(
    &self,
    id: &str
  ) -> Reconciled {
    let result =
      self.gateway.delete_tag(id_arg(id)).await;
    self
      .reconcile_removal(
        MutationKind::DeleteTag,
        result,
        |cache| cache.remove_tag(id).is_some()
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn create_project(
    &self,
    name: &str,
    color: &str,
    icon: &str
  ) -> Reconciled {
    let result = self
      .gateway
      .create_project(ProjectCreate {
        name:  name.to_string(),
        color: color.to_string(),
        icon:  icon.to_string()
      })
      .await;
    self
      .reconcile_entity(
        MutationKind::CreateProject,
        result,
        |cache, project| {
          cache.upsert_project(project);
          true
        }
      )
      .await
  }

  #[instrument(skip(self, updates))]
  pub async fn update_project(
    &self,
    id: &str,
    updates: ProjectPatch
  ) -> Reconciled {
    let result = self
      .gateway
      .update_project(ProjectUpdateArgs {
        id: id.to_string(),
        updates
      })
      .await;
    self
      .reconcile_entity(
        MutationKind::UpdateProject,
        result,
        EntityCache::replace_project
      )
      .await
  }

  #[instrument(skip(self))]
  pub async fn delete_project(
    &self,
    id: &str
  ) -> Reconciled {
    let result =
      self.gateway.delete_project(id_arg(id)).await;
    self
      .reconcile_removal(
        MutationKind::DeleteProject,
        result,
        |cache| cache.remove_project(id).is_some()
      )
      .await
  }

  /// Moves the task shown at `from_index` of
  /// the visible list to `to_index`.
  ///
  /// The cache is spliced before the backend
  /// hears about it. A failed persistence
  /// call leaves the local order in place and
  /// marks the cache diverged until the next
  /// [`resync`](Self::resync).
  #[instrument(skip(self))]
  pub async fn reorder(
    &self,
    from_index: usize,
    to_index: usize
  ) -> Reconciled {
    let today = self.clock.today();
    let moved = self.cache.update_if(
      |cache| {
        let visible =
          views::visible_positions(cache, today);
        let from = *visible.get(from_index)?;
        let to = *visible.get(to_index)?;
        cache
          .move_task(from, to)
          .then(|| cache.current_view.clone())
      },
      Option::is_some
    );

    let Some(view) = moved else {
      debug!(
        from_index,
        to_index, "reorder index outside visible list"
      );
      return Reconciled::Skipped;
    };

    let args = ReorderArgs {
      from_index,
      to_index,
      view_type: view.kind().to_string(),
      view_id: view.id().to_string()
    };
    let persisted =
      self.gateway.reorder_tasks(args).await;
    self.settle_local(MutationKind::Reorder, persisted)
  }

  /// Local-only reorder: `ordered` tasks move
  /// to the front in that order.
  pub fn reorder_by_ids(
    &self,
    ordered: &[String]
  ) -> Reconciled {
    self
      .cache
      .update(|cache| cache.reorder_by_ids(ordered));
    debug!(
      op = MutationKind::ReorderByIds.name(),
      count = ordered.len(),
      "tasks reordered locally"
    );
    Reconciled::Local
  }

  #[instrument(skip(self))]
  pub async fn toggle_theme(&self) -> Reconciled {
    let is_dark = self.cache.update(|cache| {
      cache.settings.is_dark = !cache.settings.is_dark;
      cache.settings.is_dark
    });
    let persisted = self
      .gateway
      .update_settings(SettingsUpdate {
        key:   DARK_MODE_SETTING.to_string(),
        value: is_dark.to_string()
      })
      .await;
    self.settle_local(MutationKind::ToggleTheme, persisted)
  }

  #[instrument(skip(self))]
  pub async fn toggle_minimal_mode(
    &self
  ) -> Reconciled {
    let minimal = self.cache.update(|cache| {
      cache.minimal_mode = !cache.minimal_mode;
      cache.minimal_mode
    });
    let mode = if minimal {
      WindowMode::Minimal
    } else {
      WindowMode::Standard
    };
    let persisted =
      self.gateway.set_window_mode(mode).await;
    self.settle_local(
      MutationKind::ToggleMinimalMode,
      persisted
    )
  }

  async fn reconcile_task(
    &self,
    kind: MutationKind,
    result: GatewayResult<Applied<TaskDto>>,
    apply: impl FnOnce(&mut EntityCache, TaskDto) -> bool
  ) -> Reconciled {
    let task_id = result
      .as_ref()
      .map(|applied| applied.value.id.clone())
      .unwrap_or_default();
    let reconciled =
      self.reconcile_entity(kind, result, apply).await;
    debug!(op = kind.name(), %task_id, ?reconciled, "task reconciled");
    reconciled
  }

  /// `apply` reports whether the entity landed
  /// in the cache. Updates for entities the
  /// cache no longer holds are dropped.
  async fn reconcile_entity<T>(
    &self,
    kind: MutationKind,
    result: GatewayResult<Applied<T>>,
    apply: impl FnOnce(&mut EntityCache, T) -> bool
  ) -> Reconciled {
    let applied = match result {
      | Ok(applied) => applied,
      | Err(err) => return abort(kind, &err)
    };

    let policy = kind.policy().escalate(applied.scope);
    let landed = self.cache.update_if(
      |cache| apply(cache, applied.value),
      |landed| *landed
    );

    if policy == ReconcilePolicy::ConfirmThenRefetch {
      return self.refetch_tasks(kind).await;
    }
    if landed {
      Reconciled::Upserted
    } else {
      debug!(op = kind.name(), "entity no longer cached; update dropped");
      Reconciled::Skipped
    }
  }

  /// For mutations without a returned
  /// entity. `local` runs first and reports
  /// whether it removed something.
  async fn reconcile_removal(
    &self,
    kind: MutationKind,
    result: GatewayResult<Applied<()>>,
    local: impl FnOnce(&mut EntityCache) -> bool
  ) -> Reconciled {
    let applied = match result {
      | Ok(applied) => applied,
      | Err(err) => return abort(kind, &err)
    };

    let policy = kind.policy().escalate(applied.scope);
    let removed =
      self.cache.update_if(local, |removed| *removed);

    if policy == ReconcilePolicy::ConfirmThenRefetch {
      return self.refetch_tasks(kind).await;
    }
    if removed {
      Reconciled::Removed
    } else {
      Reconciled::Skipped
    }
  }

  async fn refetch_tasks(
    &self,
    kind: MutationKind
  ) -> Reconciled {
    match self.gateway.get_all_tasks().await {
      | Ok(tasks) => {
        let count = tasks.len();
        self
          .cache
          .update(|cache| cache.replace_tasks(tasks));
        debug!(op = kind.name(), count, "task list refetched");
        Reconciled::Refetched
      }
      | Err(err) => {
        error!(
          op = kind.name(),
          error = %err,
          "refetch after confirmed mutation failed"
        );
        self.cache.update(|cache| cache.diverged = true);
        Reconciled::Diverged
      }
    }
  }

  fn settle_local(
    &self,
    kind: MutationKind,
    persisted: GatewayResult<()>
  ) -> Reconciled {
    match persisted {
      | Ok(()) => Reconciled::Local,
      | Err(err) => {
        warn!(
          op = kind.name(),
          error = %err,
          "local change not persisted; keeping it"
        );
        self.cache.update(|cache| cache.diverged = true);
        Reconciled::Diverged
      }
    }
  }
}

fn abort(
  kind: MutationKind,
  err: &GatewayError
) -> Reconciled {
  error!(
    op = kind.name(),
    error = %err,
    "backend call failed; cache unchanged"
  );
  Reconciled::Aborted
}

fn id_arg(id: &str) -> IdArg {
  IdArg { id: id.to_string() }
}

fn subtask_arg(
  task_id: &str,
  subtask_id: &str,
  title: Option<&str>
) -> SubtaskArgs {
  SubtaskArgs {
    task_id:    task_id.to_string(),
    subtask_id: Some(subtask_id.to_string()),
    title:      title.map(str::to_string)
  }
}
