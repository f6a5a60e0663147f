//! The only channel through which the
//! client reads or mutates durable state.

use std::sync::Arc;

use async_trait::async_trait;
use ganle_shared::{
  IdArg,
  ProjectCreate,
  ProjectDto,
  ProjectUpdateArgs,
  ReorderArgs,
  SettingsDto,
  SettingsUpdate,
  SubtaskArgs,
  TagCreate,
  TagDto,
  TagUpdateArgs,
  TaskCreate,
  TaskDto,
  TaskUpdateArgs,
  WindowMode
};

use crate::error::GatewayResult;

/// How far a confirmed mutation reached
/// inside the backend.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum EffectScope {
  /// Only the addressed entity changed.
  Target,
  /// Other entities may have changed too
  /// (repeat regeneration, cascading
  /// reference removal).
  Graph
}

/// A confirmed mutation response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<T> {
  pub value: T,
  pub scope: EffectScope
}

impl<T> Applied<T> {
  pub fn target(value: T) -> Self {
    Self {
      value,
      scope: EffectScope::Target
    }
  }

  pub fn graph(value: T) -> Self {
    Self {
      value,
      scope: EffectScope::Graph
    }
  }

  pub fn invalidates_graph(&self) -> bool {
    self.scope == EffectScope::Graph
  }
}

#[async_trait]
pub trait BackendGateway: Send + Sync {
  async fn get_all_tasks(
    &self
  ) -> GatewayResult<Vec<TaskDto>>;

  async fn get_all_projects(
    &self
  ) -> GatewayResult<Vec<ProjectDto>>;

  async fn get_all_tags(
    &self
  ) -> GatewayResult<Vec<TagDto>>;

  async fn get_settings(
    &self
  ) -> GatewayResult<SettingsDto>;

  async fn update_settings(
    &self,
    args: SettingsUpdate
  ) -> GatewayResult<()>;

  async fn set_window_mode(
    &self,
    mode: WindowMode
  ) -> GatewayResult<()>;

  async fn create_task(
    &self,
    args: TaskCreate
  ) -> GatewayResult<Applied<TaskDto>>;

  async fn update_task(
    &self,
    args: TaskUpdateArgs
  ) -> GatewayResult<Applied<TaskDto>>;

  async fn toggle_task_status(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<TaskDto>>;

  async fn toggle_favorite(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<TaskDto>>;

  async fn delete_task(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<()>>;

  async fn add_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>>;

  async fn toggle_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>>;

  async fn delete_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>>;

  async fn update_subtask(
    &self,
    args: SubtaskArgs
  ) -> GatewayResult<Applied<()>>;

  async fn create_tag(
    &self,
    args: TagCreate
  ) -> GatewayResult<Applied<TagDto>>;

  async fn update_tag(
    &self,
    args: TagUpdateArgs
  ) -> GatewayResult<Applied<TagDto>>;

  async fn delete_tag(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<()>>;

  async fn create_project(
    &self,
    args: ProjectCreate
  ) -> GatewayResult<Applied<ProjectDto>>;

  async fn update_project(
    &self,
    args: ProjectUpdateArgs
  ) -> GatewayResult<Applied<ProjectDto>>;

  async fn delete_project(
    &self,
    args: IdArg
  ) -> GatewayResult<Applied<()>>;

  async fn reorder_tasks(
    &self,
    args: ReorderArgs
  ) -> GatewayResult<()>;

  /// At most one task whose reminder is
  /// due right now.
  async fn check_reminders(
    &self
  ) -> GatewayResult<Option<TaskDto>>;
}

pub type SharedGateway =
  Arc<dyn BackendGateway>;
