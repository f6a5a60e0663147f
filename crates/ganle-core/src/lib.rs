pub mod app;
pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod memory;
pub mod notify;
pub mod reminder;
mod schedule;
pub mod views;

pub use app::AppContext;
pub use cache::{
  CacheHandle,
  EntityCache
};
pub use clock::{
  Clock,
  ClockHandle
};
pub use config::ClientConfig;
pub use coordinator::{
  MutationCoordinator,
  MutationKind,
  NewTask,
  ReconcilePolicy,
  Reconciled
};
pub use error::{
  GatewayError,
  GatewayResult
};
pub use gateway::{
  Applied,
  BackendGateway,
  EffectScope,
  SharedGateway
};
pub use memory::{
  MemoryBackend,
  MemorySnapshot
};
pub use notify::{
  DesktopNotifier,
  Notifier,
  TracingNotifier
};
pub use reminder::{
  AlertState,
  ReminderPoller,
  ReminderScheduler
};
pub use views::{
  ViewCounts,
  ViewEngine,
  ViewSnapshot
};
