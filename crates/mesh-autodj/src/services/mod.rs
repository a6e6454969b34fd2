//! Collaborator services the orchestrator depends on
//!
//! Each is a trait so hosts can plug in their own storage; in-memory and
//! YAML-backed implementations are provided.

mod catalog;
mod history;
mod settings;

pub use catalog::{CatalogFile, StaticCatalog, TrackCatalog};
pub use history::{MemoryHistory, PlayHistoryLog};
pub use settings::{MemorySettingsStore, SettingsStore, YamlSettingsStore};
