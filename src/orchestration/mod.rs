//! Hierarchy subsystem: workspace identity, persisted Context/Stack, and
//! startup reconciliation.
//!
//! [`registry::HierarchyRegistry`] hands out one [`manager::HierarchyManager`]
//! per workspace; [`cleaner::clean_before_start`] runs before each top-level
//! execution.

pub mod cleaner;
pub mod manager;
pub mod registry;
pub mod types;
pub mod workspace;

pub use cleaner::{CleanReport, clean_before_start};
pub use manager::HierarchyManager;
pub use registry::HierarchyRegistry;
pub use workspace::WorkspaceKey;
