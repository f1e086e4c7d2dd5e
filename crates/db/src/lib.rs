//! Persistence for the Task Master backend.
//!
//! - [`medium`] -- durable media (local CSV file, remote repository file,
//!   PostgreSQL table, in-memory) behind the [`DurableMedium`] trait.
//! - [`store`] -- the versioned record store: optimistic compare-and-swap
//!   writes with bounded retry on version conflicts.
//! - [`repositories`] -- project and user operations built on the store.

pub mod medium;
pub mod repositories;
pub mod store;

pub use medium::{Dataset, DurableMedium, MediumError, StoredTable};
pub use store::{Change, Listing, StoreConfig, VersionedStore};

use taskmaster_core::project::Project;
use taskmaster_core::user::User;

/// The `projects` dataset.
pub const PROJECTS: Dataset = Dataset::of::<Project>("projects");

/// The `users` dataset.
pub const USERS: Dataset = Dataset::of::<User>("users");
