//! Domain operations layered on the versioned store.

pub mod project_repo;
pub mod user_repo;

pub use project_repo::ProjectRepo;
pub use user_repo::UserRepo;
