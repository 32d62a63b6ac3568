//! Repository mirror cache: identity, status, locking and the manager that
//! ties them together.

pub mod identity;
pub mod locks;
pub mod manager;
pub mod status;
pub mod store;

pub use identity::RepositoryId;
pub use locks::{LockTable, RepoLockGuard};
pub use manager::{AccessError, RepoCacheManager};
pub use status::{Availability, RepoStatus};
pub use store::{GitMirrorStore, MirrorError, MirrorOutcome, MirrorStore};
