//! `Tasklist` core: the ordered task list mutation engine.
//!
//! [`TaskRepository`] owns persisted tasks and relationships behind a
//! per-user filter and keeps attachment storage in step with them through
//! a [`BlobStore`]. [`TaskActions`] is the facade consumers call: it
//! resolves the current user through an [`IdentityProvider`], delegates,
//! and signals [`ChangeNotifier`] subscribers after every successful
//! mutation. [`ListSession`] is the client-side interaction state that
//! turns local edits into facade calls.

pub mod actions;
pub mod blob;
pub mod db;
pub mod error;
pub mod identity;
pub mod notify;
pub mod repository;
pub mod session;

pub use actions::TaskActions;
pub use blob::{BlobError, BlobLocator, BlobStore, FsBlobStore, MemoryBlobStore};
pub use db::{Database, DatabaseError};
pub use error::TaskError;
pub use identity::{IdentityProvider, StaticIdentity};
pub use notify::ChangeNotifier;
pub use repository::TaskRepository;
pub use session::{ListSession, Mode, PendingMutation, SessionError};
