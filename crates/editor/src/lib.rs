// folio-editor: the post editing session.
//
// Draft state, slug/excerpt auto-derivation, autosave scheduling and the
// save/publish workflow, driven by a tokio task per open draft.

pub mod autosave;
pub mod config;
pub mod debounce;
pub mod derive;
pub mod draft;
pub mod error;
pub mod persistence;
pub mod runtime;
pub mod session;
pub mod workflow;

pub use config::EditorConfig;
pub use draft::{DraftField, DraftSessionState, FieldUpdate};
pub use error::SessionError;
pub use persistence::{MemoryPostStore, PersistenceError, PostStore};
pub use runtime::{spawn_session, SaveStatus, SessionEvent, SessionHandle};
