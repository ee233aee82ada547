//! Dashboard session: one actor task owning both reconcilers.
//!
//! All collection mutation happens inside the actor's event loop, so the
//! reconcilers need no locking. Presentation code talks to the session
//! through a cloneable handle: imperative entry points go over a command
//! channel, reads come from a watch channel of immutable snapshots.

pub mod actor;
pub mod commands;
pub mod handle;

pub use actor::{DashboardSnapshot, SessionActor, SessionConfig};
pub use commands::SessionCommand;
pub use handle::SessionHandle;
