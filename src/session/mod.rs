//! Session token resolution, persistence, and the hook handshake.

pub mod hook;
pub mod resolver;
pub mod store;

pub use hook::{read_hook_input, read_stdin_hook_input};
pub use resolver::{
    resolve_hook_session, resolve_session_id, ResolvedSession, SessionOrigin, SessionSources,
};
pub use store::{persist_everywhere, persist_session, read_session};
