//! Domain model module declarations.

pub mod lock;
pub mod role;
pub mod session;

pub use lock::LockRecord;
pub use role::{Role, RoleInfo, RoleSource};
pub use session::{HookInput, HookSource, SessionRecord};
