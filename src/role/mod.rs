//! Role resolution from directory layout and declared overrides.

pub mod declared;
pub mod resolver;
pub mod rules;

pub use declared::{agent_env, parse_declared_role, DeclaredRole, RoleOverride};
pub use resolver::{detect_from_path, resolve_role, role_home};
pub use rules::{classify, PathMatch};
