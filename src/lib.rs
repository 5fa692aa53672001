//! GridGate - Effective-permission resolution and data shaping for
//! multi-tenant table platforms
//!
//! Organizations contain bases, bases contain tables, tables contain
//! typed columns and rows. GridGate decides, per (user, base, table,
//! action), whether the action is allowed at all, which rows and columns
//! the caller may see, and which individual cells are locked, then
//! enforces all of that when shaping query results and accepting writes.

pub mod engine;

pub use engine::api::{create_router, ApiState};
pub use engine::config::Config;
pub use engine::context::PermContext;
pub use engine::error::{DenyReason, EngineError};
pub use engine::policy::Action;
pub use engine::resolver::{resolve_effective_perms, ResolvedPerms};
pub use engine::shape::{CellShaper, ShapedRow, REDACTION_MARKER};
pub use engine::store::MemoryStore;
