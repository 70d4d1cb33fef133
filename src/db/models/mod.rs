//! Database models split into domain-specific modules.

pub mod audit;
pub mod category;
pub mod import_log;
pub mod permission;
pub mod prayer;
pub mod session;
pub mod suggestion;
pub mod user;

pub use audit::*;
pub use category::*;
pub use import_log::*;
pub use permission::*;
pub use prayer::*;
pub use session::*;
pub use suggestion::*;
pub use user::*;
