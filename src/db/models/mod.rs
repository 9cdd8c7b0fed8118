//! Database models split into domain-specific modules.

pub mod athlete;
pub mod session;
pub mod tag;
pub mod user;

pub use athlete::*;
pub use session::*;
pub use tag::*;
pub use user::*;
