//! Domain definitions.

pub mod activity_log;
pub mod declaration;
pub mod month;
pub mod user;

pub use self::declaration::Declaration;
