//! CLI commands implementation

pub mod apply;
pub mod catalog;
pub mod init;
pub mod items;
pub mod status;

pub use apply::*;
pub use catalog::*;
pub use init::*;
pub use items::*;
pub use status::*;
