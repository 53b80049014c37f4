pub mod config;
pub mod error;
pub mod mailbox;
pub mod net;
pub mod protocol;
pub mod util;
