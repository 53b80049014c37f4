pub mod endpoint;
pub mod inbound;
pub mod outbound;
