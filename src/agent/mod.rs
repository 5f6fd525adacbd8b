pub mod http_client;
pub mod interface;

pub use http_client::HttpAgentClient;
pub use interface::*;
