pub mod circular_buffer;
pub mod config;
pub mod expiry;
pub mod frame;
pub mod health;
pub mod rate_limit;
pub mod reconnect;
pub mod types;

pub use circular_buffer::*;
pub use config::*;
pub use expiry::*;
pub use frame::*;
pub use health::*;
pub use rate_limit::*;
pub use reconnect::*;
pub use types::*;
