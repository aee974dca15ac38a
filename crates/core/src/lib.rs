pub mod config;
pub mod error;
pub mod message;
pub mod sink;

pub use config::BeastConfig;
pub use error::*;
pub use message::*;
pub use sink::MessageSink;
