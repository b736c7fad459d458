//! Receive-side talker tracking

pub mod registry;
pub mod talker;

pub use registry::SessionRegistry;
pub use talker::Session;
