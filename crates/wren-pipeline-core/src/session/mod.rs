pub mod registry;

pub use registry::{
    SessionEntry, SessionId, SessionRegistry, SessionRegistryConfig, SessionSnapshot, TurnRecord,
};
