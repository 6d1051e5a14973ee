// Public modules
pub mod engine;
pub mod message;
pub mod safety_policy;
pub mod stream_chunk;

// Re-exports
pub use engine::{Engine, EngineFeatures, EngineParseError, Transport};
pub use message::{Message, REASONING_LABEL, Role, RoleParseError, conversation_turns};
pub use safety_policy::{SafetyPolicy, SafetyPolicyParseError};
pub use stream_chunk::StreamChunk;
