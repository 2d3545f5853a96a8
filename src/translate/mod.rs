//! Translation between the turn-based and the flat chat protocol.

pub mod ids;
pub mod request;
pub mod response;

pub use ids::IdGenerator;
pub use request::{translate_request, TranslateOptions};
pub use response::{CompletedToolCall, ResponseDocumentBuilder, TurnOutcome};
