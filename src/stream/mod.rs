pub mod accumulator;
pub mod lines;
pub mod relay;
pub mod sequencer;
pub mod sse;

pub use accumulator::{DeltaAccumulator, Phase};
pub use lines::DataLineDecoder;
pub use relay::{collect_turn, failed_turn_frames, upstream_bytes, TurnRelay, UpstreamBytes};
pub use sequencer::EventSequencer;
pub use sse::SseEncoder;
