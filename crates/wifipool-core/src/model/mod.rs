// ── Domain model ──

pub mod channel;
pub mod io_map;

pub use channel::{
    ChannelId, Direction, MAX_INPUT_INDEX, MAX_OUTPUT_INDEX, ParseChannelIdError,
    candidate_channels,
};
pub use io_map::{ChannelClassification, ChannelKind, IoMap, SensorSlot};
