//! Error handling for the UGLC pipeline. Every kind is fatal at the
//! process level; there is no local recovery.

use thiserror::Error;

use crate::config::DeviceType;
use crate::hit::{ChannelId, ModuleId};

pub type Result<T> = std::result::Result<T, UglcError>;

#[derive(Error, Debug)]
pub enum UglcError {
    /// A stream alleged to be monotonic delivered a time regression.
    #[error("out of order hit at {stage}: last {last_channel} t={last_time}, current {channel} t={time}, dt={}", .last_time - .time)]
    OutOfOrder {
        stage: String,
        last_channel: ChannelId,
        last_time: i64,
        channel: ChannelId,
        time: i64,
    },

    /// A demultiplexer received a hit for a key it was not plumbed for.
    #[error("{stage}: channel {channel} is not plumbed")]
    UnknownChannel { stage: String, channel: ChannelId },

    /// A sorter was asked for an input it was not plumbed for.
    #[error("{stage} not plumbed for {key}")]
    NotPlumbed { stage: String, key: String },

    #[error("duplicate end of stream at {stage}")]
    DuplicateEos { stage: String },

    #[error("enqueue after end of stream at {stage}")]
    EnqueueAfterEos { stage: String },

    /// The accumulator received a hit with no pending frame.
    #[error("hit from {channel} at t={raw_time} has no pending frame")]
    OrphanHit { channel: ChannelId, raw_time: i64 },

    /// The accumulator received a hit predating the earliest pending frame.
    #[error("hit from {channel} at t={raw_time} predates frame {frame_id} starting at t={t_start}")]
    HitPredatesFrame {
        frame_id: String,
        channel: ChannelId,
        raw_time: i64,
        t_start: i64,
    },

    #[error("end of stream with {pending} pending frames, expected exactly one")]
    EosPendingMismatch { pending: usize },

    #[error("frame {frame_id} contains no pulses")]
    DeficientFrame { frame_id: String },

    /// The geometry returned a device type the configuration does not cover.
    #[error("module {module}: no coincidence parameters for device type {device:?}")]
    UnsupportedDevice {
        module: ModuleId,
        device: DeviceType,
    },

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
}
