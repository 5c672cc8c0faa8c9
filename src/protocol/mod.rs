//! Protocol module for parsing and constructing frames.
//!
//! This module contains the implementations for:
//! - Command frame construction (time sync, unit sync)
//! - Notification frame parsing

pub mod commands;
pub mod notification;

pub use commands::{
    encode_time_sync, encode_unit_sync, Command, CommandType, TimeSyncCommand, UnitSyncCommand,
    COMMAND_FRAME_SIZE,
};
pub use notification::{decode_notification, MessageType, NOTIFICATION_FRAME_SIZE};
