//! # rentease-shared
//!
//! Types shared by the RentEase message store and the realtime server:
//! identity newtypes, the JSON wire protocol spoken over the chat socket,
//! and the per-message delivery state machine.

pub mod constants;
pub mod delivery;
pub mod error;
pub mod protocol;
pub mod types;
