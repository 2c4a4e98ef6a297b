//! Huddle: a signaling relay for establishing WebRTC sessions between
//! clients grouped into named rooms.

pub mod directory;
pub mod notify;
pub mod relay;
