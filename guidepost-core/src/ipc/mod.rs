//! Serialisable types leaving the engine.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so hosts can
//! forward them to a UI, a log file, or a socket without translation.

pub mod events;
