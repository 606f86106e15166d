//! Core data model.
//!
//! A generation request goes in; a [`MysteryCase`] comes out. Everything in
//! between (blueprint, suspects, determination, content) is produced by the
//! pipeline and owned by one run until it is assembled into a case.

pub mod blueprint;
pub mod case;
pub mod content;
pub mod culprit;
pub mod fingerprint;
pub mod job;
pub mod request;
pub mod suspect;
pub mod time;

pub use blueprint::*;
pub use case::*;
pub use content::*;
pub use culprit::*;
pub use fingerprint::*;
pub use job::*;
pub use request::*;
pub use suspect::*;
pub use time::*;
