//! Core data types shared by the decoders, reducers and callers.

pub mod generation;
pub mod stream;
pub mod usage;

pub use generation::*;
pub use stream::*;
pub use usage::*;
