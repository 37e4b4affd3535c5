//! Request handlers.

pub mod cache;
pub mod filters;
pub mod health;
pub mod preview;
pub mod processing;
pub mod proxy;
pub mod videos;

pub use cache::*;
pub use filters::*;
pub use health::*;
pub use preview::*;
pub use processing::*;
pub use proxy::*;
pub use videos::*;
