pub mod buffer;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod filter;
pub mod recorder;
pub mod store;
pub mod watcher;

pub use buffer::*;
pub use error::*;
pub use events::*;
pub use filter::*;
pub use recorder::*;
pub use store::*;
pub use watcher::*;
