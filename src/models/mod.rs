pub mod thread;
pub mod vote;

pub use thread::*;
pub use vote::*;
