pub mod align;
pub mod block;
pub mod error;

pub use align::BLOCK_SIZE;
pub use block::{DataBlockIndex, StreamRange};
pub use error::{Error, Result};
