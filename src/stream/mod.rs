pub mod stream;

pub use stream::{Stream, StreamKind};
