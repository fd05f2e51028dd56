//! Stream combinators used by the console event loop

pub mod debounce;

pub use debounce::{Debounce, DebounceExt};
