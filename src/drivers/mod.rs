//! Device interfaces used by the system call layer
//!
//! Only the console is reached from user mode, through descriptors 0 and 1.

pub mod console;

pub use console::{Console, ConsoleLock};
