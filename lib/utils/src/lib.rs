#![cfg_attr(not(test), no_std)]
extern crate alloc;

pub mod endian;
pub mod handle;
pub mod macros;
pub mod num;
pub mod range;
