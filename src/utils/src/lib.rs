#[macro_use]
extern crate anyhow;

pub mod fs;
pub mod time;
pub mod varint;
