#[macro_use]
extern crate anyhow;

pub mod iterator;
pub mod point;
pub mod value;
