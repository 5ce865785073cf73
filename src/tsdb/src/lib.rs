#[macro_use]
extern crate anyhow;

pub mod common;
pub mod config;
pub mod engine;
pub mod index;
pub mod meta;
pub mod series;
mod server;

pub use server::{Server, ShardGroupWriter};
