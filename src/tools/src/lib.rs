#[macro_use]
extern crate anyhow;

pub mod command;
pub mod errlist;
pub mod error;
pub mod format;
pub mod importer;
