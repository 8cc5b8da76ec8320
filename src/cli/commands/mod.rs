pub mod ask;
pub mod breed;
pub mod config;
pub mod names;
pub mod symptoms;

pub(crate) use crate::cli::util::runtime;
