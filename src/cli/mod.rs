//! Command-line front end for the `petpal` binary

pub mod commands;
pub mod ui;
pub mod util;

pub use ui::Output;
pub use util::{CommandContext, OutputFormat};
