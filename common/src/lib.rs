#![warn(clippy::all, clippy::correctness)]
#![warn(rust_2018_idioms)]
#![allow(clippy::missing_errors_doc, clippy::must_use_candidate)]

pub mod config;
pub mod error;
pub mod logging;
pub mod media;
pub mod utils;

#[macro_use]
extern crate log;

pub use error::{RialtoError, RialtoResult};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
