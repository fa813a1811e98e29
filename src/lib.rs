#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod app;
pub mod clients;
pub mod config;
pub mod lifecycle;
pub mod observability;
pub mod schema;
pub mod scheduler;
pub mod scoring;
pub mod store;
pub mod util;
