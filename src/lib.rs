pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use application::{agent, chat, tooling};
pub use domain::types;
pub use infrastructure::model;
