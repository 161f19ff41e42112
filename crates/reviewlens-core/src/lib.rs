pub mod catalog;
pub mod config;
pub mod error;
pub mod extract;
pub mod inference;
pub mod insights;
pub mod join;
pub mod outputs;
pub mod pipelines;
pub mod publish;
pub mod sentiment;
pub mod transform;

pub use reviewlens_parser::{MalformedLinePolicy, SkippedLine};
