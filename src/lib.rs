pub mod cache;
pub mod config;
pub mod error;
pub mod join;
pub mod loader;
pub mod normalize;
pub mod output;
pub mod pipeline;
pub mod regression;
pub mod reports;
pub mod schema;
pub mod types;
pub mod unpivot;
pub mod util;

pub use error::{PipelineError, Result};
