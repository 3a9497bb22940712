pub mod compress;
pub mod config;
pub mod error;
pub mod generate;
pub mod logging;
pub mod pipeline;
pub mod prompts;
pub mod rewrite;
pub mod scanner;

pub use config::{CliArgs, JobConfig, load_env_files};
pub use error::PipelineError;
pub use generate::{ImageGenerator, UnconfiguredGenerator, VertexImagen};
pub use logging::{LoggingConfig, init_logging};
pub use pipeline::{JobReport, run_job};
