use clap::Parser;
use h2img::{
    CliArgs, ImageGenerator, JobConfig, LoggingConfig, UnconfiguredGenerator, VertexImagen,
    init_logging, load_env_files, run_job,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();

    // Credentials may live in a .env next to the invocation or inside the
    // keyword folder; load both before resolving the configuration.
    load_env_files(&cli.folder);

    let logging_config = LoggingConfig::from_env();
    let _guard = init_logging(logging_config)?;

    let config = JobConfig::from_args(cli)?;
    config.validate()?;

    let generator: Box<dyn ImageGenerator> =
        match (config.project.as_deref(), config.access_token.as_deref()) {
            (Some(project), Some(token)) => Box::new(VertexImagen::new(
                project,
                token,
                config.location.clone(),
                config.model.clone(),
            )?),
            _ => {
                tracing::warn!(
                    "no generation credentials configured; only fixed or existing images will resolve"
                );
                Box::new(UnconfiguredGenerator)
            }
        };

    let report = run_job(&config, generator.as_ref()).await?;

    tracing::info!(
        sections = report.sections,
        placeholders = report.placeholders,
        generated = report.generated,
        fixed = report.fixed,
        reused = report.reused,
        rewritten = report.rewritten,
        "run complete"
    );

    Ok(())
}
