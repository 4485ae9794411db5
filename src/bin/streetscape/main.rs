mod args;
mod input;
mod validators;

use anyhow::Result;
use args::Args;
use streetscape::{pipeline, Config};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let dry_run = args.dry_run;
    let segments = input::load_segments(&args.segments)?;
    let config: Config = args.into();

    if dry_run {
        let plan = pipeline::plan(&config, &segments)?;

        eprintln!(
            "would look up {} grid points and download up to {} images (approx {}, assuming 40 kb per image)",
            plan.grid_points,
            plan.max_images,
            pretty_bytes::converter::convert((plan.max_images as f64) * 40_000f64)
        );

        Ok(())
    } else {
        let outcome = pipeline::run(&config, &segments).await?;
        input::write_reports(&config.output_folder, &outcome)?;

        println!("{}", serde_json::to_string_pretty(&outcome.summary())?);
        Ok(())
    }
}
