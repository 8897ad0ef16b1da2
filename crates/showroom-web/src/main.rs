//! Showroom - native entry point

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use anyhow::{Context, Result};
    use clap::Parser;
    use std::path::PathBuf;
    use tracing::{info, warn, Level};
    use tracing_subscriber::FmtSubscriber;

    use showroom_core::DemoConfig;

    #[derive(Parser, Debug)]
    #[command(name = "showroom")]
    #[command(about = "Car showroom with bloom, reflections and an animated grid")]
    #[command(version)]
    struct Args {
        /// Path to configuration file
        #[arg(short, long, default_value = "showroom.toml")]
        config: PathBuf,

        /// Model to load instead of the configured one
        #[arg(short, long)]
        model: Option<String>,

        /// Log level (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
    }

    pub fn main() -> Result<()> {
        let args = Args::parse();

        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;

        info!("Showroom v{}", env!("CARGO_PKG_VERSION"));

        let mut config = if args.config.exists() {
            DemoConfig::load(&args.config)
                .with_context(|| format!("loading {}", args.config.display()))?
        } else {
            warn!("No config at {}, using defaults", args.config.display());
            DemoConfig::default()
        };

        if let Some(model) = args.model {
            config.model.path = model;
        }
        config.validate()?;

        info!(
            model = %config.model.path,
            capture = config.capture.resolution,
            "Configuration loaded"
        );

        showroom_web::app::run(config);
        Ok(())
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn main() -> anyhow::Result<()> {
    native::main()
}

#[cfg(target_arch = "wasm32")]
fn main() {}
