use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use log::info;
use std::{fs, net::SocketAddr, path::PathBuf, sync::Arc};
use vigil::{App, VigilConfig};
use vigil_core::util::timestamp_id;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Configuration file
    #[arg(long, default_value = "vigil.yaml")]
    config: PathBuf,

    /// Directory of log files, logs go to stderr if omitted
    #[arg(long)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the training pipeline
    Train,

    /// Score a batch with the latest model
    Predict {
        /// Local path or http(s) URL of the batch
        source: String,
    },

    /// Serve the pipelines over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, default_value = "0.0.0.0:8080")]
        addr: SocketAddr,
    },

    /// Write the default configuration
    InitConfig {
        /// Output file
        #[arg(default_value = "vigil.yaml")]
        path: PathBuf,
    },
}

fn init_logger(log_dir: Option<&PathBuf>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(dir) = log_dir {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("log_{}.log", timestamp_id(Local::now())));
        let file = fs::File::create(&path)
            .with_context(|| format!("Failed to create log file {:?}", path))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

fn load_config(path: &PathBuf) -> Result<VigilConfig> {
    if path.exists() {
        VigilConfig::load(path).with_context(|| format!("Failed to load {:?}", path))
    } else {
        info!("{:?} not found, using the default configuration", path);
        Ok(VigilConfig::default())
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logger(args.log_dir.as_ref())?;

    match args.command {
        Command::InitConfig { path } => {
            VigilConfig::default().save(&path)?;
            info!("Wrote {:?}", path);
        }
        Command::Train => {
            let app = App::new(load_config(&args.config)?);
            app.run_training()?;
        }
        Command::Predict { source } => {
            let app = App::new(load_config(&args.config)?);
            let outcome = app.run_prediction(&source)?;
            println!("{}", outcome.message());
        }
        Command::Serve { addr } => {
            let app = Arc::new(App::new(load_config(&args.config)?));
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(vigil_server::serve(addr, app));
        }
    }
    Ok(())
}
