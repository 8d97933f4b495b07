use std::path::PathBuf;
use std::process::ExitCode;

use captioner::client::{CaptionClient, DEFAULT_API};
use clap::Parser;
use log::LevelFilter;

/// Uploads images to a caption server and prints their captions.
#[derive(Debug, Parser)]
#[command(name = "caption-client", version, about)]
struct Cli
{
    /// Base URL of the caption server.
    #[arg(long, env = "CAPTION_API", default_value = DEFAULT_API)]
    api: String,

    /// JPEG or PNG images to caption.
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::Builder::new()
        .filter_level(LevelFilter::Warn)
        .parse_default_env()
        .init();

    let cli = Cli::parse();

    let client = match CaptionClient::new(&cli.api) {
        Ok(client) => client,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut failed = false;
    for image in &cli.images {
        match client.caption_file(image) {
            Ok(caption) if cli.images.len() == 1 => println!("{}", caption),
            Ok(caption) => println!("{}: {}", image.display(), caption),
            Err(e) => {
                eprintln!("{}: {:#}", image.display(), e);
                failed = true;
            }
        }
    }

    if failed { ExitCode::FAILURE } else { ExitCode::SUCCESS }
}
