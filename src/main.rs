use clap::Parser;
use env_logger::Env;
use log::{debug, error};
use std::path::PathBuf;
use std::process::ExitCode;

use flatten_image::{
    CancelToken, CliEngine, EngineKind, FlattenError, FlattenRequest, Flattener, Notifier,
    VerbosityLevel,
};

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Flatten a container image into a new image with a single layer, copying metadata such as entrypoint and env vars.",
    long_about = None
)]
struct Cli {
    #[arg(help = "Image to flatten (e.g., node:20-alpine)")]
    image: String,

    #[arg(short, long, help = "Tag to apply to the flattened image")]
    tag: Option<String>,

    #[arg(short, long, help = "Suppress informational logging")]
    quiet: bool,

    #[arg(
        short,
        long,
        action = clap::ArgAction::Count,
        conflicts_with = "quiet",
        help = "Verbose mode (-v for debug, -vv for trace)"
    )]
    verbose: u8,

    #[arg(long, help = "Show a progress spinner instead of step-by-step logs")]
    progress: bool,

    #[arg(
        short,
        long,
        value_enum,
        default_value = "docker",
        env = "FLATTEN_IMAGE_ENGINE",
        help = "Container engine to use"
    )]
    engine: EngineKind,

    #[arg(
        long,
        env = "FLATTEN_IMAGE_ENGINE_BIN",
        help = "Path to the engine executable, if not the engine's default binary name"
    )]
    engine_bin: Option<PathBuf>,

    #[arg(
        long,
        env = "FLATTEN_IMAGE_TMPDIR",
        help = "Directory for the temporary filesystem export (defaults to the system temp dir)"
    )]
    tmp_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let verbosity = VerbosityLevel::from_flags(cli.quiet, cli.verbose);
    env_logger::Builder::from_env(Env::default())
        .filter_level(verbosity.to_log_level())
        .init();

    let cancel = CancelToken::new();
    if let Err(e) = cancel.install_ctrlc_handler() {
        error!("{:#}", e);
        return ExitCode::FAILURE;
    }

    debug!("Engine: {:?}", cli.engine);
    let engine = match &cli.engine_bin {
        Some(program) => CliEngine::with_program(cli.engine, program),
        None => CliEngine::new(cli.engine),
    };

    let mut request = FlattenRequest::new(&cli.image);
    if let Some(tag) = &cli.tag {
        request = request.with_tag(tag);
    }
    if let Some(tmp_dir) = &cli.tmp_dir {
        request = request.with_temp_root(tmp_dir);
    }

    let flattener =
        Flattener::new(engine, Notifier::new(verbosity, cli.progress)).with_cancel_token(cancel);

    match flattener.flatten(&request) {
        Ok(outcome) => {
            println!("{}", outcome.image_id);
            ExitCode::SUCCESS
        }
        Err(e) => {
            report(&e, cli.engine);
            ExitCode::from(e.exit_code())
        }
    }
}

fn report(e: &FlattenError, engine: EngineKind) {
    eprintln!("Error: {}", e);
    if let FlattenError::ImageNotFound { .. } = e {
        eprintln!("Did you forget to `{} pull`?", engine.binary());
    }
}
