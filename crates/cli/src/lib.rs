use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{FileArgs, FindModelsArgs, FindVectorsArgs, ServeArgs, UpdateArgs};
use config::AppConfig;
use output::Output;
use std::path::PathBuf;
use wordvec_codec::Compression;
use wordvec_store::CommitPolicy;

mod commands;
mod config;
mod flags;
mod output;

#[derive(Parser)]
#[command(name = "wordvec")]
#[command(about = "Store and query word embeddings, locally or over HTTP", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet mode: log only warnings/errors (stdout is reserved for JSON)
    #[arg(long, global = true)]
    quiet: bool,

    /// Config file (default search: $WORDVEC_CONFIG, ./wordvec.toml, ~/.wordvec.toml)
    #[arg(long, global = true)]
    config_path: Option<PathBuf>,

    /// Store address: http(s)://host[:port], memory://, file://<dir> or <dir>
    #[arg(long, global = true)]
    url: Option<String>,

    /// User name for a remote store
    #[arg(long, global = true)]
    username: Option<String>,

    /// Password for a remote store
    #[arg(long, global = true)]
    password: Option<String>,

    /// Compression for newly packed vectors: none, zlib, bz2
    #[arg(long, global = true)]
    compression: Option<Compression>,

    /// Defer commits to the end of each command
    #[arg(long, global = true)]
    manual_commit: bool,

    /// Show a progress bar while storing files
    #[arg(long, global = true)]
    progress: bool,

    /// Write JSON keys in camelCase
    #[arg(long, global = true)]
    camel: bool,

    /// Write JSON output to this file instead of stdout
    #[arg(short = 'o', global = true)]
    out: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an empty local store
    Initialize,

    /// Store the vectors of a word-vector file
    File(FileArgs),

    /// Create a model or update its fields
    Update(UpdateArgs),

    /// Find models matching every given field
    #[command(name = "findmodels")]
    FindModels(FindModelsArgs),

    /// Retrieve vectors of a model
    #[command(name = "findvectors")]
    FindVectors(FindVectorsArgs),

    /// Serve a local store over HTTP
    Serve(ServeArgs),
}

fn init_logging(verbose: bool, quiet: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if quiet {
        builder.filter_level(log::LevelFilter::Warn);
    } else if verbose {
        builder.filter_level(log::LevelFilter::Debug);
    }
    builder.target(env_logger::Target::Stderr).init();
}

/// Flags win over the config file.
fn apply_flags(config: &mut AppConfig, cli: &Cli) {
    if let Some(url) = &cli.url {
        config.url.clone_from(url);
    }
    if let Some(username) = &cli.username {
        config.store.username = Some(username.clone());
    }
    if let Some(password) = &cli.password {
        config.store.password = Some(password.clone());
    }
    if let Some(compression) = cli.compression {
        config.store.compression = compression;
    }
    if cli.manual_commit {
        config.store.commit_policy = CommitPolicy::Manual;
    }
    config.progress |= cli.progress;
    config.camel |= cli.camel;
}

pub fn main_entry() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let (mut config, found) = AppConfig::load(cli.config_path.as_deref())?;
    match &found {
        Some(path) => log::debug!("using config {}", path.display()),
        None => log::debug!("no config file found; using defaults"),
    }
    apply_flags(&mut config, &cli);
    let output = Output {
        path: cli.out.clone(),
        camel: config.camel,
    };

    match cli.command {
        Commands::Initialize => commands::run_initialize(&config, &output),
        Commands::File(args) => commands::run_file(args, &config, &output),
        Commands::Update(args) => commands::run_update(args, &config, &output),
        Commands::FindModels(args) => commands::run_find_models(args, &config, &output),
        Commands::FindVectors(args) => commands::run_find_vectors(args, &config, &output),
        Commands::Serve(args) => commands::run_serve(args, &config),
    }
}
