use crate::config::AppConfig;
use crate::flags::{ModelArgs, ModelFilterArgs};
use crate::output::Output;
use anyhow::{Context as AnyhowContext, Result};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use std::fs::File;
use std::path::PathBuf;
use wordvec_ingest::{IngestMode, IngestOptions, IngestPipeline};
use wordvec_protocol::{Model, ModelRef};
use wordvec_query::ListOptions;
use wordvec_store::{
    with_service, Address, LocalStore, RemoteClient, Resolved, StorageService,
};

#[derive(Args, Debug)]
pub(crate) struct FileArgs {
    /// Word-vector file to store (plain text, gzip or bzip2)
    #[arg(long, short = 'i')]
    input: PathBuf,

    /// Model id or name (defaults to the file name without extension)
    #[arg(long)]
    model: Option<String>,

    /// Create every vector; words already stored fail instead of being updated
    #[arg(long)]
    force: bool,

    /// Send the raw file to a remote store's upload endpoint
    #[arg(long)]
    upload: bool,

    /// Vectors written per committed batch
    #[arg(long)]
    batch_size: Option<usize>,
}

#[derive(Args, Debug)]
pub(crate) struct UpdateArgs {
    /// Model id or name; created when it does not exist
    #[arg(long)]
    model: Option<String>,

    #[command(flatten)]
    fields: ModelArgs,
}

#[derive(Args, Debug)]
pub(crate) struct FindModelsArgs {
    #[command(flatten)]
    filters: ModelFilterArgs,
}

#[derive(Args, Debug)]
pub(crate) struct FindVectorsArgs {
    /// Model id or name
    #[arg(long)]
    model: String,

    /// Words to retrieve (% is a wildcard unless --exact)
    #[arg(long, num_args = 1..)]
    words: Vec<String>,

    /// Match words literally
    #[arg(long)]
    exact: bool,

    /// Return values as a base64 packed blob with its codec tag
    #[arg(long)]
    packed: bool,

    /// Attach the owning model to every vector
    #[arg(long)]
    include_model: bool,

    /// Sort keys, e.g. `word~desc id`
    #[arg(long, num_args = 1..)]
    sort: Vec<String>,

    /// Zero-based page (needs --page-size)
    #[arg(long)]
    page: Option<u64>,

    #[arg(long)]
    page_size: Option<u64>,
}

#[derive(Args, Debug)]
pub(crate) struct ServeArgs {
    /// Bind address, e.g. 127.0.0.1:8080
    #[arg(long)]
    bind: Option<String>,

    /// Allow binding to non-loopback addresses
    #[arg(long)]
    public: bool,
}

pub(crate) fn run_initialize(config: &AppConfig, output: &Output) -> Result<()> {
    let path = match Address::parse(&config.url) {
        Address::Local(path) => path,
        Address::Remote(url) => {
            anyhow::bail!("initialize only applies to local stores; {url} is remote")
        }
        Address::Memory => anyhow::bail!("an in-memory store needs no initialization"),
    };
    let mut store = LocalStore::open(&path, &config.store)
        .with_context(|| format!("Failed to open store at {}", path.display()))?;
    store.close()?;
    log::info!("initialized store at {}", path.display());
    output.write(&json!({ "initialized": path }))
}

pub(crate) fn run_file(args: FileArgs, config: &AppConfig, output: &Output) -> Result<()> {
    let mode = if args.force {
        IngestMode::Force
    } else {
        IngestMode::Merge
    };
    let model = args
        .model
        .as_deref()
        .map(ModelRef::parse)
        .unwrap_or_default();

    if args.upload {
        return upload_file(&args, model, mode, config, output);
    }

    let options = IngestOptions::default()
        .with_mode(mode)
        .with_batch_size(args.batch_size.unwrap_or(config.store.batch_size));
    let bar = config.progress.then(progress_bar);
    let mut report_progress = |flushed: u64, expected: u64| {
        if let Some(bar) = &bar {
            bar.set_length(expected.max(flushed));
            bar.set_position(flushed);
        }
    };

    log::info!("storing vectors from {}", args.input.display());
    let report = with_service(&config.url, &config.store, |service| -> Result<_> {
        let mut pipeline = IngestPipeline::new(options);
        if config.progress {
            pipeline = pipeline.with_observer(&mut report_progress);
        }
        Ok(pipeline.run_path(service, &model, &args.input)?)
    });
    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }
    let report = report?;

    output.write(&json!({
        "model": report.model,
        "encoding": report.encoding.to_string(),
        "word_count": report.header.word_count,
        "dim": report.header.dim,
        "created": report.created,
        "updated": report.updated,
        "stored": report.flushed,
        "elapsed_ms": report.elapsed_ms,
    }))
}

fn progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    let style = ProgressStyle::with_template("{bar:40} {pos}/{len} vectors ({percent}%) {elapsed}")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    bar.set_style(style);
    bar
}

fn upload_file(
    args: &FileArgs,
    model: ModelRef,
    mode: IngestMode,
    config: &AppConfig,
    output: &Output,
) -> Result<()> {
    let Address::Remote(url) = Address::parse(&config.url) else {
        anyhow::bail!("--upload needs a remote store address, got {}", config.url);
    };
    let model = match model {
        ModelRef::Absent => args
            .input
            .file_stem()
            .map(|stem| ModelRef::Name(stem.to_string_lossy().into_owned()))
            .context("--model is required when the input has no file name")?,
        other => other,
    };
    let file = File::open(&args.input)
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let mut client = RemoteClient::connect(&url, &config.store)?;
    let count = client.upload_file(&model, file, mode)?;
    client.close()?;
    output.write(&json!({ "stored": count }))
}

pub(crate) fn run_update(args: UpdateArgs, config: &AppConfig, output: &Output) -> Result<()> {
    let fields = args.fields.into_fields();
    let model = match args.model.as_deref() {
        Some(raw) => ModelRef::parse(raw),
        None => fields.name.clone().map(ModelRef::Name).unwrap_or_default(),
    };

    let saved: Model = with_service(&config.url, &config.store, |service| -> Result<_> {
        match service.resolve_model_ref(&model)? {
            Resolved::Existing(existing) if fields.is_empty() => {
                log::warn!("no fields given; model '{}' left unchanged", existing.name);
                Ok(existing)
            }
            Resolved::Existing(existing) => {
                Ok(service.update_model(&ModelRef::Id(existing.id), &fields)?)
            }
            missing @ Resolved::Missing(_) if matches!(model, ModelRef::Id(_)) => {
                Ok(missing.require(&model)?)
            }
            Resolved::Missing(placeholder) => {
                let mut create = fields.clone();
                if create.name.is_none() {
                    create.name = placeholder.name;
                }
                if create.name.is_none() {
                    anyhow::bail!("--model or --name is required to create a model");
                }
                Ok(service.create_model(&create)?)
            }
        }
    })?;

    log::info!("saved model '{}' (id {})", saved.name, saved.id);
    output.write(&saved)
}

pub(crate) fn run_find_models(args: FindModelsArgs, config: &AppConfig, output: &Output) -> Result<()> {
    let filters = args.filters.into_filters();
    let models = with_service(&config.url, &config.store, |service| -> Result<_> {
        Ok(service.find_models(&filters)?)
    })?;
    log::info!("{} model(s) found", models.len());
    output.write(&models)
}

pub(crate) fn run_find_vectors(args: FindVectorsArgs, config: &AppConfig, output: &Output) -> Result<()> {
    let model = ModelRef::parse(&args.model);
    let options = ListOptions {
        sort: args.sort,
        page: args.page,
        page_size: args.page_size,
        exact: args.exact,
    };
    let words = args.words;
    let include_model = args.include_model;

    let (vectors, owner) = with_service(&config.url, &config.store, |service| -> Result<_> {
        let owner = if include_model {
            Some(service.resolve_model_ref(&model)?.require(&model)?)
        } else {
            None
        };
        let vectors = if words.is_empty() {
            service.get_vectors_for_model(&model, &options)?
        } else {
            service.get_vectors_for_words(&model, &words, &options)?
        };
        Ok((vectors, owner))
    })?;

    let records = vectors
        .iter()
        .map(|vector| {
            let mut record = vector.to_record(args.packed)?;
            record.model.clone_from(&owner);
            Ok(record)
        })
        .collect::<Result<Vec<_>>>()?;
    log::info!("{} vector(s) found", records.len());
    output.write(&records)
}

pub(crate) fn run_serve(args: ServeArgs, config: &AppConfig) -> Result<()> {
    let mut server = config.server.clone();
    if let Some(bind) = args.bind {
        server.bind = bind;
    }
    server.public |= args.public;

    let store: Box<dyn StorageService + Send> = match Address::parse(&config.url) {
        Address::Remote(url) => anyhow::bail!("serve needs a local store, got remote address {url}"),
        Address::Memory => Box::new(LocalStore::in_memory(&config.store)),
        Address::Local(path) => Box::new(
            LocalStore::open(&path, &config.store)
                .with_context(|| format!("Failed to open store at {}", path.display()))?,
        ),
    };

    let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
    runtime.block_on(wordvec_server::serve(store, &server))
}
