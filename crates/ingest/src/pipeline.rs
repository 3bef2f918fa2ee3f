use crate::error::{IngestAborted, IngestError, Result};
use crate::reader::{Header, SourceEncoding, VectorFileReader, WordRecord};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use wordvec_protocol::{IngestMode, Model, ModelFields, ModelRef, VectorInput};
use wordvec_store::{Resolved, StorageService, DEFAULT_BATCH_SIZE};

/// Where a run is (or was, when it failed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Start,
    ReadHeader,
    StreamRecords,
    Flush,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Start => "starting",
            Self::ReadHeader => "reading the header",
            Self::StreamRecords => "reading records",
            Self::Flush => "flushing a batch",
            Self::Done => "done",
            Self::Error => "failed",
        })
    }
}

/// Receives the cumulative stored count after every flush.
pub trait ProgressObserver {
    fn on_progress(&mut self, flushed: u64, expected: u64);
}

impl<F: FnMut(u64, u64)> ProgressObserver for F {
    fn on_progress(&mut self, flushed: u64, expected: u64) {
        self(flushed, expected);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOptions {
    pub mode: IngestMode,
    pub batch_size: usize,
    /// Names the model when the reference is [`ModelRef::Absent`]; usually the file stem.
    pub source_label: Option<String>,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            mode: IngestMode::default(),
            batch_size: DEFAULT_BATCH_SIZE,
            source_label: None,
        }
    }
}

impl IngestOptions {
    #[must_use]
    pub fn with_mode(mut self, mode: IngestMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_source_label(mut self, label: impl Into<String>) -> Self {
        self.source_label = Some(label.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    /// The model after reconciliation with the file header.
    pub model: Model,
    pub header: Header,
    pub encoding: SourceEncoding,
    pub created: u64,
    pub updated: u64,
    pub flushed: u64,
    pub elapsed_ms: u64,
}

/// Streams a vector file into a store in committed batches.
pub struct IngestPipeline<'o> {
    options: IngestOptions,
    observer: Option<&'o mut dyn ProgressObserver>,
}

struct Run<'s> {
    service: &'s mut dyn StorageService,
    stage: Stage,
    created: u64,
    updated: u64,
    flushed: u64,
}

impl<'o> IngestPipeline<'o> {
    #[must_use]
    pub fn new(options: IngestOptions) -> Self {
        Self {
            options,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'o mut dyn ProgressObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Ingest the file at `path`; its stem names the model when `model` is absent.
    pub fn run_path(
        mut self,
        service: &mut dyn StorageService,
        model: &ModelRef,
        path: &Path,
    ) -> std::result::Result<IngestReport, IngestAborted> {
        if self.options.source_label.is_none() {
            self.options.source_label = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned());
        }
        let file = File::open(path).map_err(|err| IngestAborted {
            stage: Stage::Start,
            flushed: 0,
            cause: IngestError::Io(err),
        })?;
        self.run(service, model, file)
    }

    pub fn run<R: Read>(
        mut self,
        service: &mut dyn StorageService,
        model: &ModelRef,
        source: R,
    ) -> std::result::Result<IngestReport, IngestAborted> {
        let started = Instant::now();
        let mut run = Run {
            service,
            stage: Stage::Start,
            created: 0,
            updated: 0,
            flushed: 0,
        };
        match self.drive(&mut run, model, source, started) {
            Ok(report) => Ok(report),
            Err(cause) => {
                let stage = run.stage;
                run.stage = Stage::Error;
                if let Err(err) = run.service.rollback() {
                    log::warn!("rollback after failed ingestion also failed: {err}");
                }
                log::error!(
                    "ingestion failed while {stage} after {} vectors: {cause}",
                    run.flushed
                );
                Err(IngestAborted {
                    stage,
                    flushed: run.flushed,
                    cause,
                })
            }
        }
    }

    fn drive<R: Read>(
        &mut self,
        run: &mut Run<'_>,
        model: &ModelRef,
        source: R,
        started: Instant,
    ) -> Result<IngestReport> {
        run.stage = Stage::ReadHeader;
        let (encoding, mut reader) = VectorFileReader::open(source)?;
        let header = reader.header();
        log::debug!(
            "{encoding} input declares {} words of dimension {}",
            header.word_count,
            header.dim
        );

        run.stage = Stage::StreamRecords;
        let batch_size = self.options.batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut reconciled: Option<Model> = None;
        while let Some(record) = reader.next_record()? {
            batch.push(record);
            if batch.len() == batch_size {
                let target = self.target(run, &mut reconciled, model, header)?;
                self.flush(run, &target, &mut batch, header)?;
                run.stage = Stage::StreamRecords;
            }
        }
        let model = match reconciled {
            Some(model) => model,
            None => self.reconcile(run, model, header)?,
        };
        if batch.is_empty() {
            run.service.commit()?;
        } else {
            self.flush(run, &ModelRef::Id(model.id), &mut batch, header)?;
        }

        run.stage = Stage::Done;
        if run.flushed != header.word_count {
            log::warn!(
                "header declared {} words but {} were stored",
                header.word_count,
                run.flushed
            );
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        log::info!(
            "stored {} vectors for model '{}' ({} new, {} updated) in {elapsed_ms} ms",
            run.flushed,
            model.name,
            run.created,
            run.updated
        );
        Ok(IngestReport {
            model,
            header,
            encoding,
            created: run.created,
            updated: run.updated,
            flushed: run.flushed,
            elapsed_ms,
        })
    }

    /// The model reference batches are written to, reconciled on first use.
    fn target(
        &self,
        run: &mut Run<'_>,
        reconciled: &mut Option<Model>,
        model: &ModelRef,
        header: Header,
    ) -> Result<ModelRef> {
        if let Some(existing) = reconciled.as_ref() {
            return Ok(ModelRef::Id(existing.id));
        }
        let found = self.reconcile(run, model, header)?;
        let target = ModelRef::Id(found.id);
        *reconciled = Some(found);
        Ok(target)
    }

    /// Create the target if needed and bring its shape in line with the header.
    /// Runs once the first batch has parsed, so its writes share that batch's commit.
    fn reconcile(&self, run: &mut Run<'_>, model: &ModelRef, header: Header) -> Result<Model> {
        run.stage = Stage::Flush;
        let reconciled = match run.service.resolve_model_ref(model)? {
            Resolved::Existing(existing) => {
                if existing.params.num_words == Some(header.word_count)
                    && existing.params.dim == Some(header.dim)
                {
                    existing
                } else {
                    log::info!(
                        "model '{}' shape changes to {} x {}",
                        existing.name,
                        header.word_count,
                        header.dim
                    );
                    let shape = ModelFields::default().with_shape(header.word_count, header.dim);
                    run.service
                        .update_model(&ModelRef::Id(existing.id), &shape)?
                }
            }
            // Ids are store-assigned, so an unknown id cannot be created.
            missing @ Resolved::Missing(_) if matches!(model, ModelRef::Id(_)) => {
                missing.require(model)?
            }
            Resolved::Missing(mut fields) => {
                if fields.name.is_none() {
                    fields.name = self.options.source_label.clone();
                }
                if fields.name.is_none() {
                    return Err(IngestError::MissingModelName);
                }
                let fields = fields.with_shape(header.word_count, header.dim);
                run.service.create_model(&fields)?
            }
        };
        log::info!(
            "ingesting {} vectors into model '{}' ({} mode)",
            header.word_count,
            reconciled.name,
            self.options.mode.as_str()
        );
        Ok(reconciled)
    }

    fn flush(
        &mut self,
        run: &mut Run<'_>,
        target: &ModelRef,
        batch: &mut Vec<WordRecord>,
        header: Header,
    ) -> Result<()> {
        run.stage = Stage::Flush;
        let records = std::mem::take(batch);
        let (created, updated) = match self.options.mode {
            IngestMode::Force => {
                let inputs: Vec<VectorInput> = records
                    .into_iter()
                    .map(|r| VectorInput::from_values(r.word, r.values))
                    .collect();
                run.service.create_vectors(target, &inputs)?;
                (inputs.len() as u64, 0)
            }
            IngestMode::Merge => {
                let inputs = collapse_duplicates(records);
                let words: Vec<String> = inputs.iter().map(|i| i.word.clone()).collect();
                let existing: HashSet<String> = run
                    .service
                    .get_words(target, Some(&words), true)?
                    .into_iter()
                    .collect();
                let (updates, creates): (Vec<_>, Vec<_>) =
                    inputs.into_iter().partition(|i| existing.contains(&i.word));
                if !creates.is_empty() {
                    run.service.create_vectors(target, &creates)?;
                }
                if !updates.is_empty() {
                    run.service.update_vectors(target, &updates)?;
                }
                (creates.len() as u64, updates.len() as u64)
            }
        };
        run.service.commit()?;

        run.created += created;
        run.updated += updated;
        run.flushed += created + updated;
        log::debug!(
            "flushed batch: {created} new, {updated} updated, {} total",
            run.flushed
        );
        if let Some(observer) = self.observer.as_deref_mut() {
            observer.on_progress(run.flushed, header.word_count);
        }
        Ok(())
    }
}

/// Keep one input per word: the last occurrence, at the position of the first.
fn collapse_duplicates(records: Vec<WordRecord>) -> Vec<VectorInput> {
    let mut positions: HashMap<String, usize> = HashMap::with_capacity(records.len());
    let mut inputs: Vec<VectorInput> = Vec::with_capacity(records.len());
    for record in records {
        match positions.get(&record.word) {
            Some(&index) => {
                log::debug!(
                    "line {}: word '{}' repeats within a batch; keeping the later values",
                    record.line,
                    record.word
                );
                inputs[index] = VectorInput::from_values(record.word, record.values);
            }
            None => {
                positions.insert(record.word.clone(), inputs.len());
                inputs.push(VectorInput::from_values(record.word, record.values));
            }
        }
    }
    inputs
}

/// Convenience wrapper: ingest `source` with default options plus `mode`.
pub fn ingest<R: Read>(
    service: &mut dyn StorageService,
    model: &ModelRef,
    source: R,
    mode: IngestMode,
) -> std::result::Result<IngestReport, IngestAborted> {
    IngestPipeline::new(IngestOptions::default().with_mode(mode)).run(service, model, source)
}
