//! On-disk layout of a local store.
//!
//! ```text
//! <data dir>/
//!   store.lock      fs2 exclusive lock, held while the store is open
//!   store.json      snapshot (schema_version, counters, models, vectors)
//!   journal.jsonl   one line per committed transaction since the snapshot
//! ```
//!
//! Journal ops are whole-record upserts, so replaying a journal over a snapshot
//! that already contains its effects leaves the state unchanged.

use crate::error::{Result, StoreError};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use wordvec_protocol::{Model, Vector};

pub const STORE_SCHEMA_VERSION: u32 = 1;

const LOCK_FILE: &str = "store.lock";
const SNAPSHOT_FILE: &str = "store.json";
const JOURNAL_FILE: &str = "journal.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalOp {
    PutModel { model: Model },
    PutVector { vector: Vector },
}

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    seq: u64,
    ops: Vec<JournalOp>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    pub schema_version: u32,
    pub next_model_id: u64,
    pub next_vector_id: u64,
    pub models: Vec<Model>,
    pub vectors: Vec<Vector>,
}

/// What was on disk when the directory was opened.
pub(crate) struct Recovered {
    pub snapshot: Option<Snapshot>,
    pub ops: Vec<JournalOp>,
    pub transactions: u64,
}

pub(crate) struct DataDir {
    root: PathBuf,
    lock: File,
    journal: File,
    seq: u64,
}

impl Drop for DataDir {
    fn drop(&mut self) {
        let _ = self.lock.unlock();
    }
}

impl DataDir {
    pub fn open(root: &Path) -> Result<(Self, Recovered)> {
        fs::create_dir_all(root)?;
        let lock = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(root.join(LOCK_FILE))?;
        if let Err(err) = lock.try_lock_exclusive() {
            if err.raw_os_error() == fs2::lock_contended_error().raw_os_error() {
                return Err(StoreError::Locked {
                    path: root.to_path_buf(),
                });
            }
            return Err(err.into());
        }

        let snapshot = load_snapshot(&root.join(SNAPSHOT_FILE))?;
        let journal_path = root.join(JOURNAL_FILE);
        let (ops, transactions, seq) = replay_journal(&journal_path)?;
        let journal = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&journal_path)?;

        Ok((
            Self {
                root: root.to_path_buf(),
                lock,
                journal,
                seq,
            },
            Recovered {
                snapshot,
                ops,
                transactions,
            },
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Append one transaction and sync it before returning.
    pub fn append(&mut self, ops: &[JournalOp]) -> Result<()> {
        self.append_with(ops, |journal, line| {
            journal.write_all(line)?;
            journal.sync_data()
        })
    }

    /// A failed write is cut back to the previous end, so the journal never holds a torn line
    /// followed by good ones.
    fn append_with<W>(&mut self, ops: &[JournalOp], write: W) -> Result<()>
    where
        W: FnOnce(&mut File, &[u8]) -> std::io::Result<()>,
    {
        let entry = JournalEntry {
            seq: self.seq + 1,
            ops: ops.to_vec(),
        };
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        let end = self.journal.metadata()?.len();
        if let Err(err) = write(&mut self.journal, &line) {
            if let Err(truncate_err) = self.journal.set_len(end) {
                log::warn!(
                    "cannot cut {} back after a failed append: {truncate_err}",
                    self.root.display()
                );
            }
            return Err(err.into());
        }
        self.seq = entry.seq;
        Ok(())
    }

    /// Replace the snapshot with `snapshot` and empty the journal.
    pub fn compact(&mut self, snapshot: &Snapshot) -> Result<()> {
        let path = self.root.join(SNAPSHOT_FILE);
        let tmp = path.with_extension("json.tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(&mut writer, snapshot)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        self.journal.set_len(0)?;
        self.journal.sync_all()?;
        self.seq = 0;
        log::debug!(
            "compacted {} ({} models, {} vectors)",
            self.root.display(),
            snapshot.models.len(),
            snapshot.vectors.len()
        );
        Ok(())
    }
}

#[cfg(test)]
impl DataDir {
    /// Swap the journal handle for a read-only one so appends fail.
    pub(crate) fn make_journal_read_only(&mut self) -> Result<()> {
        self.journal = File::open(self.root.join(JOURNAL_FILE))?;
        Ok(())
    }
}

fn load_snapshot(path: &Path) -> Result<Option<Snapshot>> {
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(path)?;
    let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
    if snapshot.schema_version != STORE_SCHEMA_VERSION {
        return Err(StoreError::Corrupt(format!(
            "unsupported store schema_version {} (expected {STORE_SCHEMA_VERSION})",
            snapshot.schema_version
        )));
    }
    Ok(Some(snapshot))
}

/// Read every complete line. Bytes after the final newline are a torn write and are cut off.
fn replay_journal(path: &Path) -> Result<(Vec<JournalOp>, u64, u64)> {
    if !path.exists() {
        return Ok((Vec::new(), 0, 0));
    }
    let bytes = fs::read(path)?;
    let complete = bytes
        .iter()
        .rposition(|b| *b == b'\n')
        .map_or(0, |pos| pos + 1);

    let mut ops = Vec::new();
    let mut transactions = 0;
    let mut seq = 0;
    for (index, line) in bytes[..complete].split(|b| *b == b'\n').enumerate() {
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        let entry: JournalEntry = serde_json::from_slice(line).map_err(|err| {
            StoreError::Corrupt(format!(
                "{} line {}: {err}",
                path.display(),
                index + 1
            ))
        })?;
        seq = entry.seq;
        transactions += 1;
        ops.extend(entry.ops);
    }

    if complete < bytes.len() {
        log::warn!(
            "discarding {} bytes of incomplete transaction at the end of {}",
            bytes.len() - complete,
            path.display()
        );
        let file = OpenOptions::new().write(true).open(path)?;
        file.set_len(complete as u64)?;
        file.sync_all()?;
    }
    Ok((ops, transactions, seq))
}
