use crate::config::{CommitPolicy, ServiceConfig};
use crate::error::{Result, StoreError};
use crate::journal::{DataDir, JournalOp, Snapshot, STORE_SCHEMA_VERSION};
use crate::service::{validate_model_name, StorageService};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use wordvec_codec::Compression;
use wordvec_protocol::{Model, ModelFields, ModelKey, ModelRef, Vector, VectorInput};
use wordvec_query::{
    word_predicate, FieldValue, FilterSet, ListOptions, Predicate, Query, MODEL_SCHEMA,
};

/// Indexed in-memory records; the source of truth while a store is open.
#[derive(Debug, Default)]
struct State {
    next_model_id: u64,
    next_vector_id: u64,
    models: BTreeMap<u64, Model>,
    names: HashMap<String, u64>,
    vectors: BTreeMap<u64, Vector>,
    /// model id -> word -> vector id
    words: HashMap<u64, BTreeMap<String, u64>>,
}

impl State {
    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut state = Self {
            next_model_id: snapshot.next_model_id,
            next_vector_id: snapshot.next_vector_id,
            ..Self::default()
        };
        for model in snapshot.models {
            state.put_model(model);
        }
        for vector in snapshot.vectors {
            state.put_vector(vector);
        }
        state
    }

    fn to_snapshot(&self) -> Snapshot {
        Snapshot {
            schema_version: STORE_SCHEMA_VERSION,
            next_model_id: self.next_model_id,
            next_vector_id: self.next_vector_id,
            models: self.models.values().cloned().collect(),
            vectors: self.vectors.values().cloned().collect(),
        }
    }

    fn apply(&mut self, op: JournalOp) {
        match op {
            JournalOp::PutModel { model } => {
                self.put_model(model);
            }
            JournalOp::PutVector { vector } => {
                self.put_vector(vector);
            }
        }
    }

    fn allocate_model_id(&mut self) -> u64 {
        let id = self.next_model_id.max(1);
        self.next_model_id = id + 1;
        id
    }

    fn allocate_vector_id(&mut self) -> u64 {
        let id = self.next_vector_id.max(1);
        self.next_vector_id = id + 1;
        id
    }

    fn put_model(&mut self, model: Model) -> Option<Model> {
        self.next_model_id = self.next_model_id.max(model.id + 1);
        self.names.insert(model.name.clone(), model.id);
        let previous = self.models.insert(model.id, model);
        if let Some(previous) = &previous {
            if self.names.get(&previous.name) == Some(&previous.id)
                && self.models.get(&previous.id).map(|m| &m.name) != Some(&previous.name)
            {
                self.names.remove(&previous.name);
            }
        }
        previous
    }

    fn remove_model(&mut self, id: u64) {
        if let Some(model) = self.models.remove(&id) {
            self.names.remove(&model.name);
        }
    }

    fn put_vector(&mut self, vector: Vector) -> Option<Vector> {
        self.next_vector_id = self.next_vector_id.max(vector.id + 1);
        let previous = self.vectors.insert(vector.id, vector.clone());
        if let Some(previous) = &previous {
            if previous.word != vector.word || previous.model_id != vector.model_id {
                self.unindex_vector(previous);
            }
        }
        self.words
            .entry(vector.model_id)
            .or_default()
            .insert(vector.word, vector.id);
        previous
    }

    fn remove_vector(&mut self, id: u64) {
        if let Some(vector) = self.vectors.remove(&id) {
            self.unindex_vector(&vector);
        }
    }

    fn unindex_vector(&mut self, vector: &Vector) {
        if let Some(words) = self.words.get_mut(&vector.model_id) {
            if words.get(&vector.word) == Some(&vector.id) {
                words.remove(&vector.word);
            }
        }
    }

    fn lookup(&self, key: &ModelKey) -> Option<&Model> {
        match key {
            ModelKey::Id(id) => self.models.get(id),
            ModelKey::Name(name) => self.names.get(name).and_then(|id| self.models.get(id)),
        }
    }

    fn word_id(&self, model_id: u64, word: &str) -> Option<u64> {
        self.words.get(&model_id)?.get(word).copied()
    }

    /// Words of a model in sorted order, paired with their vector ids.
    fn model_words(&self, model_id: u64) -> impl Iterator<Item = (&str, u64)> {
        self.words
            .get(&model_id)
            .into_iter()
            .flat_map(|words| words.iter().map(|(w, id)| (w.as_str(), *id)))
    }
}

#[derive(Debug)]
enum Undo {
    Model { id: u64, previous: Option<Model> },
    Vector { id: u64, previous: Option<Vector> },
}

/// Single-connection store over a locked data directory (or purely in memory).
pub struct LocalStore {
    label: String,
    state: State,
    storage: Option<DataDir>,
    in_memory: bool,
    pending: Vec<JournalOp>,
    undo: Vec<Undo>,
    saved_counters: Option<(u64, u64)>,
    policy: CommitPolicy,
    compression: Compression,
    closed: bool,
}

impl LocalStore {
    /// Open (creating if needed) the store in `root`, replaying its journal.
    pub fn open(root: impl AsRef<Path>, config: &ServiceConfig) -> Result<Self> {
        let root = root.as_ref();
        let (storage, recovered) = DataDir::open(root)?;
        let mut state = recovered
            .snapshot
            .map(State::from_snapshot)
            .unwrap_or_default();
        for op in recovered.ops {
            state.apply(op);
        }
        log::info!(
            "opened local store {} ({} models, {} vectors, {} journaled transactions)",
            root.display(),
            state.models.len(),
            state.vectors.len(),
            recovered.transactions
        );
        Ok(Self::with_state(
            root.display().to_string(),
            state,
            Some(storage),
            config,
        ))
    }

    /// Same semantics as [`Self::open`], nothing persisted.
    #[must_use]
    pub fn in_memory(config: &ServiceConfig) -> Self {
        Self::with_state("memory://".to_string(), State::default(), None, config)
    }

    fn with_state(
        label: String,
        state: State,
        storage: Option<DataDir>,
        config: &ServiceConfig,
    ) -> Self {
        Self {
            label,
            state,
            in_memory: storage.is_none(),
            storage,
            pending: Vec::new(),
            undo: Vec::new(),
            saved_counters: None,
            policy: config.commit_policy,
            compression: config.compression,
            closed: false,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Number of writes not yet committed.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        self.pending.len()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(StoreError::Closed);
        }
        Ok(())
    }

    fn require_model(&self, model: &ModelRef) -> Result<Model> {
        let Some(key) = model.key() else {
            return Err(StoreError::NotFound("model reference is empty".to_string()));
        };
        self.state
            .lookup(&key)
            .cloned()
            .ok_or_else(|| StoreError::model_not_found(key))
    }

    fn begin(&mut self) {
        if self.saved_counters.is_none() {
            self.saved_counters = Some((self.state.next_model_id, self.state.next_vector_id));
        }
    }

    fn write_model(&mut self, model: Model) {
        self.begin();
        let id = model.id;
        let previous = self.state.put_model(model.clone());
        self.undo.push(Undo::Model { id, previous });
        self.pending.push(JournalOp::PutModel { model });
    }

    fn write_vector(&mut self, vector: Vector) {
        self.begin();
        let id = vector.id;
        let previous = self.state.put_vector(vector.clone());
        self.undo.push(Undo::Vector { id, previous });
        self.pending.push(JournalOp::PutVector { vector });
    }

    fn finish_write(&mut self) -> Result<()> {
        match self.policy {
            CommitPolicy::Auto => self.commit().or_else(|err| {
                if let Err(rollback_err) = self.rollback() {
                    log::warn!("rollback after failed commit also failed: {rollback_err}");
                }
                Err(err)
            }),
            CommitPolicy::Manual => Ok(()),
        }
    }

    fn words_matching<'a>(
        &'a self,
        model_id: u64,
        predicate: Option<&'a Predicate>,
    ) -> impl Iterator<Item = (&'a str, u64)> + 'a {
        self.state.model_words(model_id).filter(move |(word, _)| {
            predicate.map_or(true, |p| p.matches(Some(FieldValue::Text(*word))))
        })
    }

    fn collect_vectors(&self, ids: impl Iterator<Item = u64>) -> Vec<Vector> {
        ids.filter_map(|id| self.state.vectors.get(&id).cloned())
            .collect()
    }
}

impl Drop for LocalStore {
    fn drop(&mut self) {
        if !self.closed && !self.pending.is_empty() {
            log::warn!(
                "dropping {} uncommitted writes to {}",
                self.pending.len(),
                self.label
            );
        }
    }
}

impl StorageService for LocalStore {
    fn backend(&self) -> &'static str {
        if self.in_memory {
            "memory"
        } else {
            "local"
        }
    }

    fn lookup_model(&mut self, key: &ModelKey) -> Result<Option<Model>> {
        self.ensure_open()?;
        Ok(self.state.lookup(key).cloned())
    }

    fn create_model(&mut self, fields: &ModelFields) -> Result<Model> {
        self.ensure_open()?;
        let name = fields
            .name
            .as_deref()
            .ok_or_else(|| StoreError::BadRequest("model name is required".to_string()))?;
        validate_model_name(name)?;
        if self.state.names.contains_key(name) {
            return Err(StoreError::Conflict(format!("model '{name}' already exists")));
        }
        self.begin();
        let id = self.state.allocate_model_id();
        let model = Model::from_fields(id, fields)
            .ok_or_else(|| StoreError::BadRequest("model name is required".to_string()))?;
        self.write_model(model.clone());
        self.finish_write()?;
        log::info!("created model '{}' (id {id})", model.name);
        Ok(model)
    }

    fn update_model(&mut self, model: &ModelRef, fields: &ModelFields) -> Result<Model> {
        self.ensure_open()?;
        let current = self.require_model(model)?;
        if let Some(name) = fields.name.as_deref().filter(|n| *n != current.name) {
            validate_model_name(name)?;
            if self.state.names.contains_key(name) {
                return Err(StoreError::Conflict(format!("model '{name}' already exists")));
            }
        }
        let mut updated = current.clone();
        updated.apply(fields);
        if updated == current {
            return Ok(current);
        }
        self.write_model(updated.clone());
        self.finish_write()?;
        log::debug!("updated model '{}' (id {})", updated.name, updated.id);
        Ok(updated)
    }

    fn find_models(&mut self, filters: &FilterSet) -> Result<Vec<Model>> {
        self.ensure_open()?;
        let query = Query::compile(&MODEL_SCHEMA, filters)?;
        Ok(self
            .state
            .models
            .values()
            .filter(|m| query.matches(*m))
            .cloned()
            .collect())
    }

    fn create_vectors(&mut self, model: &ModelRef, inputs: &[VectorInput]) -> Result<Vec<Vector>> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        let mut seen = HashSet::with_capacity(inputs.len());
        for input in inputs {
            if input.word.is_empty() {
                return Err(StoreError::BadRequest("vector word must not be empty".to_string()));
            }
            if self.state.word_id(model.id, &input.word).is_some()
                || !seen.insert(input.word.as_str())
            {
                return Err(StoreError::Conflict(format!(
                    "word '{}' already exists in model '{}'",
                    input.word, model.name
                )));
            }
        }
        let packed = inputs
            .iter()
            .map(|input| input.to_packed(self.compression))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let mut created = Vec::with_capacity(inputs.len());
        for (input, (packed_values, codec)) in inputs.iter().zip(packed) {
            self.begin();
            let vector = Vector {
                id: self.state.allocate_vector_id(),
                model_id: model.id,
                word: input.word.clone(),
                packed_values,
                codec,
            };
            self.write_vector(vector.clone());
            created.push(vector);
        }
        self.finish_write()?;
        log::debug!("created {} vectors for model '{}'", created.len(), model.name);
        Ok(created)
    }

    fn update_vectors(&mut self, model: &ModelRef, inputs: &[VectorInput]) -> Result<Vec<Vector>> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        let mut planned = Vec::with_capacity(inputs.len());
        for input in inputs {
            let id = self.state.word_id(model.id, &input.word).ok_or_else(|| {
                StoreError::NotFound(format!(
                    "word '{}' does not exist in model '{}'",
                    input.word, model.name
                ))
            })?;
            let (packed_values, codec) = input.to_packed(self.compression)?;
            planned.push(Vector {
                id,
                model_id: model.id,
                word: input.word.clone(),
                packed_values,
                codec,
            });
        }
        for vector in &planned {
            self.write_vector(vector.clone());
        }
        self.finish_write()?;
        log::debug!("updated {} vectors for model '{}'", planned.len(), model.name);
        Ok(planned)
    }

    fn get_words(
        &mut self,
        model: &ModelRef,
        words: Option<&[String]>,
        exact: bool,
    ) -> Result<Vec<String>> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        let predicate = match words {
            Some(words) => word_predicate(words, exact)?,
            None => None,
        };
        Ok(self
            .words_matching(model.id, predicate.as_ref())
            .map(|(word, _)| word.to_string())
            .collect())
    }

    fn count_vectors_for_model(&mut self, model: &ModelRef) -> Result<u64> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        Ok(self.state.words.get(&model.id).map_or(0, |w| w.len() as u64))
    }

    fn count_vectors_for_words(
        &mut self,
        model: &ModelRef,
        words: &[String],
        exact: bool,
    ) -> Result<u64> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        let predicate = word_predicate(words, exact)?;
        Ok(self.words_matching(model.id, predicate.as_ref()).count() as u64)
    }

    fn get_vectors_for_model(
        &mut self,
        model: &ModelRef,
        options: &ListOptions,
    ) -> Result<Vec<Vector>> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        let vectors = self.collect_vectors(self.state.model_words(model.id).map(|(_, id)| id));
        Ok(options.apply(vectors)?)
    }

    fn get_vectors_for_words(
        &mut self,
        model: &ModelRef,
        words: &[String],
        options: &ListOptions,
    ) -> Result<Vec<Vector>> {
        self.ensure_open()?;
        let model = self.require_model(model)?;
        let predicate = word_predicate(words, options.exact)?;
        let vectors = self.collect_vectors(
            self.words_matching(model.id, predicate.as_ref())
                .map(|(_, id)| id),
        );
        Ok(options.apply(vectors)?)
    }

    fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.pending.is_empty() {
            return Ok(());
        }
        if let Some(storage) = self.storage.as_mut() {
            storage.append(&self.pending)?;
        }
        log::debug!("committed {} writes to {}", self.pending.len(), self.label);
        self.pending.clear();
        self.undo.clear();
        self.saved_counters = None;
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        self.ensure_open()?;
        let discarded = self.undo.len();
        while let Some(undo) = self.undo.pop() {
            match undo {
                Undo::Model { id, previous } => {
                    self.state.remove_model(id);
                    if let Some(previous) = previous {
                        self.state.put_model(previous);
                    }
                }
                Undo::Vector { id, previous } => {
                    self.state.remove_vector(id);
                    if let Some(previous) = previous {
                        self.state.put_vector(previous);
                    }
                }
            }
        }
        if let Some((next_model_id, next_vector_id)) = self.saved_counters.take() {
            self.state.next_model_id = next_model_id;
            self.state.next_vector_id = next_vector_id;
        }
        self.pending.clear();
        if discarded > 0 {
            log::info!("rolled back {discarded} writes to {}", self.label);
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.commit()?;
        self.closed = true;
        if let Some(mut storage) = self.storage.take() {
            storage.compact(&self.state.to_snapshot())?;
            log::info!("closed local store {}", storage.root().display());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;
    use wordvec_protocol::ErrorKind;

    fn memory() -> LocalStore {
        LocalStore::in_memory(&ServiceConfig::default())
    }

    fn input(word: &str, values: &[f64]) -> VectorInput {
        VectorInput::from_values(word, values.to_vec())
    }

    #[test]
    fn model_names_are_unique_and_never_all_digits() {
        let mut store = memory();
        let m1 = store.create_model(&ModelFields::named("m1")).unwrap();
        assert_eq!(m1.id, 1);
        let err = store.create_model(&ModelFields::named("m1")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = store.create_model(&ModelFields::named("123")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
        let err = store.create_model(&ModelFields::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn references_resolve_by_id_name_or_record() {
        let mut store = memory();
        let model = store.create_model(&ModelFields::named("m1")).unwrap();
        assert!(store.model_exists(&ModelRef::Id(model.id)).unwrap());
        assert!(store.model_exists(&ModelRef::from("m1")).unwrap());
        assert!(store.model_exists(&ModelRef::from(&model)).unwrap());
        assert!(!store.model_exists(&ModelRef::from("m2")).unwrap());
        assert!(!store.model_exists(&ModelRef::Absent).unwrap());

        let err = store
            .update_model(&ModelRef::from("m2"), &ModelFields::default())
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn renaming_frees_the_old_name() {
        let mut store = memory();
        store.create_model(&ModelFields::named("old")).unwrap();
        let renamed = store
            .update_model(&ModelRef::from("old"), &ModelFields::named("new"))
            .unwrap();
        assert_eq!(renamed.name, "new");
        assert!(!store.model_exists(&ModelRef::from("old")).unwrap());
        assert!(store.model_exists(&ModelRef::from("new")).unwrap());
        store.create_model(&ModelFields::named("old")).unwrap();
    }

    #[test]
    fn vector_words_are_unique_per_model() {
        let mut store = memory();
        store.create_model(&ModelFields::named("m1")).unwrap();
        store.create_model(&ModelFields::named("m2")).unwrap();
        let m1 = ModelRef::from("m1");

        store
            .create_vectors(&m1, &[input("foo", &[1.0]), input("bar", &[2.0])])
            .unwrap();
        let err = store.create_vectors(&m1, &[input("foo", &[3.0])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        let err = store
            .create_vectors(&m1, &[input("baz", &[3.0]), input("baz", &[4.0])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);
        // Nothing from the rejected batches was written.
        assert_eq!(store.count_vectors_for_model(&m1).unwrap(), 2);

        // Same word in another model is fine.
        store
            .create_vectors(&ModelRef::from("m2"), &[input("foo", &[9.0])])
            .unwrap();

        let err = store.update_vectors(&m1, &[input("qux", &[1.0])]).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        let err = store
            .create_vectors(&ModelRef::from("nope"), &[input("a", &[1.0])])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn updates_keep_ids_and_replace_payloads() {
        let mut store = memory();
        store.create_model(&ModelFields::named("m")).unwrap();
        let m = ModelRef::from("m");
        let created = store.create_vectors(&m, &[input("foo", &[1.0, 2.0])]).unwrap();
        let updated = store.update_vectors(&m, &[input("foo", &[5.0, 6.0])]).unwrap();
        assert_eq!(updated[0].id, created[0].id);

        let stored = store
            .get_vectors_for_words(&m, &["foo".to_string()], &ListOptions::default().exact(true))
            .unwrap();
        assert_eq!(stored[0].values().unwrap(), vec![5.0, 6.0]);
    }

    #[test]
    fn word_listing_is_sorted_and_filterable() {
        let mut store = memory();
        store.create_model(&ModelFields::named("m")).unwrap();
        let m = ModelRef::from("m");
        store
            .create_vectors(
                &m,
                &["sing", "apple", "ring", "ingot"].map(|w| input(w, &[0.0])),
            )
            .unwrap();

        assert_eq!(
            store.get_words(&m, None, false).unwrap(),
            vec!["apple", "ingot", "ring", "sing"]
        );
        let ing = vec!["%ing".to_string()];
        assert_eq!(store.get_words(&m, Some(&ing), false).unwrap(), vec!["ring", "sing"]);
        assert!(store.get_words(&m, Some(&ing), true).unwrap().is_empty());
        assert_eq!(store.count_vectors_for_words(&m, &ing, false).unwrap(), 2);
    }

    #[test]
    fn rollback_discards_uncommitted_writes() {
        let config = ServiceConfig::default().with_commit_policy(CommitPolicy::Manual);
        let mut store = LocalStore::in_memory(&config);
        store.create_model(&ModelFields::named("kept")).unwrap();
        store.commit().unwrap();

        store.create_model(&ModelFields::named("dropped")).unwrap();
        store
            .update_model(&ModelRef::from("kept"), &ModelFields::named("renamed"))
            .unwrap();
        assert_eq!(store.pending_writes(), 2);
        store.rollback().unwrap();

        assert!(store.model_exists(&ModelRef::from("kept")).unwrap());
        assert!(!store.model_exists(&ModelRef::from("renamed")).unwrap());
        assert!(!store.model_exists(&ModelRef::from("dropped")).unwrap());
        // Ids handed out inside the rolled back transaction are reused.
        assert_eq!(store.create_model(&ModelFields::named("next")).unwrap().id, 2);
    }

    #[test]
    fn failed_auto_commits_are_rolled_back() {
        let tmp = TempDir::new().unwrap();
        let mut store = LocalStore::open(tmp.path(), &ServiceConfig::default()).unwrap();
        store.create_model(&ModelFields::named("kept")).unwrap();

        store
            .storage
            .as_mut()
            .unwrap()
            .make_journal_read_only()
            .unwrap();
        let err = store.create_model(&ModelFields::named("lost")).unwrap_err();
        assert!(matches!(err, StoreError::Io(_)), "{err}");
        assert_eq!(store.pending_writes(), 0);
        assert!(!store.model_exists(&ModelRef::from("lost")).unwrap());
        assert!(store.model_exists(&ModelRef::from("kept")).unwrap());
    }

    #[test]
    fn committed_state_survives_reopen_without_close() {
        let tmp = TempDir::new().unwrap();
        let config = ServiceConfig::default();
        {
            let mut store = LocalStore::open(tmp.path(), &config).unwrap();
            store.create_model(&ModelFields::named("m")).unwrap();
            store
                .create_vectors(&ModelRef::from("m"), &[input("foo", &[1.5])])
                .unwrap();
            // Dropped without close: only the journal holds the data.
        }
        let mut store = LocalStore::open(tmp.path(), &config).unwrap();
        let vectors = store
            .get_vectors_for_model(&ModelRef::from("m"), &ListOptions::default())
            .unwrap();
        assert_eq!(vectors.len(), 1);
        assert_eq!(vectors[0].values().unwrap(), vec![1.5]);
        store.close().unwrap();
        assert!(matches!(
            store.count_vectors_for_model(&ModelRef::from("m")),
            Err(StoreError::Closed)
        ));
    }
}
