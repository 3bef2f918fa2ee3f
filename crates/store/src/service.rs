use crate::error::{Result, StoreError};
use wordvec_protocol::{Model, ModelFields, ModelKey, ModelRef, Vector, VectorInput};
use wordvec_query::{FilterSet, ListOptions};

/// Outcome of resolving a [`ModelRef`] against a store.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    Existing(Model),
    /// Nothing stored under the reference; carries the fields a create would use.
    Missing(ModelFields),
}

impl Resolved {
    /// Read and update paths only accept stored models.
    pub fn require(self, model: &ModelRef) -> Result<Model> {
        match self {
            Self::Existing(model) => Ok(model),
            Self::Missing(_) => Err(match model.key() {
                Some(key) => StoreError::model_not_found(key),
                None => StoreError::NotFound("model reference is empty".to_string()),
            }),
        }
    }
}

/// The operations every backend offers with identical observable behavior.
///
/// Calls are synchronous and take `&mut self`; share an instance across threads
/// only behind a lock.
pub trait StorageService {
    /// Short backend label for logs ("local", "memory", "remote").
    fn backend(&self) -> &'static str;

    /// Fetch a stored model by concrete key.
    fn lookup_model(&mut self, key: &ModelKey) -> Result<Option<Model>>;

    /// Resolve any reference form. Record references look up by id first, then name.
    fn resolve_model_ref(&mut self, model: &ModelRef) -> Result<Resolved> {
        let Some(key) = model.key() else {
            return Ok(Resolved::Missing(model.placeholder_fields()));
        };
        Ok(match self.lookup_model(&key)? {
            Some(found) => Resolved::Existing(found),
            None => Resolved::Missing(model.placeholder_fields()),
        })
    }

    fn model_exists(&mut self, model: &ModelRef) -> Result<bool> {
        Ok(self.get_model(model)?.is_some())
    }

    fn get_model(&mut self, model: &ModelRef) -> Result<Option<Model>> {
        Ok(match self.resolve_model_ref(model)? {
            Resolved::Existing(found) => Some(found),
            Resolved::Missing(_) => None,
        })
    }

    fn create_model(&mut self, fields: &ModelFields) -> Result<Model>;

    /// Change only the supplied fields.
    fn update_model(&mut self, model: &ModelRef, fields: &ModelFields) -> Result<Model>;

    /// Models matching every filter, ordered by id.
    fn find_models(&mut self, filters: &FilterSet) -> Result<Vec<Model>>;

    fn create_vectors(&mut self, model: &ModelRef, inputs: &[VectorInput]) -> Result<Vec<Vector>>;

    fn update_vectors(&mut self, model: &ModelRef, inputs: &[VectorInput]) -> Result<Vec<Vector>>;

    /// Stored words, sorted. `None` lists every word of the model.
    fn get_words(
        &mut self,
        model: &ModelRef,
        words: Option<&[String]>,
        exact: bool,
    ) -> Result<Vec<String>>;

    fn count_vectors_for_model(&mut self, model: &ModelRef) -> Result<u64>;

    fn count_vectors_for_words(
        &mut self,
        model: &ModelRef,
        words: &[String],
        exact: bool,
    ) -> Result<u64>;

    fn get_vectors_for_model(
        &mut self,
        model: &ModelRef,
        options: &ListOptions,
    ) -> Result<Vec<Vector>>;

    /// Vectors whose word matches `words` (`options.exact` selects set membership over patterns).
    fn get_vectors_for_words(
        &mut self,
        model: &ModelRef,
        words: &[String],
        options: &ListOptions,
    ) -> Result<Vec<Vector>>;

    fn commit(&mut self) -> Result<()>;

    /// Discard writes since the last commit.
    fn rollback(&mut self) -> Result<()>;

    /// Commit pending work and release resources. Further calls fail.
    fn close(&mut self) -> Result<()>;
}

/// Model names that would read as ids in a path are refused.
pub(crate) fn validate_model_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(StoreError::BadRequest("model name must not be empty".to_string()));
    }
    if name.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StoreError::BadRequest(format!(
            "model name '{name}' is all digits and would be read as an id"
        )));
    }
    Ok(())
}
