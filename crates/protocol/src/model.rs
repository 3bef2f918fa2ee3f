use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Loss function used when the embedding space was trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossFunction {
    /// Negative sampling
    Ns,
    /// Hierarchical softmax
    Hs,
    Softmax,
}

impl LossFunction {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ns => "ns",
            Self::Hs => "hs",
            Self::Softmax => "softmax",
        }
    }
}

impl fmt::Display for LossFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LossFunction {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "ns" => Ok(Self::Ns),
            "hs" => Ok(Self::Hs),
            "softmax" => Ok(Self::Softmax),
            other => Err(format!("unknown loss function '{other}' (expected ns, hs or softmax)")),
        }
    }
}

/// Training hyperparameters. Every field is optional because models are often
/// registered before (or without) the training run being known.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    /// Number of words in the model
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_words: Option<u64>,

    /// Vector dimension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dim: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,

    /// Learning rate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr: Option<f64>,

    /// Learning-rate update interval
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lr_update_rate: Option<u64>,

    /// Context window size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ws: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,

    /// Minimum number of word occurrences
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_count: Option<u64>,

    /// Negatives sampled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub neg: Option<u64>,

    /// Max word n-gram length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub word_ngrams: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<LossFunction>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bucket: Option<u64>,

    /// Min character n-gram length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minn: Option<u64>,

    /// Max character n-gram length
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub maxn: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<u64>,

    /// Sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<f64>,
}

macro_rules! overlay {
    ($target:expr, $source:expr; $($field:ident),+ $(,)?) => {
        $(
            if let Some(value) = &$source.$field {
                $target.$field = Some(value.clone());
            }
        )+
    };
}

impl TrainingParams {
    /// Copy every field that is set in `other` over `self`.
    pub fn overlay(&mut self, other: &Self) {
        overlay!(self, other;
            num_words, dim, input_file, output, lr, lr_update_rate, ws, epoch, min_count,
            neg, word_ngrams, loss, bucket, minn, maxn, thread, t,
        );
    }
}

/// A stored embedding space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: u64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub params: TrainingParams,
}

impl Model {
    /// Build a model from creation fields; `None` when no name was supplied.
    #[must_use]
    pub fn from_fields(id: u64, fields: &ModelFields) -> Option<Self> {
        let name = fields.name.clone()?;
        Some(Self {
            id,
            name,
            owner: fields.owner.clone(),
            description: fields.description.clone(),
            params: fields.params.clone(),
        })
    }

    /// Apply a partial update. The id never changes.
    pub fn apply(&mut self, fields: &ModelFields) {
        if let Some(name) = &fields.name {
            self.name.clone_from(name);
        }
        overlay!(self, fields; owner, description);
        self.params.overlay(&fields.params);
    }

    #[must_use]
    pub fn key(&self) -> ModelKey {
        ModelKey::Id(self.id)
    }
}

/// Partial model: used to create models and to update selected fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelFields {
    /// Only meaningful as a reference; stores assign ids themselves.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub params: TrainingParams,
}

impl ModelFields {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_shape(mut self, num_words: u64, dim: u64) -> Self {
        self.params.num_words = Some(num_words);
        self.params.dim = Some(dim);
        self
    }

    /// True when no attribute would change on update.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.owner.is_none()
            && self.description.is_none()
            && self.params == TrainingParams::default()
    }
}

impl From<&Model> for ModelFields {
    fn from(model: &Model) -> Self {
        Self {
            id: Some(model.id),
            name: Some(model.name.clone()),
            owner: model.owner.clone(),
            description: model.description.clone(),
            params: model.params.clone(),
        }
    }
}

/// Concrete lookup key for a stored model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ModelKey {
    Id(u64),
    Name(String),
}

impl ModelKey {
    /// Path segments that are all ASCII digits address ids; anything else is a name.
    #[must_use]
    pub fn parse(segment: &str) -> Self {
        if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
            if let Ok(id) = segment.parse() {
                return Self::Id(id);
            }
        }
        Self::Name(segment.to_string())
    }
}

impl fmt::Display for ModelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Name(name) => f.write_str(name),
        }
    }
}

/// Caller-facing model reference, resolved by the storage layer.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ModelRef {
    Id(u64),
    Name(String),
    /// A model-shaped record; its id wins over its name.
    Record(ModelFields),
    #[default]
    Absent,
}

impl ModelRef {
    #[must_use]
    pub fn key(&self) -> Option<ModelKey> {
        match self {
            Self::Id(id) => Some(ModelKey::Id(*id)),
            Self::Name(name) => Some(ModelKey::Name(name.clone())),
            Self::Record(fields) => fields
                .id
                .map(ModelKey::Id)
                .or_else(|| fields.name.clone().map(ModelKey::Name)),
            Self::Absent => None,
        }
    }

    /// Fields to use when the reference names a model that does not exist yet.
    #[must_use]
    pub fn placeholder_fields(&self) -> ModelFields {
        match self {
            Self::Name(name) => ModelFields::named(name.clone()),
            Self::Record(fields) => ModelFields {
                id: None,
                ..fields.clone()
            },
            Self::Id(_) | Self::Absent => ModelFields::default(),
        }
    }

    /// Parse user input the way path keys are parsed: digits are ids.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        if raw.is_empty() {
            return Self::Absent;
        }
        match ModelKey::parse(raw) {
            ModelKey::Id(id) => Self::Id(id),
            ModelKey::Name(name) => Self::Name(name),
        }
    }
}

impl From<ModelKey> for ModelRef {
    fn from(key: ModelKey) -> Self {
        match key {
            ModelKey::Id(id) => Self::Id(id),
            ModelKey::Name(name) => Self::Name(name),
        }
    }
}

impl From<&Model> for ModelRef {
    fn from(model: &Model) -> Self {
        Self::Record(ModelFields::from(model))
    }
}

impl From<&str> for ModelRef {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<u64> for ModelRef {
    fn from(id: u64) -> Self {
        Self::Id(id)
    }
}
