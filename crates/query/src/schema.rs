use wordvec_protocol::{Model, Vector};

/// Storage type of a filterable field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Integer,
    Float,
    Text,
}

impl FieldKind {
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    pub(crate) const fn describe(self) -> &'static str {
        match self {
            Self::Integer => "an integer",
            Self::Float => "a number",
            Self::Text => "text",
        }
    }
}

/// Fields a record type exposes to filters and sort keys.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub record: &'static str,
    fields: &'static [(&'static str, FieldKind)],
}

impl Schema {
    #[must_use]
    pub fn kind_of(&self, field: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, kind)| *kind)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|(name, _)| *name)
    }
}

pub const MODEL_SCHEMA: Schema = Schema {
    record: "model",
    fields: &[
        ("id", FieldKind::Integer),
        ("name", FieldKind::Text),
        ("owner", FieldKind::Text),
        ("description", FieldKind::Text),
        ("num_words", FieldKind::Integer),
        ("dim", FieldKind::Integer),
        ("input_file", FieldKind::Text),
        ("output", FieldKind::Text),
        ("lr", FieldKind::Float),
        ("lr_update_rate", FieldKind::Integer),
        ("ws", FieldKind::Integer),
        ("epoch", FieldKind::Integer),
        ("min_count", FieldKind::Integer),
        ("neg", FieldKind::Integer),
        ("word_ngrams", FieldKind::Integer),
        ("loss", FieldKind::Text),
        ("bucket", FieldKind::Integer),
        ("minn", FieldKind::Integer),
        ("maxn", FieldKind::Integer),
        ("thread", FieldKind::Integer),
        ("t", FieldKind::Float),
    ],
};

pub const VECTOR_SCHEMA: Schema = Schema {
    record: "vector",
    fields: &[
        ("id", FieldKind::Integer),
        ("model_id", FieldKind::Integer),
        ("word", FieldKind::Text),
    ],
};

/// Borrowed field value as seen by predicates and sort keys.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue<'a> {
    Number(f64),
    Text(&'a str),
}

/// Record types the matcher can read fields from.
pub trait FieldSource {
    const SCHEMA: Schema;

    /// `None` when the field is unset on this record.
    fn field(&self, name: &str) -> Option<FieldValue<'_>>;

    fn record_id(&self) -> u64;
}

fn int(value: Option<u64>) -> Option<FieldValue<'static>> {
    value.map(|v| FieldValue::Number(v as f64))
}

impl FieldSource for Model {
    const SCHEMA: Schema = MODEL_SCHEMA;

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        let p = &self.params;
        match name {
            "id" => Some(FieldValue::Number(self.id as f64)),
            "name" => Some(FieldValue::Text(&self.name)),
            "owner" => self.owner.as_deref().map(FieldValue::Text),
            "description" => self.description.as_deref().map(FieldValue::Text),
            "num_words" => int(p.num_words),
            "dim" => int(p.dim),
            "input_file" => p.input_file.as_deref().map(FieldValue::Text),
            "output" => p.output.as_deref().map(FieldValue::Text),
            "lr" => p.lr.map(FieldValue::Number),
            "lr_update_rate" => int(p.lr_update_rate),
            "ws" => int(p.ws),
            "epoch" => int(p.epoch),
            "min_count" => int(p.min_count),
            "neg" => int(p.neg),
            "word_ngrams" => int(p.word_ngrams),
            "loss" => p.loss.map(|loss| FieldValue::Text(loss.as_str())),
            "bucket" => int(p.bucket),
            "minn" => int(p.minn),
            "maxn" => int(p.maxn),
            "thread" => int(p.thread),
            "t" => p.t.map(FieldValue::Number),
            _ => None,
        }
    }

    fn record_id(&self) -> u64 {
        self.id
    }
}

impl FieldSource for Vector {
    const SCHEMA: Schema = VECTOR_SCHEMA;

    fn field(&self, name: &str) -> Option<FieldValue<'_>> {
        match name {
            "id" => Some(FieldValue::Number(self.id as f64)),
            "model_id" => Some(FieldValue::Number(self.model_id as f64)),
            "word" => Some(FieldValue::Text(&self.word)),
            _ => None,
        }
    }

    fn record_id(&self) -> u64 {
        self.id
    }
}
