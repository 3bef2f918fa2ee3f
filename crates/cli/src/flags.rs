use clap::{Args, ValueEnum};
use wordvec_protocol::{LossFunction, ModelFields, TrainingParams};
use wordvec_query::{FilterSet, FilterValue};

#[derive(Copy, Clone, Debug, ValueEnum)]
pub(crate) enum LossFlag {
    Ns,
    Hs,
    Softmax,
}

impl LossFlag {
    pub(crate) const fn as_domain(self) -> LossFunction {
        match self {
            LossFlag::Ns => LossFunction::Ns,
            LossFlag::Hs => LossFunction::Hs,
            LossFlag::Softmax => LossFunction::Softmax,
        }
    }
}

/// Model attributes for `update`.
#[derive(Args, Debug, Default)]
pub(crate) struct ModelArgs {
    /// Owner (user name)
    #[arg(long)]
    owner: Option<String>,

    /// Model name
    #[arg(long)]
    name: Option<String>,

    /// Model description
    #[arg(long)]
    description: Option<String>,

    /// Number of words in the model
    #[arg(long)]
    num_words: Option<u64>,

    /// Number of dimensions (size of each vector, e.g. 100)
    #[arg(long)]
    dim: Option<u64>,

    /// Training input file name
    #[arg(long)]
    input_file: Option<String>,

    /// Training output file name
    #[arg(long)]
    output: Option<String>,

    /// Learning rate, e.g. 0.05
    #[arg(long)]
    lr: Option<f64>,

    /// Change in learning rate, e.g. 100
    #[arg(long)]
    lr_update_rate: Option<u64>,

    /// Context window size, e.g. 5
    #[arg(long)]
    ws: Option<u64>,

    /// Number of epochs, e.g. 5
    #[arg(long)]
    epoch: Option<u64>,

    /// Minimum number of word occurrences, e.g. 5
    #[arg(long)]
    min_count: Option<u64>,

    /// Number of negatives sampled, e.g. 5
    #[arg(long)]
    neg: Option<u64>,

    /// Max word n-gram length, e.g. 1
    #[arg(long)]
    ngrams: Option<u64>,

    /// Loss function
    #[arg(long, value_enum)]
    loss: Option<LossFlag>,

    /// Number of buckets, e.g. 2000000
    #[arg(long)]
    bucket: Option<u64>,

    /// Min character n-gram length, e.g. 3
    #[arg(long)]
    minn: Option<u64>,

    /// Max character n-gram length, e.g. 6
    #[arg(long)]
    maxn: Option<u64>,

    /// Number of training threads, e.g. 12
    #[arg(long)]
    thread: Option<u64>,

    /// Sampling threshold, e.g. 0.0001
    #[arg(short = 't')]
    t: Option<f64>,
}

impl ModelArgs {
    pub(crate) fn into_fields(self) -> ModelFields {
        ModelFields {
            id: None,
            name: self.name,
            owner: self.owner,
            description: self.description,
            params: TrainingParams {
                num_words: self.num_words,
                dim: self.dim,
                input_file: self.input_file,
                output: self.output,
                lr: self.lr,
                lr_update_rate: self.lr_update_rate,
                ws: self.ws,
                epoch: self.epoch,
                min_count: self.min_count,
                neg: self.neg,
                word_ngrams: self.ngrams,
                loss: self.loss.map(LossFlag::as_domain),
                bucket: self.bucket,
                minn: self.minn,
                maxn: self.maxn,
                thread: self.thread,
                t: self.t,
            },
        }
    }
}

/// Model filters for `findmodels`. Two numbers form an inclusive range; more are a set.
/// Text filters treat `%` as a wildcard.
#[derive(Args, Debug, Default)]
pub(crate) struct ModelFilterArgs {
    /// Model id
    #[arg(long, num_args = 1..)]
    id: Vec<u64>,

    #[arg(long)]
    owner: Option<String>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long, num_args = 1..)]
    num_words: Vec<u64>,

    #[arg(long, num_args = 1..)]
    dim: Vec<u64>,

    #[arg(long)]
    input_file: Option<String>,

    #[arg(long)]
    output: Option<String>,

    #[arg(long, num_args = 1..)]
    lr: Vec<f64>,

    #[arg(long, num_args = 1..)]
    lr_update_rate: Vec<u64>,

    #[arg(long, num_args = 1..)]
    ws: Vec<u64>,

    #[arg(long, num_args = 1..)]
    epoch: Vec<u64>,

    #[arg(long, num_args = 1..)]
    min_count: Vec<u64>,

    #[arg(long, num_args = 1..)]
    neg: Vec<u64>,

    #[arg(long, num_args = 1..)]
    ngrams: Vec<u64>,

    #[arg(long, value_enum, num_args = 1..)]
    loss: Vec<LossFlag>,

    #[arg(long, num_args = 1..)]
    bucket: Vec<u64>,

    #[arg(long, num_args = 1..)]
    minn: Vec<u64>,

    #[arg(long, num_args = 1..)]
    maxn: Vec<u64>,

    #[arg(long, num_args = 1..)]
    thread: Vec<u64>,

    #[arg(short = 't', num_args = 1..)]
    t: Vec<f64>,
}

/// One value stays scalar; several become a list (a pair is a range on numeric fields).
fn many<T: Into<FilterValue>>(values: Vec<T>) -> Option<FilterValue> {
    let mut values: Vec<FilterValue> = values.into_iter().map(Into::into).collect();
    match values.len() {
        0 => None,
        1 => values.pop(),
        _ => Some(FilterValue::List(values)),
    }
}

impl ModelFilterArgs {
    pub(crate) fn into_filters(self) -> FilterSet {
        let mut filters = FilterSet::new();
        let mut put = |field: &str, value: Option<FilterValue>| {
            if let Some(value) = value {
                filters.insert(field, value);
            }
        };
        put("id", many(self.id));
        put("owner", self.owner.map(FilterValue::from));
        put("name", self.name.map(FilterValue::from));
        put("description", self.description.map(FilterValue::from));
        put("num_words", many(self.num_words));
        put("dim", many(self.dim));
        put("input_file", self.input_file.map(FilterValue::from));
        put("output", self.output.map(FilterValue::from));
        put("lr", many(self.lr));
        put("lr_update_rate", many(self.lr_update_rate));
        put("ws", many(self.ws));
        put("epoch", many(self.epoch));
        put("min_count", many(self.min_count));
        put("neg", many(self.neg));
        put("word_ngrams", many(self.ngrams));
        put(
            "loss",
            many(
                self.loss
                    .into_iter()
                    .map(|loss| loss.as_domain().as_str())
                    .collect::<Vec<_>>(),
            ),
        );
        put("bucket", many(self.bucket));
        put("minn", many(self.minn));
        put("maxn", many(self.maxn));
        put("thread", many(self.thread));
        put("t", many(self.t));
        filters
    }
}
