use crate::error::{json_response, Result, ServerError};
use crate::state::SharedState;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{HeaderName, HeaderValue, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::de::DeserializeOwned;
use wordvec_ingest::{IngestOptions, IngestPipeline};
use wordvec_protocol::{
    naming::snakify_keys, CountResponse, ExistsResponse, IngestMode, ModelFields, ModelKey,
    ModelRef, VectorInput, VectorRecord, API_PREFIX,
};
use wordvec_query::{FilterSet, ListOptions};
use wordvec_store::StoreError;

type Pairs = Query<Vec<(String, String)>>;

pub fn router(state: SharedState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.max_upload_bytes);
    let api = Router::new()
        .route("/model", post(create_model))
        .route("/model/:key", get(get_model).put(update_model))
        .route("/model/:key/exists", get(model_exists))
        .route("/model/:key/words", get(get_words))
        .route(
            "/model/:key/vectors",
            get(get_vectors).post(create_vectors).put(update_vectors),
        )
        .route("/model/:key/vectors/count", get(count_vectors))
        .route(
            "/model/:key/upload/vectors",
            post(upload_vectors).layer(upload_limit),
        )
        .route("/search/model", post(find_models))
        .route_layer(middleware::from_fn_with_state(state.clone(), authenticate));

    Router::new()
        .nest(API_PREFIX, api)
        .fallback(unknown_route)
        .with_state(state)
}

async fn authenticate(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    let token = match state.auth.authenticate(request.headers()) {
        Ok(token) => token,
        Err(err) => return err.into_response(),
    };
    let mut response = next.run(request).await;
    if let Some(token) = token {
        let name = HeaderName::from_bytes(state.auth.session_header().as_bytes());
        if let (Ok(name), Ok(value)) = (name, HeaderValue::from_str(&token)) {
            response.headers_mut().insert(name, value);
        }
    }
    response
}

async fn unknown_route() -> ServerError {
    ServerError::Store(StoreError::NotFound("no such route".to_string()))
}

/// Query parameters shared by the read endpoints.
#[derive(Debug, Default)]
struct Params {
    packed: bool,
    words: Option<Vec<String>>,
    mode: IngestMode,
    listing: ListOptions,
}

impl Params {
    fn parse(pairs: Vec<(String, String)>) -> Result<Self> {
        let mut params = Self::default();
        for (name, value) in pairs {
            match name.as_str() {
                "packed" => params.packed = parse_bool(&name, &value)?,
                "exact" => params.listing.exact = parse_bool(&name, &value)?,
                "words" => params.words.get_or_insert_with(Vec::new).push(value),
                "sort" => params.listing.sort.push(value),
                "page" => params.listing.page = Some(parse_number(&name, &value)?),
                "pageSize" | "page_size" => {
                    params.listing.page_size = Some(parse_number(&name, &value)?);
                }
                "mode" => {
                    params.mode = match value.as_str() {
                        "merge" => IngestMode::Merge,
                        "force" => IngestMode::Force,
                        other => {
                            return Err(ServerError::BadRequest(format!(
                                "mode must be 'merge' or 'force', got '{other}'"
                            )))
                        }
                    };
                }
                other => log::debug!("ignoring query parameter '{other}'"),
            }
        }
        Ok(params)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(ServerError::BadRequest(format!(
            "'{name}' must be true or false, got '{value}'"
        ))),
    }
}

fn parse_number(name: &str, value: &str) -> Result<u64> {
    value.parse().map_err(|_| {
        ServerError::BadRequest(format!(
            "'{name}' must be a non-negative integer, got '{value}'"
        ))
    })
}

/// Decode a JSON body, accepting camelCase keys.
fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| ServerError::BadRequest(format!("invalid JSON body: {err}")))?;
    serde_json::from_value(snakify_keys(value))
        .map_err(|err| ServerError::BadRequest(format!("unexpected body shape: {err}")))
}

fn model_ref(key: &str) -> ModelRef {
    ModelRef::from(ModelKey::parse(key))
}

fn ok<T: serde::Serialize>(value: &T) -> Response {
    json_response(StatusCode::OK, value)
}

async fn model_exists(State(state): State<SharedState>, Path(key): Path<String>) -> Result<Response> {
    let model = model_ref(&key);
    let exists = state
        .with_store(move |store| Ok(store.model_exists(&model)?))
        .await?;
    Ok(ok(&ExistsResponse { exists }))
}

async fn get_model(State(state): State<SharedState>, Path(key): Path<String>) -> Result<Response> {
    let model = model_ref(&key);
    let found = state
        .with_store(move |store| Ok(store.resolve_model_ref(&model)?.require(&model)?))
        .await?;
    Ok(ok(&found))
}

async fn create_model(State(state): State<SharedState>, body: Bytes) -> Result<Response> {
    let fields: ModelFields = parse_body(&body)?;
    let created = state
        .with_store(move |store| Ok(store.create_model(&fields)?))
        .await?;
    log::info!("created model '{}' (id {})", created.name, created.id);
    Ok(json_response(StatusCode::CREATED, &created))
}

async fn update_model(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let model = model_ref(&key);
    let fields: ModelFields = parse_body(&body)?;
    let updated = state
        .with_store(move |store| Ok(store.update_model(&model, &fields)?))
        .await?;
    Ok(ok(&updated))
}

async fn find_models(State(state): State<SharedState>, body: Bytes) -> Result<Response> {
    let filters: FilterSet = if body.is_empty() {
        FilterSet::default()
    } else {
        parse_body(&body)?
    };
    let models = state
        .with_store(move |store| Ok(store.find_models(&filters)?))
        .await?;
    Ok(ok(&models))
}

async fn create_vectors(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let model = model_ref(&key);
    let inputs: Vec<VectorInput> = parse_body(&body)?;
    let created = state
        .with_store(move |store| Ok(store.create_vectors(&model, &inputs)?))
        .await?;
    Ok(ok(&created))
}

async fn update_vectors(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    body: Bytes,
) -> Result<Response> {
    let model = model_ref(&key);
    let inputs: Vec<VectorInput> = parse_body(&body)?;
    let updated = state
        .with_store(move |store| Ok(store.update_vectors(&model, &inputs)?))
        .await?;
    Ok(ok(&updated))
}

async fn get_words(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response> {
    let model = model_ref(&key);
    let params = Params::parse(pairs)?;
    let words = state
        .with_store(move |store| {
            Ok(store.get_words(&model, params.words.as_deref(), params.listing.exact)?)
        })
        .await?;
    Ok(ok(&words))
}

async fn count_vectors(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response> {
    let model = model_ref(&key);
    let params = Params::parse(pairs)?;
    let count = state
        .with_store(move |store| {
            Ok(match &params.words {
                Some(words) => store.count_vectors_for_words(&model, words, params.listing.exact)?,
                None => store.count_vectors_for_model(&model)?,
            })
        })
        .await?;
    Ok(ok(&CountResponse { count }))
}

async fn get_vectors(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(pairs): Pairs,
) -> Result<Response> {
    let model = model_ref(&key);
    let params = Params::parse(pairs)?;
    let packed = params.packed;
    let vectors = state
        .with_store(move |store| {
            Ok(match &params.words {
                Some(words) => store.get_vectors_for_words(&model, words, &params.listing)?,
                None => store.get_vectors_for_model(&model, &params.listing)?,
            })
        })
        .await?;
    if packed {
        return Ok(ok(&vectors));
    }
    let records = vectors
        .iter()
        .map(|vector| vector.to_record(false))
        .collect::<std::result::Result<Vec<VectorRecord>, _>>()
        .map_err(StoreError::from)?;
    Ok(ok(&records))
}

async fn upload_vectors(
    State(state): State<SharedState>,
    Path(key): Path<String>,
    Query(pairs): Pairs,
    body: Bytes,
) -> Result<Response> {
    let model = model_ref(&key);
    let params = Params::parse(pairs)?;
    let options = IngestOptions::default()
        .with_mode(params.mode)
        .with_batch_size(state.batch_size)
        .with_source_label(key);
    log::info!(
        "upload of {} bytes into model '{}' ({} mode)",
        body.len(),
        options.source_label.as_deref().unwrap_or_default(),
        params.mode.as_str()
    );
    let report = state
        .with_store(move |store| {
            Ok(IngestPipeline::new(options).run(store, &model, body.as_ref())?)
        })
        .await?;
    Ok(ok(&CountResponse {
        count: report.flushed,
    }))
}
