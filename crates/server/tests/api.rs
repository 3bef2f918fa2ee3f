use pretty_assertions::assert_eq;
use std::io::Write;
use std::thread::JoinHandle;
use tempfile::TempDir;
use tokio::sync::oneshot;
use wordvec_protocol::{ErrorKind, IngestMode, ModelFields, ModelRef, VectorInput};
use wordvec_query::{FilterSet, FilterValue, ListOptions};
use wordvec_server::{serve_on, ServerConfig};
use wordvec_store::{LocalStore, RemoteClient, ServiceConfig, StorageService};

struct TestServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(store: LocalStore, config: ServerConfig) -> Self {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel::<()>();
        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(listener).unwrap();
                let shutdown = async move {
                    let _ = rx.await;
                };
                serve_on(listener, Box::new(store), &config, shutdown)
                    .await
                    .unwrap();
            });
        });
        Self {
            url,
            shutdown: Some(tx),
            thread: Some(thread),
        }
    }

    fn memory(config: ServerConfig) -> Self {
        Self::start(LocalStore::in_memory(&ServiceConfig::default()), config)
    }

    fn client(&self, config: &ServiceConfig) -> RemoteClient {
        RemoteClient::connect(&self.url, config).unwrap()
    }

    fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            thread.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn words(list: &[&str]) -> Vec<String> {
    list.iter().map(|w| w.to_string()).collect()
}

/// Runs one fixed sequence of operations and records every outcome, errors by kind.
fn transcript(service: &mut dyn StorageService) -> Vec<String> {
    fn line<T: std::fmt::Debug>(out: &mut Vec<String>, label: &str, result: wordvec_store::Result<T>) {
        out.push(format!("{label}: {:?}", result.map_err(|err| err.kind())));
    }
    let mut out = Vec::new();
    let m1 = ModelRef::from("m1");

    line(&mut out, "create m1", service.create_model(&ModelFields::named("m1").with_shape(5, 2)));
    line(&mut out, "create m2", service.create_model(&ModelFields::named("m2").with_shape(9, 50)));
    line(&mut out, "create g", service.create_model(&ModelFields::named("glove").with_shape(9, 300)));
    line(&mut out, "dup model", service.create_model(&ModelFields::named("m1")));
    line(&mut out, "digit name", service.create_model(&ModelFields::named("123")));

    let range = FilterSet::new().with("dim", FilterValue::from(vec![50.0, 100.0]));
    line(&mut out, "range", service.find_models(&range));
    let like = FilterSet::new().with("name", FilterValue::from("g%"));
    line(&mut out, "like", service.find_models(&like));

    let inputs: Vec<VectorInput> = [("foo", 1.0), ("bar", 2.0), ("running", 3.0), ("sing", 4.0)]
        .into_iter()
        .map(|(word, v)| VectorInput::from_values(word, vec![v, -v]))
        .collect();
    line(&mut out, "create vectors", service.create_vectors(&m1, &inputs));
    line(&mut out, "dup vector", service.create_vectors(&m1, &inputs[..1]));
    line(
        &mut out,
        "update missing",
        service.update_vectors(&m1, &[VectorInput::from_values("nope", vec![0.0, 0.0])]),
    );
    line(
        &mut out,
        "update foo",
        service.update_vectors(&m1, &[VectorInput::from_values("foo", vec![9.5, 0.25])]),
    );
    line(&mut out, "vectors on missing model", service.create_vectors(&"ghost".into(), &inputs));

    line(&mut out, "all words", service.get_words(&m1, None, false));
    line(&mut out, "ing words", service.get_words(&m1, Some(&words(&["%ing"])), false));
    line(&mut out, "exact words", service.get_words(&m1, Some(&words(&["foo", "%ing"])), true));
    line(&mut out, "count", service.count_vectors_for_model(&m1));
    line(&mut out, "count ing", service.count_vectors_for_words(&m1, &words(&["%ing"]), false));

    let page = ListOptions::default().sorted_by(&["word~desc"]).paged(0, 2);
    line(&mut out, "page", service.get_vectors_for_model(&m1, &page));
    line(
        &mut out,
        "ing vectors",
        service.get_vectors_for_words(&m1, &words(&["%ing"]), &ListOptions::default()),
    );
    let bogus = ListOptions::default().sorted_by(&["bogus"]);
    line(&mut out, "bad sort", service.get_vectors_for_model(&m1, &bogus));

    line(&mut out, "get missing", service.get_model(&"nope".into()));
    line(&mut out, "exists missing", service.model_exists(&"nope".into()));
    line(&mut out, "exists id", service.model_exists(&ModelRef::Id(1)));
    let mut description = ModelFields::default();
    description.description = Some("fifty".to_string());
    line(&mut out, "update model", service.update_model(&"m2".into(), &description));
    line(&mut out, "get by id", service.get_model(&ModelRef::Id(2)));
    out
}

#[test]
fn local_and_remote_backends_agree() {
    let mut local = LocalStore::in_memory(&ServiceConfig::default());
    let expected = transcript(&mut local);

    let server = TestServer::memory(ServerConfig::default());
    let mut remote = server.client(&ServiceConfig::default());
    let actual = transcript(&mut remote);

    assert_eq!(expected, actual);
}

#[test]
fn sessions_are_issued_and_replayed() {
    let server = TestServer::memory(ServerConfig::default().with_user("alice", "secret"));

    let mut anonymous = server.client(&ServiceConfig::default());
    let err = anonymous.find_models(&FilterSet::new()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unauthorized);

    let mut wrong = server.client(&ServiceConfig::default().with_credentials("alice", "nope"));
    assert_eq!(
        wrong.find_models(&FilterSet::new()).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );

    let mut alice = server.client(&ServiceConfig::default().with_credentials("alice", "secret"));
    assert!(alice.session().is_none());
    alice.create_model(&ModelFields::named("m")).unwrap();
    let token = alice.session().map(str::to_string).unwrap();

    // The token alone is enough for a client without credentials.
    let mut replay = server.client(&ServiceConfig::default()).with_session(token.clone());
    assert!(replay.model_exists(&"m".into()).unwrap());
    assert_eq!(replay.session(), Some(token.as_str()));

    let mut stale = server.client(&ServiceConfig::default()).with_session("not-a-session");
    assert_eq!(
        stale.model_exists(&"m".into()).unwrap_err().kind(),
        ErrorKind::Unauthorized
    );
    assert!(stale.session().is_none());
}

#[test]
fn expired_sessions_are_renewed_from_credentials() {
    let mut config = ServerConfig::default().with_user("alice", "secret");
    config.session_ttl_secs = 1;
    let server = TestServer::memory(config);

    let mut alice = server.client(&ServiceConfig::default().with_credentials("alice", "secret"));
    alice.create_model(&ModelFields::named("m")).unwrap();
    let first = alice.session().map(str::to_string).unwrap();

    std::thread::sleep(std::time::Duration::from_millis(2100));
    assert!(alice.model_exists(&"m".into()).unwrap());
    let renewed = alice.session().map(str::to_string).unwrap();
    assert_ne!(renewed, first);
}

#[test]
fn uploads_run_the_ingestion_pipeline() {
    let server = TestServer::memory(ServerConfig::default());
    let mut client = server.client(&ServiceConfig::default());

    let mut gz = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    gz.write_all(b"2 3\nfoo 1.0 2.0 3.0\nbar 4.0 5.0 6.0\n").unwrap();
    let gz = gz.finish().unwrap();

    let m1 = ModelRef::from("m1");
    let count = client
        .upload_file(&m1, std::io::Cursor::new(gz), IngestMode::Merge)
        .unwrap();
    assert_eq!(count, 2);
    let model = client.get_model(&m1).unwrap().unwrap();
    assert_eq!(model.params.dim, Some(3));

    let changed = "2 3\nfoo 7.0 8.0 9.0\nbar 4.0 5.0 6.0\n";
    client
        .upload_file(&m1, std::io::Cursor::new(changed.as_bytes().to_vec()), IngestMode::Merge)
        .unwrap();
    assert_eq!(client.count_vectors_for_model(&m1).unwrap(), 2);
    let foo = client
        .get_vectors_for_words(&m1, &words(&["foo"]), &ListOptions::default().exact(true))
        .unwrap();
    assert_eq!(foo[0].values().unwrap(), vec![7.0, 8.0, 9.0]);

    let err = client
        .upload_file(&m1, std::io::Cursor::new(changed.as_bytes().to_vec()), IngestMode::Force)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let err = client
        .upload_file(&m1, std::io::Cursor::new(b"2 3\nfoo 1\n".to_vec()), IngestMode::Merge)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[test]
fn raw_requests_get_values_camel_case_and_envelopes() {
    let server = TestServer::memory(ServerConfig::default());
    let http = reqwest::blocking::Client::new();

    let created = http
        .post(format!("{}/api/model", server.url))
        .json(&serde_json::json!({"name": "m", "numWords": 1, "dim": 2}))
        .send()
        .unwrap();
    assert_eq!(created.status().as_u16(), 201);
    let created: serde_json::Value = created.json().unwrap();
    assert_eq!(created["num_words"], 1);

    let stored = http
        .post(format!("{}/api/model/m/vectors", server.url))
        .json(&serde_json::json!([{"word": "w", "values": [0.5, -1.5]}]))
        .send()
        .unwrap();
    assert_eq!(stored.status().as_u16(), 200);

    let plain: serde_json::Value = http
        .get(format!("{}/api/model/m/vectors", server.url))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert_eq!(plain[0]["values"], serde_json::json!([0.5, -1.5]));
    assert!(plain[0].get("packed_values").is_none());

    let packed: serde_json::Value = http
        .get(format!("{}/api/model/m/vectors?packed=true", server.url))
        .send()
        .unwrap()
        .json()
        .unwrap();
    assert!(packed[0]["packed_values"].is_string());

    let missing = http
        .get(format!("{}/api/model/nope", server.url))
        .send()
        .unwrap();
    assert_eq!(missing.status().as_u16(), 404);
    let envelope: serde_json::Value = missing.json().unwrap();
    assert_eq!(envelope["code"], "not_found");

    let bad = http
        .get(format!("{}/api/model/m/vectors?page=minus-one", server.url))
        .send()
        .unwrap();
    assert_eq!(bad.status().as_u16(), 400);
}

#[test]
fn shutdown_closes_a_file_backed_store() {
    let dir = TempDir::new().unwrap();
    let config = ServiceConfig::default();
    let server = TestServer::start(LocalStore::open(dir.path(), &config).unwrap(), ServerConfig::default());
    let mut client = server.client(&config);
    client.create_model(&ModelFields::named("kept")).unwrap();
    drop(client);
    server.stop();

    let mut reopened = LocalStore::open(dir.path(), &config).unwrap();
    assert!(reopened.model_exists(&"kept".into()).unwrap());
}
