// End-to-end tests: documents on disk, live upstreams and the socket transport.

use actix_web::{test, web, App};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use stubwire::action::client::HttpClient;
use stubwire::config::ConfigLoader;
use stubwire::monitor::QuietMonitor;
use stubwire::rules::RuleSet;
use stubwire::server::{socket, AppState, Binding, Dispatcher, StubServer, TransportKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use wiremock::matchers::{body_string, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn rules(yaml: &str) -> RuleSet {
    ConfigLoader::from_str(yaml)
        .unwrap()
        .build_rules(Arc::new(HttpClient::new().unwrap()))
        .unwrap()
}

macro_rules! stub_app {
    ($rules:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState {
                    dispatcher: Dispatcher::new($rules, Arc::new(QuietMonitor)),
                }))
                .default_service(web::to(stubwire::server::request_handler)),
        )
        .await
    };
}

#[actix_web::test]
async fn test_proxy_forwards_to_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/upstream"))
        .and(query_param("page", "2"))
        .and(header("x-forwarded-by", "stubwire"))
        .respond_with(
            ResponseTemplate::new(203)
                .insert_header("x-upstream", "yes")
                .set_body_string("from upstream"),
        )
        .expect(1)
        .mount(&upstream)
        .await;

    let app = stub_app!(rules(&format!(
        r#"
- request:
    uri: /proxied
  response:
    proxy:
      url: "{}/upstream"
      headers:
        X-Forwarded-By: stubwire
"#,
        upstream.uri()
    )));

    let req = test::TestRequest::get()
        .uri("/proxied?page=2")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 203);
    assert_eq!(resp.headers().get("x-upstream").unwrap(), "yes");
    assert_eq!(test::read_body(resp).await, "from upstream");
}

#[actix_web::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let app = stub_app!(rules(
        r#"
- response:
    proxy:
      url: "http://127.0.0.1:9/unreachable"
"#
    ));

    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 502);
}

#[actix_web::test]
async fn test_propagated_proxy_failure_is_500() {
    let app = stub_app!(rules(
        r#"
- response:
    proxy:
      url: "http://127.0.0.1:9/unreachable"
      failover: propagate
"#
    ));

    let req = test::TestRequest::get().uri("/").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 500);
}

#[actix_web::test]
async fn test_completion_action_reaches_upstream() {
    let upstream = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify"))
        .and(body_string("order placed"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&upstream)
        .await;

    let app = stub_app!(rules(&format!(
        r#"
- request:
    uri: /orders
  response:
    status: 201
  on_complete:
    - post:
        url: "{}/notify"
        content: order placed
"#,
        upstream.uri()
    )));

    let req = test::TestRequest::post().uri("/orders").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
}

#[actix_web::test]
async fn test_document_on_disk_with_include_and_fixtures() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("fixtures")).unwrap();
    fs::write(
        dir.path().join("fixtures").join("user.json"),
        r#"{"name": "ada"}"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("users.yaml"),
        "- request:\n    uri: /ada\n  response:\n    file: fixtures/user.json\n",
    )
    .unwrap();
    fs::write(
        dir.path().join("stub.yaml"),
        r#"
server:
  port: 12306
rules:
  - context: /users
    include: users.yaml
"#,
    )
    .unwrap();

    let config = ConfigLoader::from_file(dir.path().join("stub.yaml")).unwrap();
    let server = config
        .build_with_client(Arc::new(HttpClient::new().unwrap()))
        .unwrap();
    assert_eq!(server.binding().port, 12306);

    let app = stub_app!(server.rules().clone());
    let req = test::TestRequest::get().uri("/users/ada").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "application/json"
    );
    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["name"], "ada");
}

#[actix_web::test]
async fn test_command_line_server_merges_with_document() {
    let document = ConfigLoader::from_str(
        r#"
server:
  port: 12306
rules:
  - response:
      text: from document
"#,
    )
    .unwrap()
    .build_with_client(Arc::new(HttpClient::new().unwrap()))
    .unwrap();

    let mut base_binding = document.binding().clone();
    base_binding.port = 8080;
    let base = StubServer::new(
        base_binding,
        rules("- request:\n    uri: /health\n  response:\n    text: ok\n"),
    );

    let merged = base.merge(document).unwrap();
    assert_eq!(merged.binding().port, 8080);
    assert_eq!(merged.rules().len(), 2);
}

#[actix_web::test]
async fn test_merging_different_transports_fails() {
    let http = StubServer::new(Binding::new(TransportKind::Http), RuleSet::default());
    let socket = StubServer::new(Binding::new(TransportKind::Socket), RuleSet::default());
    assert!(http.merge(socket).is_err());
}

#[tokio::test]
async fn test_socket_server_from_document() {
    let config = ConfigLoader::from_str(
        r#"
server:
  host: 127.0.0.1
  transport: socket
rules:
  - request:
      text: ping
    response:
      text: pong
  - request:
      text: { starts_with: "slow" }
    response:
      text: done
      latency: 20ms
"#,
    )
    .unwrap();
    let server = config
        .build_with_client(Arc::new(HttpClient::new().unwrap()))
        .unwrap()
        .quiet(true);
    assert_eq!(server.binding().transport, TransportKind::Socket);

    let listener = socket::bind(server.binding()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(socket::serve(listener, server.dispatcher()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    let mut buffer = [0u8; 16];

    stream.write_all(b"ping").await.unwrap();
    let read = stream.read(&mut buffer).await.unwrap();
    assert_eq!(&buffer[..read], b"pong");

    stream.write_all(b"slow request").await.unwrap();
    let read = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buffer))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(&buffer[..read], b"done");

    stream.write_all(b"unknown").await.unwrap();
    let mut rest = Vec::new();
    assert_eq!(stream.read_to_end(&mut rest).await.unwrap(), 0);
}
