#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Dispatcher tests against a mock backend.

use std::io::Write;
use std::time::Duration;

use flate2::Compression;
use flate2::write::GzEncoder;
use httpmock::prelude::*;
use restapi_http::HttpError;
use restapi_sdk::{ClientConfig, PayClient, RequestOptions, SdkError, ServiceClient};
use serde_json::json;

fn service_client(server: &MockServer) -> ServiceClient {
    let config = ClientConfig::builder("1001", "service-secret")
        .server_url(server.base_url())
        .access_token("user-token")
        .build()
        .unwrap();
    ServiceClient::new(config).unwrap()
}

fn pay_client(server: &MockServer) -> PayClient {
    let config = ClientConfig::builder("1001", "service-secret")
        .server_url(format!("{}/", server.base_url()))
        .app("55", "pay-secret")
        .apr_id("66")
        .production(true)
        .build()
        .unwrap();
    PayClient::new(config).unwrap()
}

#[tokio::test]
async fn get_sends_query_and_signed_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/1.0/users/show")
            .query_param("id", "7")
            .query_param("tags[0]", "a")
            .header("user-agent", "RESTAPI-SDK/0.2.0")
            .header("x-rest-sysid", "1001")
            .header("x-rest-client", "0.2.0")
            .header("x-rest-prod", "0")
            .header("x-rest-authorization", "user-token")
            .header("accept-encoding", "gzip, deflate")
            .header_exists("x-rest-signature");
        then.status(200).json_body(json!({"id": 7, "name": "alice"}));
    });

    let data = service_client(&server)
        .get("/users/show", &json!({"id": 7, "tags": ["a"]}))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(data["name"], "alice");
}

#[tokio::test]
async fn post_encodes_json_body() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/1.0/orders")
            .header("content-type", "application/json;charset=utf-8")
            .json_body(json!({"sku": "A1", "qty": 2}));
        then.status(200).json_body(json!({"order_id": 10}));
    });

    let data = service_client(&server)
        .post("/orders", &json!({"sku": "A1", "qty": 2}))
        .await
        .unwrap();

    mock.assert();
    assert_eq!(data["order_id"], 10);
}

#[tokio::test]
async fn put_and_delete() {
    let server = MockServer::start();
    let put = server.mock(|when, then| {
        when.method(PUT)
            .path("/1.0/orders/10")
            .json_body(json!({"qty": 3}));
        then.status(200).json_body(json!({"updated": true}));
    });
    let delete = server.mock(|when, then| {
        when.method(DELETE).path("/1.0/orders/10");
        then.status(200).json_body(json!({"deleted": true}));
    });

    let client = service_client(&server);
    assert_eq!(client.put("/orders/10", &json!({"qty": 3})).await.unwrap()["updated"], true);
    assert_eq!(client.delete("/orders/10").await.unwrap()["deleted"], true);
    put.assert();
    delete.assert();
}

#[tokio::test]
async fn pay_client_posts_form_with_app_headers() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/1.0/pay/create")
            .header("content-type", "application/x-www-form-urlencoded;charset=utf-8")
            .header("x-rest-client", "1.0.5")
            .header("x-rest-prod", "1")
            .header("x-client-appid", "55")
            .header("x-client-aprid", "66")
            .header_exists("x-client-signature")
            .body("amount=100&meta%5Bsource%5D=app&order=A1");
        then.status(200).json_body(json!({"pay_id": "p-1"}));
    });

    let data = pay_client(&server)
        .post(
            "/pay/create",
            &json!({"order": "A1", "amount": 100, "meta": {"source": "app"}}),
        )
        .await
        .unwrap();

    mock.assert();
    assert_eq!(data["pay_id"], "p-1");
}

#[tokio::test]
async fn caller_headers_override_defaults() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/1.0/raw")
            .header("content-type", "application/x-www-form-urlencoded")
            .header("x-trace-id", "trace-1")
            .body("a=1");
        then.status(200).json_body(json!({}));
    });

    let options = RequestOptions::new()
        .header("Content-Type", "application/x-www-form-urlencoded")
        .header("X-Trace-Id", "trace-1");
    service_client(&server)
        .request(http::Method::POST, "/raw", Some(&json!({"a": 1})), &options)
        .await
        .unwrap();

    mock.assert();
}

#[tokio::test]
async fn non_200_status_carries_request_id() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/missing");
        then.status(404)
            .header("X-Request-Id", "rid-404")
            .json_body(json!({"error_code": 404}));
    });

    let err = service_client(&server)
        .get("/missing", &json!({}))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SdkError::Status { ref request_id, status } if request_id == "rid-404" && status == 404
    ));
    assert_eq!(err.to_string(), "rid-404,404 Not Found");
}

#[tokio::test]
async fn html_answer_is_bad_request() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/page");
        then.status(200)
            .header("content-type", "text/html; charset=utf-8")
            .body("<html>login</html>");
    });

    let err = service_client(&server)
        .get("/page", &json!({}))
        .await
        .unwrap_err();
    assert!(matches!(err, SdkError::BadRequest { .. }));
    assert_eq!(err.to_string(), ",Bad request");
}

#[tokio::test]
async fn error_code_becomes_api_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/users/login");
        then.status(200)
            .json_body(json!({"error_code": "20001", "message": "invalid password"}));
    });

    let err = service_client(&server)
        .post("/users/login", &json!({"user": "bob"}))
        .await
        .unwrap_err();

    let SdkError::Api(api) = err else {
        panic!("expected Api error, got {err}");
    };
    assert_eq!(api.code, 20001);
    assert_eq!(api.message, "invalid password");
    assert_eq!(api.data["error_code"], "20001");
}

#[tokio::test]
async fn empty_error_code_is_success() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/ok");
        then.status(200)
            .json_body(json!({"error_code": "0", "message": "", "data": [1]}));
    });

    let data = service_client(&server).get("/ok", &json!({})).await.unwrap();
    assert_eq!(data["data"], json!([1]));
}

#[tokio::test]
async fn invalid_json_is_decode_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/text");
        then.status(200).body("not json");
    });

    let err = service_client(&server).get("/text", &json!({})).await.unwrap_err();
    assert!(matches!(err, SdkError::Decode(_)));
}

#[tokio::test]
async fn gzip_answer_is_decoded() {
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(br#"{"compressed":true}"#).unwrap();
    let body = enc.finish().unwrap();

    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/gz");
        then.status(200)
            .header("content-type", "application/json")
            .header("content-encoding", "gzip")
            .body(body);
    });

    let data = service_client(&server).get("/gz", &json!({})).await.unwrap();
    assert_eq!(data["compressed"], true);
}

#[tokio::test]
async fn per_request_timeout_is_transport_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.path("/1.0/slow");
        then.status(200)
            .delay(Duration::from_millis(500))
            .json_body(json!({}));
    });

    let options = RequestOptions::new().timeout(Duration::from_millis(50));
    let err = service_client(&server)
        .request(http::Method::GET, "/slow", None, &options)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SdkError::Transport { source: HttpError::Timeout(_), .. }
    ));
}

#[tokio::test]
async fn connection_refused_is_transport_error() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = ClientConfig::builder("1001", "k")
        .server_url(format!("http://{addr}"))
        .build()
        .unwrap();
    let err = ServiceClient::new(config)
        .unwrap()
        .get("/any", &json!({}))
        .await
        .unwrap_err();

    let SdkError::Transport { url, .. } = err else {
        panic!("expected Transport error, got {err}");
    };
    assert_eq!(url, format!("http://{addr}/1.0/any"));
}

#[tokio::test]
async fn batch_collects_failed_entries() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/1.0/batch")
            .body_includes(r#""requests":[{"#);
        then.status(200).json_body(json!([
            {"id": 1},
            {"error_code": 404, "message": "no such user"},
            {"error_code": null},
        ]));
    });

    let requests = vec![
        json!({"method": "GET", "path": "/users/1"}),
        json!({"method": "GET", "path": "/users/2"}),
        json!({"method": "GET", "path": "/users/3"}),
    ];
    let err = service_client(&server)
        .batch(&requests, &RequestOptions::default())
        .await
        .unwrap_err();

    mock.assert();
    let SdkError::Batch(batch) = err else {
        panic!("expected Batch error, got {err}");
    };
    assert_eq!(batch.errors().len(), 1);
    let first = batch.first().unwrap();
    assert_eq!(first.error_code, 404);
    assert_eq!(
        first.message,
        r#"404 no such user:{"method":"GET","path":"/users/2"}"#
    );
}

#[tokio::test]
async fn batch_without_errors_returns_answer() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/1.0/batch");
        then.status(200).json_body(json!([{"id": 1}, {"id": 2}]));
    });

    let requests = vec![json!({"path": "/a"}), json!({"path": "/b"})];
    let data = service_client(&server)
        .batch(&requests, &RequestOptions::default())
        .await
        .unwrap();
    assert_eq!(data[1]["id"], 2);
}
