//! End-to-end tests driving a real, locally-bound server instance over
//! raw `TcpStream`s, the same way the teacher's `integration_tests.rs`
//! drives a live HTTP listener.

use std::io::{Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use gunkan_blob::config::Config;
use gunkan_blob::path_mapper::HashLayout;
use gunkan_blob::Server;

fn test_config(basedir: std::path::PathBuf, endpoint: String) -> Config {
    Config {
        namespace: "test-ns".to_string(),
        endpoint,
        basedir,
        hash_layout: HashLayout { width: 2, depth: 2 },
        workers_ingress: 64,
        workers_be_read: 1024,
        workers_be_write: 1024,
        workers_rt_read: 8,
        workers_rt_write: 8,
        pidfile: None,
        daemonize: false,
        quiet: true,
        verbose: false,
        init: false,
        fallocate: true,
        fadvise_upload: true,
        fsync_data: false,
        fsync_dir: false,
    }
}

fn free_endpoint() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Spins up a real server instance on an ephemeral port and returns its
/// endpoint. The runtime and its threads are leaked for the process
/// lifetime, which is fine inside a short-lived test binary.
async fn spawn_server() -> (String, tempfile::TempDir) {
    let tmp = tempfile::tempdir().unwrap();
    let endpoint = free_endpoint();
    let config = test_config(tmp.path().to_path_buf(), endpoint.clone());
    let server = Server::new(config).unwrap();
    let (_tx, rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = server.run(rx).await;
    });
    // Give the acceptor thread a moment to bind and start accepting.
    tokio::time::sleep(Duration::from_millis(150)).await;
    (endpoint, tmp)
}

fn send_raw(endpoint: &str, request: &str) -> String {
    let mut stream = TcpStream::connect(endpoint).unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    stream.write_all(request.as_bytes()).unwrap();
    let mut response = Vec::new();
    stream.read_to_end(&mut response).unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

fn put_request(url: &str, body: &[u8]) -> String {
    format!(
        "PUT {} HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
        url,
        body.len(),
        String::from_utf8_lossy(body)
    )
}

fn status_line(response: &str) -> &str {
    response.lines().next().unwrap_or("")
}

#[tokio::test]
async fn put_head_get_roundtrip() {
    let (endpoint, _tmp) = spawn_server().await;
    let url = "/v1/blob/aabb,01,0";

    let put_resp = send_raw(&endpoint, &put_request(url, b"hello world"));
    assert!(status_line(&put_resp).contains("201"), "{}", put_resp);

    let head_req = format!("HEAD {} HTTP/1.1\r\nHost: x\r\n\r\n", url);
    let head_resp = send_raw(&endpoint, &head_req);
    assert!(status_line(&head_resp).contains("200"), "{}", head_resp);
    assert!(head_resp.contains("Content-Length: 11"));

    let get_req = format!("GET {} HTTP/1.1\r\nHost: x\r\n\r\n", url);
    let get_resp = send_raw(&endpoint, &get_req);
    assert!(status_line(&get_resp).contains("200"), "{}", get_resp);
    assert!(get_resp.ends_with("hello world"));
}

#[tokio::test]
async fn double_put_is_rejected_with_409() {
    let (endpoint, _tmp) = spawn_server().await;
    let url = "/v1/blob/ccdd,02,0";

    let first = send_raw(&endpoint, &put_request(url, b"one"));
    assert!(status_line(&first).contains("201"), "{}", first);

    let second = send_raw(&endpoint, &put_request(url, b"two"));
    assert!(status_line(&second).contains("409"), "{}", second);
}

#[tokio::test]
async fn empty_body_put_then_get_is_204() {
    let (endpoint, _tmp) = spawn_server().await;
    let url = "/v1/blob/eeff,03,0";

    let put_resp = send_raw(&endpoint, &put_request(url, b""));
    assert!(status_line(&put_resp).contains("201"), "{}", put_resp);

    let get_req = format!("GET {} HTTP/1.1\r\nHost: x\r\n\r\n", url);
    let get_resp = send_raw(&endpoint, &get_req);
    assert!(status_line(&get_resp).contains("204"), "{}", get_resp);
}

#[tokio::test]
async fn delete_then_get_is_404() {
    let (endpoint, _tmp) = spawn_server().await;
    let url = "/v1/blob/1122,04,0";

    let put_resp = send_raw(&endpoint, &put_request(url, b"gone soon"));
    assert!(status_line(&put_resp).contains("201"), "{}", put_resp);

    let delete_req = format!("DELETE {} HTTP/1.1\r\nHost: x\r\n\r\n", url);
    let delete_resp = send_raw(&endpoint, &delete_req);
    assert!(status_line(&delete_resp).contains("204"), "{}", delete_resp);

    let get_req = format!("GET {} HTTP/1.1\r\nHost: x\r\n\r\n", url);
    let get_resp = send_raw(&endpoint, &get_req);
    assert!(status_line(&get_resp).contains("404"), "{}", get_resp);
}

#[tokio::test]
async fn list_is_sorted_and_respects_marker() {
    let (endpoint, _tmp) = spawn_server().await;
    for content in ["aa00", "aa01", "aa02"] {
        let url = format!("/v1/blob/{},00,0", content);
        let resp = send_raw(&endpoint, &put_request(&url, b"x"));
        assert!(status_line(&resp).contains("201"), "{}", resp);
    }

    let list_resp = send_raw(&endpoint, "GET /v1/list HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(status_line(&list_resp).contains("200"), "{}", list_resp);
    let body = list_resp.split("\r\n\r\n").nth(1).unwrap_or("");
    let ids: Vec<&str> = body.split("\r\n").filter(|l| l.contains(',')).collect();
    assert_eq!(ids, vec!["aa00,00,0", "aa01,00,0", "aa02,00,0"]);
}

#[tokio::test]
async fn info_banner() {
    let (endpoint, _tmp) = spawn_server().await;
    let resp = send_raw(&endpoint, "GET /info HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(status_line(&resp).contains("200"), "{}", resp);
    assert!(resp.contains("gunkan object-storage blob v1"));
}

#[tokio::test]
async fn status_endpoint_reports_json_counters() {
    let (endpoint, _tmp) = spawn_server().await;
    let url = "/v1/blob/9900,00,0";
    let _ = send_raw(&endpoint, &put_request(url, b"counted"));

    let resp = send_raw(&endpoint, "GET /v1/status HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(status_line(&resp).contains("200"), "{}", resp);
    assert!(resp.contains("\"h_put\""));
    assert!(resp.contains("\"b_in\""));
    assert!(resp.contains("\"c_201\""));
}

#[tokio::test]
async fn unknown_url_is_teapot() {
    let (endpoint, _tmp) = spawn_server().await;
    let resp = send_raw(&endpoint, "GET /nonsense HTTP/1.1\r\nHost: x\r\n\r\n");
    assert!(status_line(&resp).contains("418"), "{}", resp);
}
