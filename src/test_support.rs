//! Shared helpers for tests that talk HTTP
//!
//! `MockServer` answers requests on a loopback port with canned responses,
//! in order, and records the URL of every request it served. Once the
//! canned responses run out the server shuts down, so any extra request
//! fails with a connection error.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

pub(crate) struct Canned {
    status: u16,
    body: String,
    content_type: &'static str,
}

impl Canned {
    pub fn xml(body: &str) -> Self {
        Self { status: 200, body: body.to_string(), content_type: "text/xml" }
    }

    pub fn json(body: serde_json::Value) -> Self {
        Self { status: 200, body: body.to_string(), content_type: "application/json" }
    }

    pub fn status(status: u16, body: &str) -> Self {
        Self { status, body: body.to_string(), content_type: "text/plain" }
    }
}

pub(crate) struct MockServer {
    pub url: String,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockServer {
    pub fn start(responses: Vec<Canned>) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let addr = server.server_addr().to_ip().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&requests);

        thread::spawn(move || {
            for canned in responses {
                let request = match server.recv_timeout(Duration::from_secs(10)) {
                    Ok(Some(request)) => request,
                    _ => return,
                };
                log.lock().unwrap().push(request.url().to_string());

                let header = tiny_http::Header::from_bytes(
                    &b"Content-Type"[..],
                    canned.content_type.as_bytes(),
                )
                .unwrap();
                let response = tiny_http::Response::from_string(canned.body)
                    .with_status_code(canned.status)
                    .with_header(header);
                let _ = request.respond(response);
            }
        });

        Self {
            url: format!("http://{}", addr),
            requests,
        }
    }

    /// URLs (path and query) of the requests served so far
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// A port that accepts connections but never answers
pub(crate) fn unresponsive_server() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    (listener, url)
}

/// Client that ignores proxy environment variables so loopback URLs work
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .timeout(timeout)
        .build()
        .unwrap()
}

pub(crate) fn decoded(url: &str) -> String {
    urlencoding::decode(url).unwrap().into_owned()
}
