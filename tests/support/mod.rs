//! Shared doubles for the behavior tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use altmetrix_core::http_client::HttpFuture;
use altmetrix_core::{HttpClient, HttpError, HttpRequest, HttpResponse};

type Outcome = Result<HttpResponse, HttpError>;

/// Replays scripted outcomes per URL prefix. The last outcome of a route
/// repeats once the script runs out; unknown URLs fail to connect.
#[derive(Default)]
pub struct ScriptedHttpClient {
    routes: Mutex<Vec<(String, VecDeque<Outcome>)>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedHttpClient {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn route(self: &Arc<Self>, prefix: &str, outcomes: Vec<Outcome>) -> Arc<Self> {
        self.routes
            .lock()
            .expect("routes")
            .push((prefix.to_owned(), outcomes.into()));
        Arc::clone(self)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests").clone()
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().expect("requests").len()
    }
}

impl HttpClient for ScriptedHttpClient {
    fn execute<'a>(&'a self, request: HttpRequest) -> HttpFuture<'a> {
        let outcome = {
            let mut routes = self.routes.lock().expect("routes");
            match routes
                .iter_mut()
                .find(|(prefix, _)| request.url.starts_with(prefix.as_str()))
            {
                Some((_, script)) if script.len() > 1 => script.pop_front().expect("scripted outcome"),
                Some((_, script)) => script
                    .front()
                    .cloned()
                    .unwrap_or_else(|| Err(HttpError::connect("script exhausted"))),
                None => Err(HttpError::connect(format!("no route for {}", request.url))),
            }
        };
        self.requests.lock().expect("requests").push(request);
        Box::pin(async move { outcome })
    }
}

pub fn write_config(dir: &Path, name: &str, contents: &str) {
    fs::write(dir.join(name), contents).expect("write config");
}
