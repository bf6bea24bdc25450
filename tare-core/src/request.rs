//! Request execution against a target
//!
//! The load driver only sees the [`Requester`] trait. [`HttpRequester`] is the
//! real implementation; tests substitute in-process fakes.

use reqwest::blocking::Client;
use std::time::Duration;

use crate::config::{HttpMethod, Target};
use crate::{Error, RequestError, Result};

/// Executes one blocking request against a target
pub trait Requester: Send + Sync {
    /// Issue a single request, waiting at most `timeout`
    ///
    /// Returns the HTTP status the server answered with (any status, including
    /// non-2xx), or the reason no complete response was received. Must not retry.
    fn execute(&self, target: &Target, timeout: Duration) -> std::result::Result<u16, RequestError>;
}

/// HTTP/1.1 requester backed by a pooled blocking `reqwest` client
pub struct HttpRequester {
    client: Client,
}

impl HttpRequester {
    /// Create a requester keeping up to `pool_size` idle connections per host
    pub fn new(pool_size: usize) -> Result<Self> {
        let client = Client::builder()
            .pool_max_idle_per_host(pool_size)
            .user_agent(concat!("tare/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

fn to_reqwest_method(method: HttpMethod) -> reqwest::Method {
    match method {
        HttpMethod::Get => reqwest::Method::GET,
        HttpMethod::Post => reqwest::Method::POST,
        HttpMethod::Put => reqwest::Method::PUT,
        HttpMethod::Delete => reqwest::Method::DELETE,
        HttpMethod::Patch => reqwest::Method::PATCH,
        HttpMethod::Head => reqwest::Method::HEAD,
    }
}

/// Innermost cause, which carries the useful part ("Connection refused")
fn root_cause(err: &(dyn std::error::Error + 'static)) -> String {
    let mut current = err;
    while let Some(source) = current.source() {
        current = source;
    }
    current.to_string()
}

fn classify(err: reqwest::Error) -> RequestError {
    if err.is_timeout() {
        RequestError::Timeout
    } else if err.is_connect() {
        RequestError::Connect(root_cause(&err))
    } else {
        RequestError::Other(root_cause(&err))
    }
}

impl Requester for HttpRequester {
    fn execute(&self, target: &Target, timeout: Duration) -> std::result::Result<u16, RequestError> {
        let mut request =
            self.client.request(to_reqwest_method(target.method), target.url()).timeout(timeout);

        for (name, value) in &target.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &target.body {
            request = request.body(body.clone());
        }

        let response = request.send().map_err(classify)?;
        let status = response.status().as_u16();

        // Read the body so latency covers the full response and the
        // connection goes back to the pool.
        response.bytes().map_err(classify)?;

        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_method_mapping() {
        assert_eq!(to_reqwest_method(HttpMethod::Get), reqwest::Method::GET);
        assert_eq!(to_reqwest_method(HttpMethod::Patch), reqwest::Method::PATCH);
        assert_eq!(to_reqwest_method(HttpMethod::Head), reqwest::Method::HEAD);
    }

    #[test]
    fn test_connection_refused_is_connect_error() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let requester = HttpRequester::new(1).unwrap();
        let target =
            Target::new("ghost", format!("http://127.0.0.1:{port}"), HttpMethod::Get, "/");

        let result = requester.execute(&target, Duration::from_secs(2));
        assert!(matches!(result, Err(RequestError::Connect(_))), "got {result:?}");
    }
}
