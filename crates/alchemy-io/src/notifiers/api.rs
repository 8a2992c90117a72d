//! Sends each artifact (or a body built from it) to an HTTP endpoint.
//!
//! A 2xx response succeeds and its body, parsed as JSON when possible, becomes the
//! payload for the next notifier. Any other status, or a transport error, fails the
//! notifier with the response text or error message as payload.

use super::expand_placeholders;
use crate::params::{ParamError, ParamSpec, Params};
use crate::plugin::{NetworkView, Notifier, NotifyOutcome, Payload};
use anyhow::{bail, Result};
use std::time::Duration;
use tracing::{error, info};

const PARAMETERS: &[ParamSpec] = &[
    ParamSpec::required("api_endpoint", "Target URL; placeholders are expanded"),
    ParamSpec::optional("api_key", "", "Sent as X-User-ID"),
    ParamSpec::optional("api_token", "", "Sent as X-Auth-Token"),
    ParamSpec::optional("method", "GET", "HTTP method"),
    ParamSpec::optional("timeout", "30", "Request timeout in seconds"),
    ParamSpec::optional(
        "body_template",
        "",
        "Request body with {network}, {network_id} and {data}; empty sends the payload",
    ),
    ParamSpec::optional("binary_data", "false", "Send the body as application/octet-stream"),
];

const METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD"];

#[derive(Debug, Clone, PartialEq)]
pub struct ApiNotifierConfig {
    pub api_endpoint: String,
    pub api_key: String,
    pub api_token: String,
    pub method: String,
    pub timeout: Duration,
    pub body_template: String,
    pub binary_data: bool,
}

/// Non-negative, finite number of seconds.
fn timeout(params: &Params) -> Result<Duration, ParamError> {
    let seconds = params.number::<f64>("timeout")?;
    Duration::try_from_secs_f64(seconds).map_err(|err| ParamError::Invalid {
        key: "timeout".to_string(),
        value: params.get("timeout").unwrap_or_default().to_string(),
        reason: err.to_string(),
    })
}

impl ApiNotifierConfig {
    pub fn from_params(params: &Params, view: &NetworkView<'_>) -> Result<Self> {
        let params = params.resolve(PARAMETERS)?;
        let method = params.require("method")?.trim().to_ascii_uppercase();
        if !METHODS.contains(&method.as_str()) {
            bail!("HTTP method {method} is not supported");
        }
        Ok(Self {
            api_endpoint: expand_placeholders(params.require("api_endpoint")?, view, &params),
            api_key: params.require("api_key")?.to_string(),
            api_token: params.require("api_token")?.to_string(),
            method,
            timeout: timeout(&params)?,
            body_template: params.require("body_template")?.to_string(),
            binary_data: params.flag("binary_data")?,
        })
    }

    fn sends_body(&self) -> bool {
        !matches!(self.method.as_str(), "GET" | "DELETE" | "HEAD")
    }

    /// Request body for `payload`, or `None` for body-less methods.
    pub fn body(
        &self,
        view: &NetworkView<'_>,
        payload: &Payload,
        params: &Params,
    ) -> Option<String> {
        if !self.sends_body() {
            return None;
        }
        let data = payload.to_text();
        if self.body_template.is_empty() {
            return Some(data.into_owned());
        }
        Some(expand_placeholders(&self.body_template, view, params).replace("{data}", &data))
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ApiNotifier;

impl Notifier for ApiNotifier {
    fn name(&self) -> &'static str {
        "ApiNotifier"
    }

    fn required_parameters(&self) -> &'static [ParamSpec] {
        PARAMETERS
    }

    fn notify(
        &self,
        view: NetworkView<'_>,
        payload: Payload,
        params: &Params,
    ) -> Result<NotifyOutcome> {
        let config = ApiNotifierConfig::from_params(params, &view)?;
        let body = config.body(&view, &payload, params);

        let agent = ureq::AgentBuilder::new().timeout(config.timeout).build();
        let content_type = if config.binary_data {
            "application/octet-stream"
        } else {
            "application/json"
        };
        let request = agent
            .request(&config.method, &config.api_endpoint)
            .set("X-Auth-Token", &config.api_token)
            .set("X-User-ID", &config.api_key)
            .set("Content-Type", content_type);
        let response = match body {
            Some(body) if config.binary_data => request.send_bytes(body.as_bytes()),
            Some(body) => request.send_string(&body),
            None => request.call(),
        };

        match response {
            Ok(response) if (200..300).contains(&response.status()) => {
                info!(network = view.id(), "notified {}", config.api_endpoint);
                let text = response.into_string()?;
                Ok(NotifyOutcome::success(Payload::parse(text)))
            }
            Ok(response) => {
                let status = response.status();
                let text = response.into_string().unwrap_or_default();
                error!(network = view.id(), "API notification failed with status {status}: {text}");
                Ok(NotifyOutcome::failure(Payload::Text(text)))
            }
            Err(ureq::Error::Status(status, response)) => {
                let text = response.into_string().unwrap_or_default();
                error!(network = view.id(), "API notification failed with status {status}: {text}");
                Ok(NotifyOutcome::failure(Payload::Text(text)))
            }
            Err(err) => {
                error!(network = view.id(), "error during API notification: {err}");
                Ok(NotifyOutcome::failure(Payload::Text(err.to_string())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alchemy_core::Topology;
    use serde_json::json;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::thread::{self, JoinHandle};

    /// Serve a single request with `status` and `body`; the handle yields the raw request.
    fn serve_once(status: u16, body: &'static str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut request = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some(value) = line.to_ascii_lowercase().strip_prefix("content-length:") {
                    content_length = value.trim().parse().unwrap();
                }
                request.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body_bytes = vec![0; content_length];
            reader.read_exact(&mut body_bytes).unwrap();
            request.push_str(&String::from_utf8_lossy(&body_bytes));

            let reply = format!(
                "HTTP/1.1 {status} X\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            reader.get_mut().write_all(reply.as_bytes()).unwrap();
            request
        });
        (url, handle)
    }

    fn notify(params: Params, payload: Payload) -> NotifyOutcome {
        let mut topo = Topology::new("F1", "Feeder", "sys");
        let root = topo.root();
        ApiNotifier
            .notify(NetworkView::new(&mut topo, root), payload, &params)
            .unwrap()
    }

    #[test]
    fn test_post_payload_and_parse_response() {
        let (url, server) = serve_once(200, "{\"accepted\":true}");
        let params = Params::new()
            .with("api_endpoint", format!("{url}/networks/{{network_id}}"))
            .with("method", "post")
            .with("api_token", "secret");
        let outcome = notify(params, Payload::Json(json!({"buses": []})));

        assert!(outcome.ok);
        assert_eq!(outcome.payload, Payload::Json(json!({"accepted": true})));
        let request = server.join().unwrap();
        assert!(request.starts_with("POST /networks/F1 "));
        assert!(request.to_ascii_lowercase().contains("x-auth-token: secret"));
        assert!(request.ends_with("{\"buses\":[]}"));
    }

    #[test]
    fn test_get_sends_no_body() {
        let (url, server) = serve_once(204, "");
        let params = Params::new().with("api_endpoint", url);
        let outcome = notify(params, Payload::Text("ignored".into()));

        assert!(outcome.ok);
        let request = server.join().unwrap();
        assert!(request.starts_with("GET / "));
        assert!(!request.contains("ignored"));
    }

    #[test]
    fn test_error_status_fails() {
        let (url, server) = serve_once(500, "boom");
        let params = Params::new().with("api_endpoint", url).with("method", "PUT");
        let outcome = notify(params, Payload::Text("x".into()));

        assert!(!outcome.ok);
        assert_eq!(outcome.payload, Payload::Text("boom".into()));
        server.join().unwrap();
    }

    #[test]
    fn test_body_template() {
        let mut topo = Topology::new("F1", "Feeder", "sys");
        let root = topo.root();
        let view = NetworkView::new(&mut topo, root);
        let params = Params::new()
            .with("api_endpoint", "http://localhost")
            .with("method", "POST")
            .with("body_template", "{\"network\":\"{network_id}\",\"doc\":{data}}");
        let config = ApiNotifierConfig::from_params(&params, &view).unwrap();
        let body = config.body(&view, &Payload::Json(json!({"a": 1})), &params);
        assert_eq!(body.as_deref(), Some("{\"network\":\"F1\",\"doc\":{\"a\":1}}"));
    }

    #[test]
    fn test_rejects_unknown_method() {
        let mut topo = Topology::new("F1", "Feeder", "sys");
        let root = topo.root();
        let view = NetworkView::new(&mut topo, root);
        let params = Params::new()
            .with("api_endpoint", "http://localhost")
            .with("method", "BREW");
        assert!(ApiNotifierConfig::from_params(&params, &view).is_err());
    }

    #[test]
    fn test_timeout_must_fit_a_duration() {
        let mut topo = Topology::new("F1", "Feeder", "sys");
        let root = topo.root();
        let view = NetworkView::new(&mut topo, root);
        let base = Params::new().with("api_endpoint", "http://localhost");

        let config = ApiNotifierConfig::from_params(&base.clone().with("timeout", "2.5"), &view)
            .unwrap();
        assert_eq!(config.timeout, Duration::from_millis(2500));

        for bad in ["inf", "1e30", "-1", "NaN"] {
            let err = ApiNotifierConfig::from_params(&base.clone().with("timeout", bad), &view)
                .unwrap_err();
            assert!(
                matches!(
                    err.downcast_ref::<ParamError>(),
                    Some(ParamError::Invalid { key, .. }) if key == "timeout"
                ),
                "{bad}: {err}"
            );
        }
    }
}
