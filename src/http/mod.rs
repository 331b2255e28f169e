// Shared plumbing for the OpenAI-compatible HTTP clients


use std::time::Duration;

use serde::Deserialize;
use ureq::Body;
use ureq::http::Response;

use crate::{RagError, Result};

/// Upper bound on a buffered JSON response body
const MAX_RESPONSE_BYTES: u64 = 64 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Blocking agent that returns non-2xx responses instead of failing, so the
/// caller can classify them.
pub(crate) fn agent(timeout: Duration) -> ureq::Agent {
    ureq::Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build()
        .into()
}

/// Join `base_url` and an endpoint path without doubling slashes.
pub(crate) fn endpoint(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// POST a JSON body with bearer authentication.
///
/// Returns the response only when its status is 2xx; other statuses and
/// transport failures are classified into [`RagError`] variants.
pub(crate) fn post_json(
    agent: &ureq::Agent,
    url: &str,
    api_key: &str,
    body: &str,
    service: &str,
) -> Result<Response<Body>> {
    let mut response = agent
        .post(url)
        .header("Authorization", &format!("Bearer {}", api_key))
        .header("Content-Type", "application/json")
        .send(body)
        .map_err(|e| transport_error(service, &e))?;

    let status = response.status().as_u16();
    if (200..300).contains(&status) {
        return Ok(response);
    }

    let text = response
        .body_mut()
        .read_to_string()
        .unwrap_or_default();
    Err(status_error(service, status, &text))
}

/// Read a whole response body as text.
pub(crate) fn read_body(mut response: Response<Body>, service: &str) -> Result<String> {
    response
        .body_mut()
        .with_config()
        .limit(MAX_RESPONSE_BYTES)
        .read_to_string()
        .map_err(|e| transport_error(service, &e))
}

pub(crate) fn transport_error(service: &str, error: &ureq::Error) -> RagError {
    match error {
        ureq::Error::Timeout(_)
        | ureq::Error::Io(_)
        | ureq::Error::ConnectionFailed
        | ureq::Error::HostNotFound => RagError::Network {
            service: service.to_string(),
            message: error.to_string(),
        },
        other => RagError::Other(anyhow::anyhow!("{} request failed: {}", service, other)),
    }
}

/// Classify a non-2xx status.
pub(crate) fn status_error(service: &str, status: u16, body: &str) -> RagError {
    let message = serde_json::from_str::<ErrorEnvelope>(body)
        .map(|envelope| envelope.error.message)
        .unwrap_or_else(|_| body.trim().to_string());

    match status {
        401 | 403 => RagError::Authentication {
            service: service.to_string(),
            message,
        },
        429 => RagError::RateLimited {
            service: service.to_string(),
            attempts: 1,
        },
        _ => RagError::Api {
            service: service.to_string(),
            status,
            message,
        },
    }
}
