use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client as ReqwestClient, Response, header};
use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::observability::{BACKEND_REQUEST_ERRORS, BACKEND_REQUESTS};

/// HTTP plumbing shared by the hosted and local backends.
///
/// `timeout` bounds connecting and the wait for response headers.  Streamed
/// bodies are not bounded, so a long answer can keep arriving.
#[derive(Debug, Clone)]
pub(crate) struct HttpClient {
    client: ReqwestClient,
    timeout: Duration,
}

impl HttpClient {
    pub(crate) fn new(timeout: Duration) -> Result<Self> {
        let client = ReqwestClient::builder()
            .connect_timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {}", e),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self { client, timeout })
    }

    /// POST `body` as JSON and return the response if its status is a success.
    pub(crate) async fn post_json<T: Serialize + ?Sized>(
        &self,
        url: Url,
        headers: HeaderMap,
        body: &T,
        model: &str,
    ) -> Result<Response> {
        BACKEND_REQUESTS.click();
        tracing::debug!(url = %redact(&url), model, "sending request");
        let send = self.client.post(url).headers(headers).json(body).send();
        let response = self
            .deadline("Request", send)
            .await
            .inspect_err(|_| BACKEND_REQUEST_ERRORS.click())?
            .map_err(|e| {
                BACKEND_REQUEST_ERRORS.click();
                if e.is_timeout() {
                    Error::timeout(
                        format!("Request timed out: {}", e),
                        Some(self.timeout.as_secs_f64()),
                    )
                } else if e.is_connect() {
                    Error::connection(format!("Connection error: {}", e), Some(Box::new(e)))
                } else {
                    Error::http_client(format!("Request failed: {}", e), Some(Box::new(e)))
                }
            })?;

        if !response.status().is_success() {
            BACKEND_REQUEST_ERRORS.click();
            let err = process_error_response(response, model).await;
            tracing::warn!(error = %err, "provider rejected request");
            return Err(err);
        }
        Ok(response)
    }

    /// Read a whole, non-streamed response body within the timeout.
    pub(crate) async fn read_text(&self, response: Response) -> Result<String> {
        self.deadline("Reading the response", response.text())
            .await?
            .map_err(|e| {
                Error::http_client(format!("Failed to read response: {e}"), Some(Box::new(e)))
            })
    }

    async fn deadline<F: Future>(&self, what: &str, future: F) -> Result<F::Output> {
        tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| {
                Error::timeout(
                    format!("{what} timed out"),
                    Some(self.timeout.as_secs_f64()),
                )
            })
    }
}

/// Create the default headers for JSON requests.
pub(crate) fn json_headers(accept: &'static str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static(accept));
    headers
}

/// Add an `Authorization: Bearer` header.
pub(crate) fn bearer(headers: &mut HeaderMap, api_key: &str) -> Result<()> {
    let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
        .map_err(|_| Error::authentication("API key contains invalid header characters"))?;
    headers.insert(header::AUTHORIZATION, value);
    Ok(())
}

/// Join `path` onto `base`, tolerating a missing trailing slash on `base`.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url> {
    let base = if base.ends_with('/') {
        Url::parse(base)?
    } else {
        Url::parse(&format!("{base}/"))?
    };
    Ok(base.join(path)?)
}

/// Process a provider error response and convert it to our Error type.
pub(crate) async fn process_error_response(response: Response, model: &str) -> Error {
    let status_code = response.status().as_u16();

    let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|val| val.to_str().ok())
        .and_then(|val| val.parse::<u64>().ok());

    let error_body = match response.text().await {
        Ok(body) => body,
        Err(e) => {
            return Error::http_client(
                format!("Failed to read error response: {}", e),
                Some(Box::new(e)),
            );
        }
    };
    error_for_status(status_code, retry_after, &error_body, model)
}

/// Map a status code and error body onto the error taxonomy.
///
/// Providers disagree on the body shape: OpenAI-compatible services and
/// Gemini nest `{error: {message, type|status, param}}`, Ollama sends
/// `{error: "..."}`.
pub(crate) fn error_for_status(
    status_code: u16,
    retry_after: Option<u64>,
    body: &str,
    model: &str,
) -> Error {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let detail = parsed.as_ref().and_then(|v| v.get("error"));
    let message = detail
        .and_then(|e| match e {
            Value::String(s) => Some(s.clone()),
            Value::Object(_) => e.get("message").and_then(Value::as_str).map(String::from),
            _ => None,
        })
        .unwrap_or_else(|| body.trim().to_string());
    let error_type = detail
        .and_then(|e| e.get("type").or_else(|| e.get("status")))
        .and_then(Value::as_str)
        .map(String::from);
    let param = detail
        .and_then(|e| e.get("param"))
        .and_then(Value::as_str)
        .map(String::from);

    match status_code {
        400 => Error::bad_request(message, param),
        401 | 403 => Error::authentication(message),
        402 | 429 => Error::rate_limit(message, retry_after),
        404 => Error::invalid_model(message, Some(model.to_string())),
        408 => Error::timeout(message, None),
        502..=504 => Error::service_unavailable(message, retry_after),
        _ => Error::api(status_code, error_type, message),
    }
}

fn redact(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}
