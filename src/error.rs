//! Error types for genie.
//!
//! Every failure a chat session can observe is a variant of [`Error`].  The
//! session controller uses the classification predicates to decide whether a
//! failure ends the session (configuration and input failures) or only the
//! current turn or command (everything else).

use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;
use std::sync::Arc;

type Cause = Arc<dyn error::Error + Send + Sync>;

/// A boxed underlying failure handed to the error constructors.
pub type BoxedCause = Box<dyn error::Error + Send + Sync>;

/// The main error type for genie.
#[derive(Clone, Debug)]
pub enum Error {
    /// No usable backend could be configured at session start.
    Configuration {
        message: String,
        /// Corrective instruction shown to the user.
        hint: Option<String>,
    },

    /// The provider rejected the credentials.
    Authentication {
        message: String,
    },

    /// The provider refused to answer for safety reasons.
    SafetyBlocked {
        message: String,
    },

    /// The configured model does not exist at the provider.
    InvalidModel {
        message: String,
        /// The model that was requested.
        model: Option<String>,
    },

    /// The provider throttled the request or the account is out of quota.
    RateLimit {
        message: String,
        /// Seconds from `Retry-After`, when sent.
        retry_after: Option<u64>,
    },

    /// The provider rejected the request body.
    BadRequest {
        message: String,
        /// The offending request field, when the provider names one.
        param: Option<String>,
    },

    /// A generic provider error.
    Api {
        /// HTTP status code.
        status_code: u16,
        /// The provider's own error classification.
        error_type: Option<String>,
        message: String,
    },

    /// The provider or a gateway in front of it is down.
    ServiceUnavailable {
        message: String,
        retry_after: Option<u64>,
    },

    /// No response within the configured request timeout.
    Timeout {
        message: String,
        duration: Option<f64>,
    },

    /// The provider could not be reached.
    Connection {
        message: String,
        source: Option<Cause>,
    },

    /// The HTTP client itself failed.
    HttpClient {
        message: String,
        source: Option<Cause>,
    },

    /// A streamed response broke off or carried a malformed chunk.
    Streaming {
        message: String,
        source: Option<Cause>,
    },

    /// Error during JSON or YAML serialization or deserialization.
    Serialization {
        message: String,
        source: Option<Cause>,
    },

    /// A response body was not valid UTF-8.
    Encoding {
        message: String,
        source: Option<Cause>,
    },

    /// A local file could not be read or written.
    Io {
        message: String,
        source: Arc<io::Error>,
    },

    /// The terminal input stream is closed or unreadable.
    Input {
        message: String,
        source: Option<Cause>,
    },

    /// Writing an exported transcript failed.
    Export {
        message: String,
        source: Option<Cause>,
    },

    /// Delivering a transcript to the notification endpoint failed.
    Notify {
        message: String,
        /// HTTP status code returned by the endpoint, if any.
        status_code: Option<u16>,
    },

    /// A configured endpoint is not a valid URL.
    Url {
        message: String,
        source: Option<url::ParseError>,
    },
}

impl Error {
    /// A configuration error with an optional corrective `hint`.
    pub fn configuration(message: impl Into<String>, hint: Option<String>) -> Self {
        Error::Configuration {
            message: message.into(),
            hint,
        }
    }

    /// Credentials were rejected.
    pub fn authentication(message: impl Into<String>) -> Self {
        Error::Authentication {
            message: message.into(),
        }
    }

    /// The provider's safety filter refused to answer.
    pub fn safety_blocked(message: impl Into<String>) -> Self {
        Error::SafetyBlocked {
            message: message.into(),
        }
    }

    pub fn invalid_model(message: impl Into<String>, model: Option<String>) -> Self {
        Error::InvalidModel {
            message: message.into(),
            model,
        }
    }

    /// Throttled or out of quota.
    pub fn rate_limit(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::RateLimit {
            message: message.into(),
            retry_after,
        }
    }

    pub fn bad_request(message: impl Into<String>, param: Option<String>) -> Self {
        Error::BadRequest {
            message: message.into(),
            param,
        }
    }

    /// Any provider failure without a more specific variant.
    pub fn api(status_code: u16, error_type: Option<String>, message: impl Into<String>) -> Self {
        Error::Api {
            status_code,
            error_type,
            message: message.into(),
        }
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Error::ServiceUnavailable {
            message: message.into(),
            retry_after,
        }
    }

    /// `duration` is the timeout that elapsed, in seconds.
    pub fn timeout(message: impl Into<String>, duration: Option<f64>) -> Self {
        Error::Timeout {
            message: message.into(),
            duration,
        }
    }

    pub fn connection(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::Connection {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn http_client(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::HttpClient {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// A broken or malformed response stream.
    pub fn streaming(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::Streaming {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn serialization(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::Serialization {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn encoding(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::Encoding {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Wrap `source` with a description of what was being accessed.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Error::Io {
            message: message.into(),
            source: Arc::new(source),
        }
    }

    /// The terminal failed; this ends the session.
    pub fn input(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::Input {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    pub fn export(
        message: impl Into<String>,
        source: Option<BoxedCause>,
    ) -> Self {
        Error::Export {
            message: message.into(),
            source: source.map(Arc::from),
        }
    }

    /// Transcript delivery failed, with the endpoint's status if it answered.
    pub fn notify(message: impl Into<String>, status_code: Option<u16>) -> Self {
        Error::Notify {
            message: message.into(),
            status_code,
        }
    }

    pub fn url(message: impl Into<String>, source: Option<url::ParseError>) -> Self {
        Error::Url {
            message: message.into(),
            source,
        }
    }

    /// Returns true if this error is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. })
    }

    /// Returns true if this error is related to authentication.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Error::Authentication { .. })
    }

    /// Returns true if this error is a safety block.
    pub fn is_safety_blocked(&self) -> bool {
        matches!(self, Error::SafetyBlocked { .. })
    }

    /// Returns true if this error is related to rate limiting.
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, Error::RateLimit { .. })
    }

    /// Returns true if this error is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. })
    }

    /// Returns true if this error is an input error.
    pub fn is_input(&self) -> bool {
        matches!(self, Error::Input { .. })
    }

    /// Returns true if the failure happened while moving bytes.
    ///
    /// Network failures, broken streams and malformed chunks are transport
    /// errors.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. }
                | Error::Timeout { .. }
                | Error::HttpClient { .. }
                | Error::Streaming { .. }
                | Error::Serialization { .. }
                | Error::Encoding { .. }
        )
    }

    /// Returns true if the provider answered with a refusal.
    pub fn is_provider(&self) -> bool {
        matches!(
            self,
            Error::Authentication { .. }
                | Error::SafetyBlocked { .. }
                | Error::InvalidModel { .. }
                | Error::RateLimit { .. }
                | Error::BadRequest { .. }
                | Error::Api { .. }
                | Error::ServiceUnavailable { .. }
        )
    }

    /// Returns true if this error must end the session.
    pub fn is_fatal(&self) -> bool {
        self.is_configuration() || self.is_input()
    }

    /// Returns the corrective instruction attached to a configuration error.
    pub fn hint(&self) -> Option<&str> {
        match self {
            Error::Configuration { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }

    /// Returns the status code associated with this error, if any.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Error::Api { status_code, .. } => Some(*status_code),
            Error::Notify { status_code, .. } => *status_code,
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Configuration { message, .. } => {
                write!(f, "Configuration error: {message}")
            }
            Error::Authentication { message } => {
                write!(f, "Authentication error: {message}")
            }
            Error::SafetyBlocked { message } => {
                write!(f, "Blocked by safety settings: {message}")
            }
            Error::InvalidModel { message, model } => {
                if let Some(model) = model {
                    write!(f, "Invalid model {model}: {message}")
                } else {
                    write!(f, "Invalid model: {message}")
                }
            }
            Error::RateLimit {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Rate limit exceeded: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Rate limit exceeded: {message}")
                }
            }
            Error::BadRequest { message, param } => {
                if let Some(param) = param {
                    write!(f, "Bad request: {message} (parameter: {param})")
                } else {
                    write!(f, "Bad request: {message}")
                }
            }
            Error::Api {
                status_code,
                error_type,
                message,
            } => {
                if let Some(error_type) = error_type {
                    write!(f, "{error_type} ({status_code}): {message}")
                } else {
                    write!(f, "Provider error ({status_code}): {message}")
                }
            }
            Error::ServiceUnavailable {
                message,
                retry_after,
            } => {
                if let Some(retry_after) = retry_after {
                    write!(
                        f,
                        "Service unavailable: {message} (retry after {retry_after} seconds)"
                    )
                } else {
                    write!(f, "Service unavailable: {message}")
                }
            }
            Error::Timeout { message, duration } => {
                if let Some(duration) = duration {
                    write!(f, "Timeout error: {message} ({duration} seconds)")
                } else {
                    write!(f, "Timeout error: {message}")
                }
            }
            Error::Connection { message, .. } => {
                write!(f, "Connection error: {message}")
            }
            Error::HttpClient { message, .. } => {
                write!(f, "HTTP client error: {message}")
            }
            Error::Streaming { message, .. } => {
                write!(f, "Streaming error: {message}")
            }
            Error::Serialization { message, .. } => {
                write!(f, "Serialization error: {message}")
            }
            Error::Encoding { message, .. } => {
                write!(f, "Encoding error: {message}")
            }
            Error::Io { message, .. } => {
                write!(f, "I/O error: {message}")
            }
            Error::Input { message, .. } => {
                write!(f, "Input error: {message}")
            }
            Error::Export { message, .. } => {
                write!(f, "Export failed: {message}")
            }
            Error::Notify {
                message,
                status_code,
            } => {
                if let Some(status_code) = status_code {
                    write!(f, "Notification failed: {message} (status {status_code})")
                } else {
                    write!(f, "Notification failed: {message}")
                }
            }
            Error::Url { message, .. } => {
                write!(f, "URL error: {message}")
            }
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Connection { source, .. }
            | Error::HttpClient { source, .. }
            | Error::Streaming { source, .. }
            | Error::Serialization { source, .. }
            | Error::Encoding { source, .. }
            | Error::Input { source, .. }
            | Error::Export { source, .. } => source
                .as_ref()
                .map(|e| e.as_ref() as &(dyn error::Error + 'static)),
            Error::Io { source, .. } => Some(source.as_ref()),
            Error::Url { source, .. } => {
                source.as_ref().map(|e| e as &(dyn error::Error + 'static))
            }
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::io(err.to_string(), err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::serialization(format!("JSON error: {err}"), Some(Box::new(err)))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::serialization(format!("YAML error: {err}"), Some(Box::new(err)))
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::url(format!("URL parse error: {err}"), Some(err))
    }
}

impl From<Utf8Error> for Error {
    fn from(err: Utf8Error) -> Self {
        Error::encoding(format!("UTF-8 error: {err}"), Some(Box::new(err)))
    }
}

impl From<rustyline::error::ReadlineError> for Error {
    fn from(err: rustyline::error::ReadlineError) -> Self {
        Error::input(format!("{err}"), Some(Box::new(err)))
    }
}

/// A specialized Result type for genie operations.
pub type Result<T> = std::result::Result<T, Error>;
