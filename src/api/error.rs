use rocket::http::{ContentType, Status};
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use std::io::Cursor;

#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Credentials were rejected, or the token stayed rejected after a fresh login.
    #[error("authentication failed: {0}")]
    Authentication(String),
    /// The API refused the access token (HTTP 401/403).
    #[error("access token rejected (HTTP {0})")]
    TokenRejected(u16),
    #[error("network error: {0}")]
    Network(String),
    #[error("rate limit exceeded: {0}")]
    RateExceeded(String),
    #[error("server error (HTTP {0}): {1}")]
    Server(u16, String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("invalid response ({1}): {0}")]
    InvalidResponse(String, String),
    /// Retryable failure that did not clear within the retry budget.
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<Error> },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("internal error: {0}")]
    InternalError(String),
}

impl Error {
    /// Failures worth another attempt: network trouble, throttling and 5xx.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::RateExceeded(_) | Error::Server(_, _)
        )
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Authentication(_))
    }

    /// Auth failure either directly or as the cause of an exhausted retry.
    pub fn requires_reauthentication(&self) -> bool {
        match self {
            Error::Authentication(_) => true,
            Error::RetriesExhausted { last, .. } => last.requires_reauthentication(),
            _ => false,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Error::Configuration(e.to_string())
    }
}

fn html(status: Status, title: &str, detail: String) -> response::Result<'static> {
    let body = format!(
        "<html><body><h3>{}</h3><code>{}</code></body></html>",
        title, detail
    );
    Response::build()
        .status(status)
        .sized_body(body.len(), Cursor::new(body))
        .header(ContentType::new("text", "html"))
        .ok()
}

impl<'r> Responder<'r, 'static> for Error {
    fn respond_to(self, _: &'r Request<'_>) -> response::Result<'static> {
        match self {
            Error::Authentication(s) => html(
                Status::Forbidden,
                "403 Reauthentication required",
                s,
            ),
            Error::RateExceeded(s) => html(Status::TooManyRequests, "429 Too Many Requests", s),
            e @ Error::RetriesExhausted { .. } => html(
                Status::ServiceUnavailable,
                "503 Upstream API unavailable",
                e.to_string(),
            ),
            other => html(
                Status::InternalServerError,
                "Unknown exception",
                format!("{:?}", other),
            ),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn classification() {
        assert!(Error::Network("timeout".into()).is_transient());
        assert!(Error::Server(503, "busy".into()).is_transient());
        assert!(Error::RateExceeded("slow down".into()).is_transient());
        assert!(!Error::ApiError("bad request".into()).is_transient());
        assert!(!Error::TokenRejected(401).is_transient());
        assert!(!Error::Authentication("nope".into()).is_transient());

        let exhausted = Error::RetriesExhausted {
            attempts: 3,
            last: Box::new(Error::Network("reset".into())),
        };
        assert!(!exhausted.is_transient());
        assert!(!exhausted.requires_reauthentication());
        assert!(Error::Authentication("nope".into()).requires_reauthentication());
    }
}
