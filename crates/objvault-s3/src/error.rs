//! S3 error responses.
//!
//! Every failure funnels into [`S3Error`], which renders the S3 XML error
//! body with the matching code and status. Internal causes are logged and
//! replaced with a fixed message; responses never echo paths or stack
//! detail.

use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use objvault_common::Error;
use tracing::error;

/// Result type for handlers
pub type S3Result<T> = std::result::Result<T, S3Error>;

/// An S3-mapped error
#[derive(Debug)]
pub struct S3Error(pub Error);

impl S3Error {
    /// Shorthand for `AccessDenied`
    #[must_use]
    pub fn access_denied() -> Self {
        Self(Error::AccessDenied)
    }

    #[must_use]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self(Error::InvalidArgument(msg.into()))
    }

    #[must_use]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self(Error::Internal(msg.into()))
    }

    /// Render an error body directly from a code/message/status triple.
    #[must_use]
    pub fn xml_response(code: &str, message: &str, status: StatusCode) -> Response {
        let body = format!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<Error><Code>{code}</Code><Message>{}</Message></Error>",
            xml_escape(message)
        );
        (
            status,
            [(header::CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response()
    }
}

impl<E: Into<Error>> From<E> for S3Error {
    fn from(e: E) -> Self {
        Self(e.into())
    }
}

impl IntoResponse for S3Error {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let code = self.0.s3_error_code();

        // 304 has no body by definition.
        if status == StatusCode::NOT_MODIFIED {
            return status.into_response();
        }

        let message = if status.is_server_error() {
            error!(error = %self.0, "request failed");
            "We encountered an internal error. Please try again.".to_string()
        } else {
            self.0.to_string()
        };

        let mut response = Self::xml_response(code, &message, status);
        if let Error::NotLeader {
            leader_hint: Some(leader),
        } = &self.0
        {
            if let Ok(value) = leader.parse() {
                response.headers_mut().insert("x-amz-leader", value);
            }
        }
        response
    }
}

/// Escape text content for XML bodies.
#[must_use]
pub fn xml_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let resp = S3Error(Error::BucketNotFound("b".into())).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let resp = S3Error(Error::InvalidRange).into_response();
        assert_eq!(resp.status(), StatusCode::RANGE_NOT_SATISFIABLE);
    }

    #[test]
    fn test_leader_hint_header() {
        let resp = S3Error(Error::NotLeader {
            leader_hint: Some("10.0.0.5:9000".into()),
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(resp.headers()["x-amz-leader"], "10.0.0.5:9000");
    }

    #[test]
    fn test_xml_escape() {
        assert_eq!(xml_escape("a<b>&'\""), "a&lt;b&gt;&amp;&apos;&quot;");
    }
}
