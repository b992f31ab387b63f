use clinicmart_types::SourceError;
use reqwest::{Response, StatusCode};

/// Map a reqwest transport failure onto the source error categories.
pub(crate) fn transport_error(err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::timeout(err.to_string())
    } else if err.is_connect() {
        SourceError::connection(err.to_string())
    } else {
        SourceError::query(err.to_string())
    }
}

/// Fail on any status other than 200, keeping the response body as the message.
pub(crate) async fn ensure_ok(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(SourceError::http(status.as_u16(), body))
}
