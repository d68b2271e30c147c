use crate::api::model::CommandFailure;
use crate::error::{Error, ErrorKind};
use crate::transcript::Transcript;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

pub(crate) struct APIError {
    err: anyhow::Error,
    output: Transcript,
}

impl APIError {
    /// An error that carries the output the command produced before failing.
    pub(super) fn with_output(err: Error, output: Transcript) -> Self {
        APIError {
            err: err.into(),
            output,
        }
    }
}

fn error_status(err: &Error) -> StatusCode {
    match err {
        Error::WrongStage(..)
        | Error::AutomationRunning(_)
        | Error::AutomationNotRunning(_)
        | Error::GroupExists(_)
        | Error::GroupHasSigners(_)
        | Error::SignerExists(_)
        | Error::SignerNotLeaving(_) => StatusCode::CONFLICT,
        err => match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Transport => StatusCode::BAD_GATEWAY,
            ErrorKind::Configuration | ErrorKind::Protocol | ErrorKind::Storage => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        },
    }
}

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let any_err = self.err;
        let status = if let Some(err) = any_err.downcast_ref::<Error>() {
            error_status(err)
        } else if let Some(err) = any_err.downcast_ref::<JsonRejection>() {
            match err {
                JsonRejection::JsonDataError(_) => StatusCode::UNPROCESSABLE_ENTITY,
                JsonRejection::JsonSyntaxError(_) => StatusCode::BAD_REQUEST,
                JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            }
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        let body = Json(CommandFailure {
            error: format!("{any_err}"),
            output: self.output,
        });
        (status, body).into_response()
    }
}

impl<E> From<E> for APIError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            err: err.into(),
            output: Transcript::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automate::Stage;
    use crate::records::parse_fqdn;

    #[test]
    fn status_codes() {
        let zone = parse_fqdn("example.com.").unwrap();
        assert_eq!(
            error_status(&Error::WrongStage(zone.clone(), Stage::JoinWaitDs, "ready")),
            StatusCode::CONFLICT
        );
        assert_eq!(error_status(&Error::NoSuchGroup(zone)), StatusCode::BAD_REQUEST);
        assert_eq!(
            error_status(&Error::transport("192.0.2.1:53", "refused")),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            error_status(&Error::SignersMisconfigured(1)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
