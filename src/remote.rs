//! Client for the daemon's [RPC API][crate::api].

use crate::api::model::{CommandFailure, CommandRequest, CommandResult};
use crate::error::Error;
use crate::transcript::Transcript;
use hyper::header::CONTENT_TYPE;
use hyper::{Body, Client, Method, Request};
use std::net::SocketAddr;
use std::time::Duration;
use tracing::debug;

fn remote(err: impl ToString) -> Error {
    Error::Remote(err.to_string())
}

/// Run a command at the daemon listening on `addr`, appending its output to `out`.
///
/// # Errors
///
/// Returns [`Error::Remote`] with the daemon's message if the command failed there, or if the
/// daemon can't be reached within `timeout`.
pub async fn execute(
    addr: SocketAddr,
    args: &[String],
    timeout: Duration,
    out: &mut Transcript,
) -> Result<(), Error> {
    let body = serde_json::to_vec(&CommandRequest {
        args: args.to_vec(),
    })?;
    let request = Request::builder()
        .method(Method::POST)
        .uri(format!("http://{addr}/command"))
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .map_err(remote)?;

    debug!(%addr, ?args, "sending command");
    let response = tokio::time::timeout(timeout, Client::new().request(request))
        .await
        .map_err(|_| remote(format!("no response from {addr} within {timeout:?}")))?
        .map_err(remote)?;
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body())
        .await
        .map_err(remote)?;

    if status.is_success() {
        let result: CommandResult = serde_json::from_slice(&bytes)?;
        out.append(result.output);
        return Ok(());
    }
    match serde_json::from_slice::<CommandFailure>(&bytes) {
        Ok(failure) => {
            out.append(failure.output);
            Err(Error::Remote(failure.error))
        }
        Err(_) => Err(remote(format!("HTTP {status}"))),
    }
}
