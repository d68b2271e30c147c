//! HTTP RPC API of the daemon.
//!
//! The API is unauthenticated: it must only be bound to a loopback or private address (see
//! [`Config`][crate::config::Config]).
//!
//! # API Endpoints
//!
//! ## `/healthcheck` (GET)
//!
//!   Returns HTTP 200 (OK) and the JSON body `{"ok":"healthy"}` when the service is operational.
//!
//! ## `/command` (POST)
//!
//!   Runs a command as if given on the command line. Expects a JSON request body of the form:
//!
//!   ```json
//!   { "args": ["sync-dnskey", "example.com."] }
//!   ```
//!
//!   On success, returns HTTP 200 (OK) and the command's output:
//!
//!   ```json
//!   { "output": ["Syncing signer1 DNSKEYs", "..."] }
//!   ```
//!
//!   On failure, returns the error along with the output produced before it:
//!
//!   ```json
//!   { "error": "group example.com. does not exist", "output": [] }
//!   ```
//!
//!   with HTTP 400 (Bad Request) for invalid commands and arguments, 409 (Conflict) when a
//!   group or signer isn't in a state that allows the command, 502 (Bad Gateway) when a
//!   signer or the parent can't be queried or updated, and 500 otherwise.
//!
//! ## `/ws` (GET)
//!
//!   A websocket. On connect the status of every group is sent, followed by every status
//!   change and automation log line as they happen, one JSON object per message:
//!
//!   ```json
//!   { "fqdn": "example.com.", "stage": "join-wait-ds", "signers": [{ "name": "signer1", "leaving": false }] }
//!   { "fqdn": "example.com.", "left": "signer2" }
//!   { "log": "example.com.: join-wait-ds -> join-sync-nses" }
//!   ```

mod api_error;
pub mod model;
mod routes;
pub mod server;

pub use server::{new, router};
