use crate::transcript::Transcript;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandRequest {
    pub args: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandResult {
    pub output: Transcript,
}

/// The body of an error response.
#[derive(Serialize, Deserialize, Debug, Clone, Default, Eq, PartialEq)]
pub struct CommandFailure {
    pub error: String,
    #[serde(default)]
    pub output: Transcript,
}
