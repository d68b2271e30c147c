//! A JSON file-backed implementation of the [`StateStore`][super::StateStore] trait.
//!
//! The document is read once when the store is opened. [`save`][FileStateStore::save]
//! rewrites the file whenever the document differs from what was last loaded or written.
use crate::error::Error;
use crate::store::{State, StateStore};
use std::io::ErrorKind;
use tokio::fs::File;
use tokio::io;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

/// A file-backed [`StateStore`]. Wraps a [`State`], keeping a copy of the persisted version
/// to detect changes.
#[derive(Default, Debug, Clone)]
#[allow(clippy::module_name_repetitions)]
pub struct FileStateStore {
    state: State,
    persisted: State,
    path: String,
}

impl FileStateStore {
    /// Load a [`FileStateStore`] from the JSON state located at the given path, creating an
    /// empty state file if there is none, or return an Error.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] if the JSON state file is invalid, including a group in a
    /// stage that doesn't exist.
    ///
    /// Returns [`Error::IO`] if the path can't be opened, read or created.
    pub async fn try_from_file(p: &str) -> Result<Self, Error> {
        let contents = match File::open(p).await {
            Ok(mut f) => {
                let mut buf = vec![];
                f.read_to_end(&mut buf).await?;
                buf
            }
            Err(err) => match err.kind() {
                ErrorKind::NotFound => Self::write_empty_state(File::create(&p).await?).await?,
                _ => return Err(Error::IO(err)),
            },
        };

        let state: State = serde_json::from_slice(&contents)?;
        debug!(path = p, groups = state.groups.len(), "loaded state");
        Ok(Self {
            path: p.to_string(),
            persisted: state.clone(),
            state,
        })
    }

    async fn write_empty_state(mut f: File) -> io::Result<Vec<u8>> {
        let default_data = serde_json::to_string_pretty(&State::default())?;
        let default_bytes = default_data.as_bytes();
        f.write_all(default_bytes).await?;
        f.flush().await?;
        Ok(default_bytes.to_vec())
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }
}

#[async_trait::async_trait]
impl StateStore for FileStateStore {
    fn state(&self) -> &State {
        &self.state
    }

    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    /// Save the state as JSON to the store's configured path if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidJSON`] if the state can't be serialized to JSON.
    ///
    /// Returns [`Error::IO`] if the serialized state can't be written to the backing file path.
    async fn save(&mut self) -> Result<(), Error> {
        if self.state == self.persisted {
            return Ok(());
        }
        let data = serde_json::to_string_pretty(&self.state)?;
        let mut output_file = File::create(&self.path).await?;
        output_file.write_all(data.as_bytes()).await?;
        output_file.flush().await?;
        self.persisted = self.state.clone();
        debug!(path = %self.path, "saved state");
        Ok(())
    }
}
