use crate::error::Error;
use crate::store::{State, StateStore};

/// A [`StateStore`] that keeps the document in memory only.
#[derive(Default, Debug, Clone)]
pub struct MemoryStateStore {
    state: State,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new(state: State) -> Self {
        MemoryStateStore { state }
    }
}

#[async_trait::async_trait]
impl StateStore for MemoryStateStore {
    fn state(&self) -> &State {
        &self.state
    }

    fn state_mut(&mut self) -> &mut State {
        &mut self.state
    }

    async fn save(&mut self) -> Result<(), Error> {
        Ok(())
    }
}
