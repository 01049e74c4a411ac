use thiserror::Error;

use crate::state::ThreadState;

#[derive(Debug, Error)]
pub enum ThreadError {
    #[error("thread '{name}' is already running (state {state})")]
    AlreadyRunning { name: String, state: ThreadState },

    #[error("start of thread '{name}' was vetoed")]
    StartVetoed { name: String },

    #[error("failed to spawn thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
