use std::io;

/// Failure of a single log source or of the shared output sink
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("failed to read log stream: {0}")]
    Read(#[from] io::Error),

    #[error("frame of {len} bytes exceeds the {max} byte limit")]
    FrameTooLarge { len: usize, max: usize },

    #[error("failed to write log output: {0}")]
    Write(#[source] io::Error),

    #[error("log task stopped unexpectedly: {0}")]
    Join(#[from] tokio::task::JoinError),
}
