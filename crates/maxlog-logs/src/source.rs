use std::fmt;

use tokio::io::AsyncRead;

use maxlog_types::Framing;

/// Type-erased byte stream handed over by a backend
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// One log-producing entity: a name, its wire shape, and the stream itself
pub struct LogSource {
    name: String,
    framing: Framing,
    reader: BoxedReader,
}

impl LogSource {
    pub fn new<R>(name: impl Into<String>, framing: Framing, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            name: name.into(),
            framing,
            reader: Box::new(reader),
        }
    }

    /// Source using the local runtime's 8-byte header framing
    pub fn multiplexed<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::new(name, Framing::Multiplexed, reader)
    }

    /// Source producing newline-delimited text
    pub fn lines<R>(name: impl Into<String>, reader: R) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self::new(name, Framing::Lines, reader)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn into_parts(self) -> (String, Framing, BoxedReader) {
        (self.name, self.framing, self.reader)
    }
}

impl fmt::Debug for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSource")
            .field("name", &self.name)
            .field("framing", &self.framing)
            .finish()
    }
}
