use std::sync::Arc;

use futures::TryStreamExt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::annotate::Annotator;
use crate::decoder::{RawLine, decode};
use crate::error::StreamError;
use crate::filter::FocusFilter;
use crate::source::LogSource;

/// What happens to the other sources when one fails
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Report the failed source and keep the rest streaming
    #[default]
    Isolate,
    /// Cancel every remaining source on the first failure
    AbortAll,
}

/// How a source's task ended
#[derive(Debug)]
pub enum SourceStatus {
    /// Stream reached end-of-data
    Completed,
    /// Stopped by cancellation or because output was closed
    Cancelled,
    /// Stream read failed
    Failed(StreamError),
}

/// Terminal result of one source's task
#[derive(Debug)]
pub struct SourceOutcome {
    pub name: String,

    /// Lines written for this source
    pub lines: u64,

    pub status: SourceStatus,
}

impl SourceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self.status, SourceStatus::Failed(_))
    }
}

/// Per-line processing shared by all source tasks
struct LineRenderer {
    annotator: Annotator,
    tag: String,
    focus: Option<FocusFilter>,
}

impl LineRenderer {
    /// Annotated line with terminator, or None when hidden by the focus filter
    fn render(&self, line: &RawLine) -> Option<String> {
        if let Some(focus) = &self.focus
            && !focus.matches(&line.text)
        {
            return None;
        }
        let mut text = self.annotator.annotate(&line.text, &self.tag);
        text.push('\n');
        Some(text)
    }
}

/// Streams many log sources concurrently onto one writer
pub struct FanIn {
    annotator: Annotator,

    /// Highlight tag; empty disables highlighting
    tag: String,

    focus: Option<FocusFilter>,

    policy: FailurePolicy,

    /// Cancellation token for stopping streams
    cancel: CancellationToken,
}

impl FanIn {
    /// Create a fan-in that annotates with `annotator`; an empty tag disables highlighting
    pub fn new(annotator: Annotator, tag: impl Into<String>) -> Self {
        Self {
            annotator,
            tag: tag.into(),
            focus: None,
            policy: FailurePolicy::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Only show lines matching the focus filter
    pub fn with_focus(mut self, focus: Option<FocusFilter>) -> Self {
        self.focus = focus;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Token that stops every source when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stream all sources to `out` until each one ends or the token is cancelled.
    ///
    /// Per-source failures are reported in the returned outcomes; only output
    /// failures and panicked tasks make the whole run fail.
    pub async fn run<W>(
        &self,
        sources: Vec<LogSource>,
        out: W,
    ) -> Result<(W, Vec<SourceOutcome>), StreamError>
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let renderer = Arc::new(LineRenderer {
            annotator: self.annotator,
            tag: self.tag.clone(),
            focus: self.focus.clone(),
        });

        let (line_tx, line_rx) = mpsc::unbounded_channel::<String>();
        let writer_cancel = self.cancel.clone();
        let writer = tokio::spawn(async move {
            let written = write_lines(line_rx, out).await;
            // A dead sink ends the run, even for sources that are idle
            if written.is_err() {
                writer_cancel.cancel();
            }
            written
        });

        let mut tasks = JoinSet::new();
        for source in sources {
            tasks.spawn(pump_source(
                source,
                Arc::clone(&renderer),
                line_tx.clone(),
                self.cancel.clone(),
            ));
        }
        // The writer stops once every task has dropped its sender
        drop(line_tx);

        let mut outcomes = Vec::with_capacity(tasks.len());
        while let Some(joined) = tasks.join_next().await {
            let outcome = joined?;
            if let SourceStatus::Failed(err) = &outcome.status {
                warn!(source = %outcome.name, error = %err, "log source failed");
                if self.policy == FailurePolicy::AbortAll {
                    self.cancel.cancel();
                }
            }
            outcomes.push(outcome);
        }

        let out = writer.await??;
        Ok((out, outcomes))
    }
}

async fn pump_source(
    source: LogSource,
    renderer: Arc<LineRenderer>,
    line_tx: mpsc::UnboundedSender<String>,
    cancel: CancellationToken,
) -> SourceOutcome {
    let name = source.name().to_string();
    debug!(source = %name, framing = ?source.framing(), "starting log stream");

    let lines = decode(source);
    tokio::pin!(lines);

    let mut count = 0u64;
    let status = loop {
        tokio::select! {
            _ = cancel.cancelled() => break SourceStatus::Cancelled,

            result = lines.try_next() => {
                match result {
                    Ok(Some(line)) => {
                        if let Some(text) = renderer.render(&line) {
                            if line_tx.send(text).is_err() {
                                // Writer is gone, nothing left to stream to
                                break SourceStatus::Cancelled;
                            }
                            count += 1;
                        }
                    }
                    Ok(None) => break SourceStatus::Completed,
                    Err(err) => break SourceStatus::Failed(err),
                }
            }
        }
    };

    debug!(source = %name, lines = count, status = ?status, "log stream ended");
    SourceOutcome {
        name,
        lines: count,
        status,
    }
}

/// Single writer: one `write_all` per line keeps lines from different sources intact
async fn write_lines<W>(
    mut line_rx: mpsc::UnboundedReceiver<String>,
    mut out: W,
) -> Result<W, StreamError>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = line_rx.recv().await {
        out.write_all(line.as_bytes())
            .await
            .map_err(StreamError::Write)?;
        if line_rx.is_empty() {
            out.flush().await.map_err(StreamError::Write)?;
        }
    }
    out.flush().await.map_err(StreamError::Write)?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::{LabelKind, ansi, annotate};
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncRead, ReadBuf};

    fn frame(payload: &str) -> Vec<u8> {
        let mut bytes = vec![1, 0, 0, 0];
        bytes.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        bytes.extend_from_slice(payload.as_bytes());
        bytes
    }

    fn output_lines(out: &[u8]) -> Vec<String> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(String::from)
            .collect()
    }

    struct BrokenReader;

    impl AsyncRead for BrokenReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")))
        }
    }

    #[tokio::test]
    async fn test_all_sources_are_drained() {
        let mut sources = Vec::new();
        for pod in 0..3 {
            let text: String = (0..5)
                .map(|i| format!("pod{} [INFO] line {}\n", pod, i))
                .collect();
            sources.push(LogSource::lines(format!("pod-{}", pod), io::Cursor::new(text)));
        }

        let fan_in = FanIn::new(Annotator::default(), "");
        let (out, outcomes) = fan_in.run(sources, Vec::new()).await.unwrap();
        let lines = output_lines(&out);

        assert_eq!(lines.len(), 15);
        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| matches!(o.status, SourceStatus::Completed)));
        assert!(outcomes.iter().all(|o| o.lines == 5));

        // Order is preserved within each source
        for pod in 0..3 {
            let expected: Vec<String> = (0..5)
                .map(|i| annotate(&format!("pod{} [INFO] line {}", pod, i), ""))
                .collect();
            let prefix = format!("pod{} ", pod);
            let actual: Vec<String> = lines
                .iter()
                .filter(|l| l.starts_with(&prefix))
                .cloned()
                .collect();
            assert_eq!(actual, expected);
        }
    }

    #[tokio::test]
    async fn test_framed_and_line_sources_mix() {
        let mut framed = frame("2024-01-15T10:30:00Z [ERROR] boom\n");
        framed.extend(frame("malformed"));

        let sources = vec![
            LogSource::multiplexed("container", io::Cursor::new(framed)),
            LogSource::lines("pod", io::Cursor::new(b"plain line\n".to_vec())),
        ];

        let fan_in = FanIn::new(Annotator::default(), "");
        let (out, outcomes) = fan_in.run(sources, Vec::new()).await.unwrap();
        let lines = output_lines(&out);

        assert_eq!(lines.len(), 2);
        assert!(lines.contains(&"plain line".to_string()));
        let (fg, _) = LabelKind::Error.colors();
        assert!(lines.iter().any(|l| l.starts_with(fg) && l.ends_with(" boom")));
        assert_eq!(outcomes.iter().map(|o| o.lines).sum::<u64>(), 2);
    }

    #[tokio::test]
    async fn test_failed_source_is_isolated() {
        let sources = vec![
            LogSource::lines("bad", BrokenReader),
            LogSource::lines("good", io::Cursor::new(b"a\nb\nc\n".to_vec())),
        ];

        let fan_in = FanIn::new(Annotator::default(), "");
        let (out, outcomes) = fan_in.run(sources, Vec::new()).await.unwrap();

        assert_eq!(output_lines(&out), ["a", "b", "c"]);
        let bad = outcomes.iter().find(|o| o.name == "bad").unwrap();
        assert!(bad.is_failed());
        let good = outcomes.iter().find(|o| o.name == "good").unwrap();
        assert!(matches!(good.status, SourceStatus::Completed));
    }

    #[tokio::test]
    async fn test_abort_all_cancels_remaining_sources() {
        // The duplex peer is kept alive, so this source would stream forever
        let (_peer, open) = tokio::io::duplex(64);
        let sources = vec![
            LogSource::lines("bad", BrokenReader),
            LogSource::lines("following", open),
        ];

        let fan_in = FanIn::new(Annotator::default(), "").with_policy(FailurePolicy::AbortAll);
        let (_, outcomes) = tokio::time::timeout(
            Duration::from_secs(5),
            fan_in.run(sources, Vec::new()),
        )
        .await
        .expect("abort policy should stop the following source")
        .unwrap();

        let following = outcomes.iter().find(|o| o.name == "following").unwrap();
        assert!(matches!(following.status, SourceStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_stops_follow_mode() {
        let (_peer, open) = tokio::io::duplex(64);
        let fan_in = FanIn::new(Annotator::default(), "");
        let cancel = fan_in.cancel_token();

        let run = tokio::spawn(async move {
            fan_in
                .run(vec![LogSource::lines("following", open)], Vec::new())
                .await
        });
        cancel.cancel();

        let (_, outcomes) = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("cancellation should end the run")
            .unwrap()
            .unwrap();
        assert!(matches!(outcomes[0].status, SourceStatus::Cancelled));
    }

    #[tokio::test]
    async fn test_focus_and_tag() {
        let text = "12:00 [app] order-1 created\n12:01 [app] order-2 created\n";
        let fan_in = FanIn::new(Annotator::default(), "order-2")
            .with_focus(FocusFilter::new("ORDER-2").unwrap());

        let (out, outcomes) = fan_in
            .run(vec![LogSource::lines("pod", io::Cursor::new(text))], Vec::new())
            .await
            .unwrap();

        let lines = output_lines(&out);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(&format!("12:01{}", ansi::WHITE)));
        assert_eq!(outcomes[0].lines, 1);
    }

    struct ClosedSink;

    impl AsyncWrite for ClosedSink {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_closed_output_stops_idle_sources() {
        let (mut peer, open) = tokio::io::duplex(64);
        peer.write_all(b"first line\n").await.unwrap();

        let fan_in = FanIn::new(Annotator::default(), "");
        let result = tokio::time::timeout(
            Duration::from_secs(5),
            fan_in.run(vec![LogSource::lines("following", open)], ClosedSink),
        )
        .await
        .expect("a failed sink should end the run");

        assert!(matches!(result, Err(StreamError::Write(_))));
        drop(peer);
    }

    #[tokio::test]
    async fn test_no_sources() {
        let fan_in = FanIn::new(Annotator::default(), "");
        let (out, outcomes) = fan_in.run(Vec::new(), Vec::new()).await.unwrap();
        assert!(out.is_empty());
        assert!(outcomes.is_empty());
    }
}
