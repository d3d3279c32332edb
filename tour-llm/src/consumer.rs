//! Turns a stream of [`StreamEvent`]s into displayed text.
//!
//! Text deltas are written to the sink as they arrive and accumulated in
//! order. Consumption ends at the first terminal event (the source is not
//! polled again) or when the source is exhausted.

use crate::error::Result;
use crate::events::StreamEvent;
use crate::types::Usage;
use futures_util::{Stream, StreamExt};
use std::io::Write;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Concatenation of every delta, in arrival order.
    pub text: String,
    /// True when consumption stopped on a terminal event rather than exhaustion.
    pub terminated: bool,
    pub status: Option<String>,
    pub usage: Option<Usage>,
    /// Number of events read from the source.
    pub events: usize,
}

enum Flow {
    Continue,
    Stop,
}

pub struct StreamConsumer<W> {
    sink: W,
    output: String,
    newline_on_text_done: bool,
}

impl<W: Write> StreamConsumer<W> {
    pub fn new(sink: W) -> Self {
        Self {
            sink,
            output: String::new(),
            newline_on_text_done: true,
        }
    }

    /// Whether a `TextDone` event writes a line break to the sink. Default: true.
    pub fn newline_on_text_done(mut self, enabled: bool) -> Self {
        self.newline_on_text_done = enabled;
        self
    }

    /// Text accumulated by the most recent consumption.
    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    pub fn into_sink(self) -> W {
        self.sink
    }

    #[tracing::instrument(level = "debug", skip_all)]
    pub async fn consume<S>(&mut self, stream: S) -> Result<StreamSummary>
    where
        S: Stream<Item = Result<StreamEvent>>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut summary = self.begin();
        while let Some(event) = stream.next().await {
            if let Flow::Stop = self.apply(event?, &mut summary)? {
                break;
            }
        }
        Ok(self.finish(summary))
    }

    /// Blocking counterpart of [`StreamConsumer::consume`].
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn consume_blocking<I>(&mut self, events: I) -> Result<StreamSummary>
    where
        I: IntoIterator<Item = Result<StreamEvent>>,
    {
        let mut summary = self.begin();
        for event in events {
            if let Flow::Stop = self.apply(event?, &mut summary)? {
                break;
            }
        }
        Ok(self.finish(summary))
    }

    fn begin(&mut self) -> StreamSummary {
        self.output.clear();
        StreamSummary::default()
    }

    fn apply(&mut self, event: StreamEvent, summary: &mut StreamSummary) -> Result<Flow> {
        summary.events += 1;
        match event {
            StreamEvent::TextDelta { delta } => {
                self.output.push_str(&delta);
                self.sink.write_all(delta.as_bytes())?;
                self.sink.flush()?;
            }
            StreamEvent::TextDone { .. } => {
                if self.newline_on_text_done {
                    self.sink.write_all(b"\n")?;
                    self.sink.flush()?;
                }
            }
            StreamEvent::ResponseDone { status, usage } => {
                summary.terminated = true;
                summary.status = status;
                summary.usage = usage;
                return Ok(Flow::Stop);
            }
            StreamEvent::ToolCallStart { name, .. } => {
                tracing::trace!(%name, "ignoring tool call start");
            }
            StreamEvent::ToolCallDelta { .. } => {}
            StreamEvent::Unknown { kind } => {
                tracing::trace!(%kind, "ignoring unknown stream event");
            }
        }
        Ok(Flow::Continue)
    }

    fn finish(&self, mut summary: StreamSummary) -> StreamSummary {
        summary.text = self.output.clone();
        tracing::debug!(
            events = summary.events,
            terminated = summary.terminated,
            chars = summary.text.len(),
            "stream consumed"
        );
        summary
    }
}
