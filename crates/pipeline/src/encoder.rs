//! Response encoding: backend fragments in, transport frames out.
//!
//! The encoder is a pull-driven adapter. Each poll pulls at most one fragment
//! from the backend, so a slow consumer slows generation down and a consumer
//! that goes away stops pulling. Nothing is buffered beyond the fragment in
//! hand.
//!
//! Two framings are supported:
//!
//! - `data_stream`: one line per fragment, `0:<json string>\n`. This is the
//!   line protocol streaming chat clients consume directly.
//! - `text`: fragments are written raw, so the body is exactly the
//!   concatenated completion.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::{Stream, StreamExt};
use promptline_core::provider::FragmentStream;
use promptline_core::variant::PipelineKind;
use tracing::{debug, info, warn};

use crate::error::PipelineError;
use crate::orchestrator::PipelineState;

/// Content type of every streamed response body.
pub const CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// Header that tells data-stream clients how to parse the body.
pub const DATA_STREAM_HEADER: &str = "x-experimental-stream-data";

/// Prefix of a text-part line in the data-stream protocol.
const TEXT_PART_PREFIX: &str = "0:";

/// How fragments are framed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    #[default]
    DataStream,
    Text,
}

impl Framing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DataStream => "data_stream",
            Self::Text => "text",
        }
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    /// Extra response headers this framing needs.
    pub fn headers(&self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::DataStream => &[(DATA_STREAM_HEADER, "true")],
            Self::Text => &[],
        }
    }

    /// Frame a single fragment.
    pub fn frame(&self, fragment: &str) -> Bytes {
        match self {
            Self::DataStream => {
                let quoted = serde_json::Value::String(fragment.to_string()).to_string();
                let mut line = String::with_capacity(TEXT_PART_PREFIX.len() + quoted.len() + 1);
                line.push_str(TEXT_PART_PREFIX);
                line.push_str(&quoted);
                line.push('\n');
                Bytes::from(line)
            }
            Self::Text => Bytes::copy_from_slice(fragment.as_bytes()),
        }
    }

    /// Recover the completion text from a framed body.
    ///
    /// For `data_stream`, lines that are not text parts are ignored.
    pub fn decode(&self, body: &[u8]) -> Result<String, serde_json::Error> {
        let body = String::from_utf8_lossy(body);
        match self {
            Self::Text => Ok(body.into_owned()),
            Self::DataStream => {
                let mut text = String::new();
                for line in body.lines() {
                    if let Some(quoted) = line.strip_prefix(TEXT_PART_PREFIX) {
                        text.push_str(&serde_json::from_str::<String>(quoted)?);
                    }
                }
                Ok(text)
            }
        }
    }
}

impl std::fmt::Display for Framing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Framing {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data_stream" => Ok(Self::DataStream),
            "text" => Ok(Self::Text),
            other => Err(format!(
                "Unknown framing '{other}'. Use 'data_stream' or 'text'."
            )),
        }
    }
}

/// A stream of framed response chunks.
///
/// Yields one frame per non-empty fragment in backend order. A backend
/// failure mid-stream is yielded once as an `Err`, after which the stream
/// ends; the transport is expected to abort the response at that point.
pub struct ResponseEncoder {
    fragments: FragmentStream,
    framing: Framing,
    pipeline: Option<PipelineKind>,
    state: PipelineState,
    frames: usize,
    bytes: usize,
}

impl ResponseEncoder {
    pub fn new(fragments: FragmentStream, framing: Framing) -> Self {
        Self {
            fragments,
            framing,
            pipeline: None,
            state: PipelineState::Streaming,
            frames: 0,
            bytes: 0,
        }
    }

    /// Tag log lines with the pipeline that produced this stream.
    pub fn for_pipeline(mut self, kind: PipelineKind) -> Self {
        self.pipeline = Some(kind);
        self
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frames emitted so far.
    pub fn frames_emitted(&self) -> usize {
        self.frames
    }

    fn pipeline_name(&self) -> &'static str {
        self.pipeline.map(|k| k.as_str()).unwrap_or("unknown")
    }
}

impl Stream for ResponseEncoder {
    type Item = Result<Bytes, PipelineError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        if this.state.is_terminal() {
            return Poll::Ready(None);
        }

        loop {
            match this.fragments.poll_next_unpin(cx) {
                Poll::Pending => return Poll::Pending,
                Poll::Ready(Some(Ok(fragment))) => {
                    if fragment.is_empty() {
                        continue;
                    }
                    let frame = this.framing.frame(&fragment);
                    this.frames += 1;
                    this.bytes += frame.len();
                    if this.frames == 1 {
                        debug!(pipeline = this.pipeline_name(), "First fragment received");
                    }
                    return Poll::Ready(Some(Ok(frame)));
                }
                Poll::Ready(Some(Err(e))) => {
                    this.state = PipelineState::Failed;
                    warn!(
                        pipeline = this.pipeline_name(),
                        frames = this.frames,
                        error = %e,
                        "Generation failed mid-stream"
                    );
                    return Poll::Ready(Some(Err(PipelineError::Backend(e))));
                }
                Poll::Ready(None) => {
                    this.state = PipelineState::Completed;
                    info!(
                        pipeline = this.pipeline_name(),
                        frames = this.frames,
                        bytes = this.bytes,
                        "Response stream completed"
                    );
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl Drop for ResponseEncoder {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            debug!(
                pipeline = self.pipeline_name(),
                frames = self.frames,
                "Response stream dropped before completion"
            );
        }
    }
}
