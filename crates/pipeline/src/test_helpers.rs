//! Shared test helpers for pipeline tests.

use std::sync::Mutex;

use async_trait::async_trait;
use promptline_core::error::BackendError;
use promptline_core::provider::{FragmentStream, GenerationBackend, GenerationConfig};
use promptline_core::template::RenderedPrompt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// A finite fragment stream from literals.
pub fn fragments(parts: &[&str]) -> FragmentStream {
    let items: Vec<Result<String, BackendError>> =
        parts.iter().map(|p| Ok(p.to_string())).collect();
    Box::pin(futures::stream::iter(items))
}

/// A backend that replays a scripted fragment sequence and records every
/// prompt it was asked to generate for.
pub struct ScriptedBackend {
    fragments: Vec<String>,
    fail_after: Option<usize>,
    reject: Option<BackendError>,
    prompts: Mutex<Vec<String>>,
    configs: Mutex<Vec<GenerationConfig>>,
}

impl ScriptedBackend {
    pub fn new(fragments: &[&str]) -> Self {
        Self {
            fragments: fragments.iter().map(|f| f.to_string()).collect(),
            fail_after: None,
            reject: None,
            prompts: Mutex::new(Vec::new()),
            configs: Mutex::new(Vec::new()),
        }
    }

    /// Emit the first `n` fragments, then fail with a stream interruption.
    pub fn failing_after(mut self, n: usize) -> Self {
        self.fail_after = Some(n);
        self
    }

    /// Fail before producing any output.
    pub fn rejecting(error: BackendError) -> Self {
        let mut backend = Self::new(&[]);
        backend.reject = Some(error);
        backend
    }

    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }

    pub fn last_config(&self) -> Option<GenerationConfig> {
        self.configs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(
        &self,
        prompt: RenderedPrompt,
        config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError> {
        self.prompts.lock().unwrap().push(prompt.into_string());
        self.configs.lock().unwrap().push(config.clone());

        if let Some(err) = &self.reject {
            return Err(err.clone());
        }

        let mut items: Vec<Result<String, BackendError>> = match self.fail_after {
            Some(n) => self.fragments.iter().take(n).cloned().map(Ok).collect(),
            None => self.fragments.iter().cloned().map(Ok).collect(),
        };
        if self.fail_after.is_some() {
            items.push(Err(BackendError::StreamInterrupted("connection reset".into())));
        }
        Ok(Box::pin(futures::stream::iter(items)))
    }
}

/// A backend whose fragments are fed by the test through a channel, so a
/// test can observe output while generation is still in progress.
pub struct GatedBackend {
    receiver: Mutex<Option<mpsc::Receiver<Result<String, BackendError>>>>,
}

impl GatedBackend {
    pub fn new() -> (Self, mpsc::Sender<Result<String, BackendError>>) {
        let (tx, rx) = mpsc::channel(1);
        let backend = Self {
            receiver: Mutex::new(Some(rx)),
        };
        (backend, tx)
    }
}

#[async_trait]
impl GenerationBackend for GatedBackend {
    fn name(&self) -> &str {
        "gated"
    }

    async fn generate(
        &self,
        _prompt: RenderedPrompt,
        _config: &GenerationConfig,
    ) -> Result<FragmentStream, BackendError> {
        let rx = self
            .receiver
            .lock()
            .unwrap()
            .take()
            .expect("GatedBackend can only generate once");
        Ok(Box::pin(ReceiverStream::new(rx)))
    }
}
