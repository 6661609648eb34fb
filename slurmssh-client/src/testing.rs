//! Scripted transport for unit tests

use async_trait::async_trait;
use slurmssh_core::{ClusterTarget, SyncSpec};
use std::sync::{Arc, Mutex};

use crate::error::{ClientError, Result};
use crate::transport::{ChunkSink, CommandOutput, Transport};

/// A call observed by [`FakeTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Call {
    Remote(String),
    Sync(SyncSpec),
}

type Handler = Box<dyn FnMut(&Call) -> Result<CommandOutput> + Send>;

/// Records every call and answers it with a test-provided handler
///
/// Streaming calls deliver the handler's stdout to the sink in one chunk.
pub(crate) struct FakeTransport {
    calls: Mutex<Vec<Call>>,
    handler: Mutex<Handler>,
}

impl FakeTransport {
    pub(crate) fn new(
        handler: impl FnMut(&Call) -> Result<CommandOutput> + Send + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            handler: Mutex::new(Box::new(handler)),
        })
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub(crate) fn remote_commands(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Remote(command) => Some(command),
                Call::Sync(_) => None,
            })
            .collect()
    }

    pub(crate) fn sync_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, Call::Sync(_)))
            .count()
    }

    fn answer(&self, call: Call) -> Result<CommandOutput> {
        self.calls.lock().unwrap().push(call.clone());
        let mut handler = self.handler.lock().unwrap();
        (*handler)(&call)
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn run_remote(&self, _target: &ClusterTarget, command: &str) -> Result<CommandOutput> {
        self.answer(Call::Remote(command.to_string()))
    }

    async fn run_remote_streaming(
        &self,
        _target: &ClusterTarget,
        command: &str,
        sink: &mut dyn ChunkSink,
    ) -> Result<u64> {
        let output = self.answer(Call::Remote(command.to_string()))?;
        if output.stdout.is_empty() {
            return Ok(0);
        }

        let _ = sink.write_chunk(output.stdout.as_bytes()).await;
        Ok(output.stdout.len() as u64)
    }

    async fn sync(&self, _target: &ClusterTarget, spec: &SyncSpec) -> Result<CommandOutput> {
        self.answer(Call::Sync(spec.clone()))
    }
}

/// Successful command with the given stdout
pub(crate) fn ok(stdout: &str) -> Result<CommandOutput> {
    Ok(CommandOutput {
        exit_code: 0,
        stdout: stdout.to_string(),
        stderr: String::new(),
    })
}

/// Failed command with the given exit code and stderr
pub(crate) fn fail(exit_code: i32, stderr: &str) -> Result<CommandOutput> {
    Err(ClientError::transport("fake", Some(exit_code), stderr))
}

pub(crate) fn target() -> ClusterTarget {
    "alice@login.example.org".parse().unwrap()
}
