use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use sdsynth_llm::{CompletionRequest, LlmBackend};
use sdsynth_shared::{Result, SynthError};

/// Backend that replays canned responses in order and records every request.
#[derive(Default)]
pub(crate) struct ScriptedBackend {
    script: Mutex<VecDeque<std::result::Result<String, String>>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedBackend {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn reply(self, text: &str) -> Self {
        self.script.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub(crate) fn fail(self, message: &str) -> Self {
        self.script.lock().unwrap().push_back(Err(message.to_string()));
        self
    }

    pub(crate) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn complete(&self, request: CompletionRequest) -> Result<String> {
        self.requests.lock().unwrap().push(request);
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(SynthError::Backend(message)),
            None => Err(SynthError::Backend("script exhausted".into())),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
