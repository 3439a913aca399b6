//! Scripted completion service for unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use pipeline::{Completion, CompletionError, CompletionService, StepRequest};

/// Replays queued outcomes in order and records every request it receives.
///
/// Once the script runs out, further calls fail with a connection error so a
/// test that makes more calls than expected fails loudly.
pub(crate) struct ScriptedService {
    script: Mutex<VecDeque<Result<String, CompletionError>>>,
    requests: Mutex<Vec<StepRequest>>,
}

impl ScriptedService {
    pub(crate) fn new<'a>(
        outcomes: impl IntoIterator<Item = Result<&'a str, CompletionError>>,
    ) -> Self {
        Self {
            script: Mutex::new(
                outcomes
                    .into_iter()
                    .map(|outcome| outcome.map(str::to_string))
                    .collect(),
            ),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn replying(texts: &[&str]) -> Self {
        Self::new(texts.iter().map(|text| Ok(*text)))
    }

    pub(crate) fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub(crate) fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl CompletionService for ScriptedService {
    async fn complete(&self, request: &StepRequest) -> Result<Completion, CompletionError> {
        self.requests.lock().unwrap().push(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(CompletionError::connection("script exhausted")))
            .map(Completion::new)
    }
}

pub(crate) fn rate_limited() -> CompletionError {
    CompletionError::RateLimited {
        message: "too many requests".to_string(),
        retry_after: None,
    }
}
