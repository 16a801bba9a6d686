//! Oracle test doubles. Public so hosts can dry-run the pipeline without a model.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::types::{OracleResponse, SemanticOracle};
use super::OracleError;

/// Always answers with the same response.
pub struct MockOracle {
    response: OracleResponse,
    calls: AtomicUsize,
}

impl MockOracle {
    pub fn new(response: impl Into<OracleResponse>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SemanticOracle for MockOracle {
    fn invoke(&self, _prompt: &str, _system: &str) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    fn name(&self) -> String {
        "mock".to_string()
    }
}

/// Replays a queue of answers (or failures) in order, recording every prompt.
///
/// Once the queue is empty the last entry is repeated.
pub struct ScriptedOracle {
    script: Mutex<VecDeque<Result<OracleResponse, OracleError>>>,
    last: Mutex<Option<Result<OracleResponse, OracleError>>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedOracle {
    pub fn new(script: Vec<Result<OracleResponse, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Script made only of successful text answers.
    pub fn replies(replies: &[&str]) -> Self {
        Self::new(replies.iter().map(|r| Ok(OracleResponse::from(*r))).collect())
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl SemanticOracle for ScriptedOracle {
    fn invoke(&self, prompt: &str, _system: &str) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }

        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| OracleError::HttpClient("scripted oracle poisoned".into()))?;
        match next {
            Some(entry) => {
                *last = Some(entry.clone());
                entry
            }
            None => last.clone().unwrap_or(Err(OracleError::NotConfigured)),
        }
    }

    fn name(&self) -> String {
        "scripted".to_string()
    }
}
