use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ReasonRequest, Reasoner, ReasonerError};

/// Replays a fixed list of replies in order. Once the list is exhausted
/// the last reply is repeated. Used for offline runs and tests.
pub struct ScriptedReasoner {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
    requests: Mutex<Vec<ReasonRequest>>,
}

impl ScriptedReasoner {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Load replies from a JSON array; non-string items are re-serialized.
    pub fn from_json(raw: &str) -> Result<Self, ReasonerError> {
        let items: Vec<serde_json::Value> =
            serde_json::from_str(raw).map_err(|e| ReasonerError::Parse(e.to_string()))?;
        Ok(Self::new(items.into_iter().map(|v| match v {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        })))
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<ReasonRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn complete(&self, request: ReasonRequest) -> Result<String, ReasonerError> {
        if let Ok(mut seen) = self.requests.lock() {
            seen.push(request);
        }
        let next = self.replies.lock().ok().and_then(|mut q| q.pop_front());
        let mut last = self
            .last
            .lock()
            .map_err(|_| ReasonerError::Config("scripted reasoner poisoned".into()))?;
        match next {
            Some(reply) => {
                *last = Some(reply.clone());
                Ok(reply)
            }
            None => last
                .clone()
                .ok_or_else(|| ReasonerError::Config("script is empty".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_then_repeats_last() {
        let reasoner = ScriptedReasoner::from_json(r#"["one", {"final_answer": "two"}]"#).unwrap();
        assert_eq!(reasoner.complete(ReasonRequest::new("a")).await.unwrap(), "one");
        let second = reasoner.complete(ReasonRequest::new("b")).await.unwrap();
        assert!(second.contains("final_answer"));
        assert_eq!(reasoner.complete(ReasonRequest::new("c")).await.unwrap(), second);
        assert_eq!(reasoner.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_script_errors() {
        let reasoner = ScriptedReasoner::new(Vec::<String>::new());
        assert!(reasoner.complete(ReasonRequest::new("a")).await.is_err());
    }
}
