use serde::{Deserialize, Serialize};

use super::OracleError;

/// Object-shaped reply: some backends put the answer in `content`, others in `text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructuredReply {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

/// Raw answer of the semantic oracle, before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum OracleResponse {
    PlainText(String),
    Structured(StructuredReply),
}

impl OracleResponse {
    /// Normalise to a single string: `content` wins over `text`, an empty
    /// object becomes the empty string.
    pub fn into_text(self) -> String {
        match self {
            Self::PlainText(text) => text,
            Self::Structured(reply) => reply.content.or(reply.text).unwrap_or_default(),
        }
    }
}

impl From<String> for OracleResponse {
    fn from(text: String) -> Self {
        Self::PlainText(text)
    }
}

impl From<&str> for OracleResponse {
    fn from(text: &str) -> Self {
        Self::PlainText(text.to_string())
    }
}

/// External semantic oracle (a language model behind a request/response contract).
///
/// Calls are blocking and issued one at a time; a failed call aborts the
/// current matching round and is never retried here.
pub trait SemanticOracle: Send + Sync {
    fn invoke(&self, prompt: &str, system: &str) -> Result<OracleResponse, OracleError>;

    /// Short identifier for logs and reports.
    fn name(&self) -> String {
        "oracle".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_normalises_to_itself() {
        assert_eq!(OracleResponse::from("abc").into_text(), "abc");
    }

    #[test]
    fn structured_prefers_content_over_text() {
        let reply = StructuredReply {
            content: Some("from content".into()),
            text: Some("from text".into()),
        };
        assert_eq!(OracleResponse::Structured(reply).into_text(), "from content");
    }

    #[test]
    fn structured_falls_back_to_text() {
        let reply = StructuredReply { content: None, text: Some("t".into()) };
        assert_eq!(OracleResponse::Structured(reply).into_text(), "t");
    }

    #[test]
    fn empty_structured_reply_is_empty_string() {
        let reply: StructuredReply = serde_json::from_str("{}").unwrap();
        assert_eq!(OracleResponse::Structured(reply).into_text(), "");
    }
}
