use serde::{Deserialize, Serialize};

use crate::models::CampaignPayload;
use crate::reveal::Artifact;

/// Resumable playback progress for one conversation.
///
/// Indexes count revealed units of each artifact's text. While the payload
/// JSON is still being revealed, the explanation fields stay empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub json_index: usize,
    pub explanation_index: usize,
    pub streamed_json: String,
    pub streamed_explanation: String,
    pub stream_id: String,
    #[serde(default)]
    pub explanation_id: Option<String>,
    pub payload: CampaignPayload,
    pub user_input: String,
}

impl Checkpoint {
    pub fn start(payload: CampaignPayload, user_input: impl Into<String>, stream_id: String) -> Self {
        Self {
            json_index: 0,
            explanation_index: 0,
            streamed_json: String::new(),
            streamed_explanation: String::new(),
            stream_id,
            explanation_id: None,
            payload,
            user_input: user_input.into(),
        }
    }

    pub fn artifact(&self) -> Artifact {
        if self.explanation_id.is_some() {
            Artifact::Explanation
        } else {
            Artifact::PayloadJson
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assembler::compile_prompt;
    use crate::models::FacetSelection;

    #[test]
    fn record_uses_camel_case_keys() {
        let payload = compile_prompt("Flash sale 20% off", &FacetSelection::default());
        let checkpoint = Checkpoint::start(payload, "Flash sale 20% off", "stream-1".to_string());
        let raw = checkpoint.to_json().expect("serializes");

        assert!(raw.contains("\"jsonIndex\":0"));
        assert!(raw.contains("\"streamId\":\"stream-1\""));
        assert!(raw.contains("\"userInput\""));
        assert_eq!(Checkpoint::from_json(&raw).expect("parses"), checkpoint);
        assert_eq!(checkpoint.artifact(), Artifact::PayloadJson);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(Checkpoint::from_json("{not json").is_err());
        assert!(Checkpoint::from_json("{\"jsonIndex\": 3}").is_err());
    }
}
