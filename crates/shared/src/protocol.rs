use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{ImageFile, SwapRequest, SOURCE_UPLOAD_NAME, TARGET_UPLOAD_NAME};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum ProgressEvent {
    Estimation {
        queue_size: Option<u32>,
        rank: Option<u32>,
        rank_eta: Option<f64>,
    },
    ProcessStarts {
        eta: Option<f64>,
    },
    ProcessCompleted {
        success: bool,
        #[serde(default)]
        output: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ProgressEvent {
    pub fn output_error(&self) -> Option<String> {
        match self {
            Self::ProcessCompleted { output, .. } => error_text(output.get("error")?),
            _ => None,
        }
    }
}

pub fn error_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(message) => Some(message.clone()),
        Value::Object(map) => match map.get("message") {
            Some(Value::String(message)) => Some(message.clone()),
            _ => Some(value.to_string()),
        },
        other => Some(other.to_string()),
    }
}

/// The final payload handed over by a transport. `None` stands for an absent response.
#[derive(Debug, Clone, PartialEq)]
pub enum RawResponse {
    Json(Value),
    Binary {
        bytes: Vec<u8>,
        mime_type: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePayload {
    pub data: String,
    pub name: String,
}

impl ImagePayload {
    pub fn from_file(file: &ImageFile, name: &str) -> Self {
        Self {
            data: file.to_data_url(),
            name: name.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferencePayload {
    pub target: ImagePayload,
    pub source: ImagePayload,
    pub anonymization_ratio: u8,
    pub adversarial_ratio: u8,
    pub mode: Vec<String>,
}

impl InferencePayload {
    pub fn data(&self) -> Vec<Value> {
        vec![
            json!(self.target),
            json!(self.source),
            json!(self.anonymization_ratio),
            json!(self.adversarial_ratio),
            json!(self.mode),
        ]
    }
}

impl From<&SwapRequest> for InferencePayload {
    fn from(request: &SwapRequest) -> Self {
        Self {
            target: ImagePayload::from_file(&request.target_image, TARGET_UPLOAD_NAME),
            source: ImagePayload::from_file(&request.source_image, SOURCE_UPLOAD_NAME),
            anonymization_ratio: request.anonymization_ratio.get(),
            adversarial_ratio: request.adversarial_ratio.get(),
            mode: request.mode.iter().cloned().collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoinRequest {
    pub data: Vec<Value>,
    pub api_name: String,
    pub fn_index: Option<u32>,
    pub session_hash: String,
    pub event_data: Option<Value>,
    pub trigger_id: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueJoinResponse {
    pub event_id: String,
}

/// Records streamed from the queue data endpoint, tagged by `msg`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "msg", rename_all = "snake_case")]
pub enum QueueMessage {
    Estimation {
        queue_size: Option<u32>,
        rank: Option<u32>,
        rank_eta: Option<f64>,
    },
    ProcessStarts {
        eta: Option<f64>,
    },
    ProcessCompleted {
        success: bool,
        #[serde(default)]
        output: Value,
    },
    UnexpectedError {
        message: Option<String>,
    },
    CloseStream,
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FileData {
    pub url: Option<String>,
    pub path: Option<String>,
    pub mime_type: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{default_mode_tags, Ratio};

    #[test]
    fn parses_progress_tags_and_ignores_unknown_ones() {
        let estimation: ProgressEvent =
            serde_json::from_str(r#"{"msg":"estimation","rank":2,"queue_size":5,"rank_eta":7.6}"#)
                .expect("estimation");
        assert_eq!(
            estimation,
            ProgressEvent::Estimation {
                queue_size: Some(5),
                rank: Some(2),
                rank_eta: Some(7.6),
            }
        );

        let unknown: ProgressEvent =
            serde_json::from_str(r#"{"msg":"log","log":"warming up"}"#).expect("unknown");
        assert_eq!(unknown, ProgressEvent::Unknown);
    }

    #[test]
    fn output_error_unwraps_nested_messages() {
        let failed: ProgressEvent = serde_json::from_str(
            r#"{"msg":"process_completed","success":false,"output":{"error":"X"}}"#,
        )
        .expect("completed");
        assert_eq!(failed.output_error().as_deref(), Some("X"));

        assert_eq!(
            error_text(&json!({"message": "no face"})).as_deref(),
            Some("no face")
        );
        assert_eq!(error_text(&Value::Null), None);
    }

    #[test]
    fn payload_keeps_positional_order() {
        let request = SwapRequest {
            target_image: ImageFile::new("a.png", None, b"t".to_vec()),
            source_image: ImageFile::new("b.png", None, b"s".to_vec()),
            anonymization_ratio: Ratio::new(10).expect("ratio"),
            adversarial_ratio: Ratio::new(90).expect("ratio"),
            mode: default_mode_tags(),
        };
        let data = InferencePayload::from(&request).data();
        assert_eq!(data.len(), 5);
        assert_eq!(data[0]["name"], TARGET_UPLOAD_NAME);
        assert_eq!(data[1]["name"], SOURCE_UPLOAD_NAME);
        assert_eq!(data[2], json!(10));
        assert_eq!(data[3], json!(90));
        assert_eq!(data[4], json!(["Compare"]));
    }
}
