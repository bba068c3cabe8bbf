use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

/// Broadcast payload announcing that a new data file is ready.
///
/// Wire form is `{"id": "<origin>", "name": "<candidate>"}`; the short field names
/// are what already-deployed instances publish and must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SwapMessage {
    /// Identity of the process that requested the swap.
    #[serde(rename = "id")]
    pub origin_id: String,

    /// File stem of the candidate database, resolved as `<base-dir>/<name>.db`.
    #[serde(rename = "name")]
    pub candidate_name: String,
}

impl SwapMessage {
    pub fn new(origin_id: impl Into<String>, candidate_name: impl Into<String>) -> Self {
        Self {
            origin_id: origin_id.into(),
            candidate_name: candidate_name.into(),
        }
    }

    pub fn from_slice(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Checks that `candidate_name` is a plain file stem that cannot leave the base directory.
    pub fn validate(&self) -> Result<(), CandidateNameError> {
        let name = self.candidate_name.as_str();
        if name.is_empty() {
            return Err(CandidateNameError::Empty);
        }
        if name == "." || name == ".." {
            return Err(CandidateNameError::Relative(name.to_string()));
        }
        if let Some(c) = name
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        {
            return Err(CandidateNameError::IllegalChar {
                name: name.to_string(),
                found: c,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum CandidateNameError {
    #[error("candidate name is empty")]
    Empty,

    #[error("candidate name {0:?} is a relative path")]
    Relative(String),

    #[error("candidate name {name:?} contains illegal character {found:?}")]
    IllegalChar { name: String, found: char },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_with_short_field_names() {
        let msg = SwapMessage::new("abc", "new-1");
        let out = serde_json::to_value(&msg).expect("serialize message");
        assert_eq!(out, json!({ "id": "abc", "name": "new-1" }));
    }

    #[test]
    fn decodes_payload_from_existing_publishers() {
        let msg = SwapMessage::from_slice(br#"{"id":"X","name":"new-1718000000000000"}"#)
            .expect("decode message");
        assert_eq!(msg.origin_id, "X");
        assert_eq!(msg.candidate_name, "new-1718000000000000");
    }

    #[test]
    fn rejects_payload_missing_name() {
        assert!(SwapMessage::from_slice(br#"{"id":"X"}"#).is_err());
        assert!(SwapMessage::from_slice(b"not-json").is_err());
    }

    #[test]
    fn validate_accepts_time_derived_names() {
        assert!(SwapMessage::new("X", "new-1718000000000000").validate().is_ok());
        assert!(SwapMessage::new("X", "snapshot_v2.1").validate().is_ok());
    }

    #[test]
    fn validate_rejects_path_escapes() {
        assert_eq!(
            SwapMessage::new("X", "").validate(),
            Err(CandidateNameError::Empty)
        );
        assert!(matches!(
            SwapMessage::new("X", "..").validate(),
            Err(CandidateNameError::Relative(_))
        ));
        assert!(matches!(
            SwapMessage::new("X", "../etc/passwd").validate(),
            Err(CandidateNameError::IllegalChar { found: '/', .. })
        ));
    }

    #[test]
    fn name_errors_render_offending_input() {
        let err = SwapMessage::new("X", "a/b").validate().unwrap_err();
        assert_eq!(
            err.to_string(),
            r#"candidate name "a/b" contains illegal character '/'"#
        );
        let boxed: Box<dyn std::error::Error> = Box::new(CandidateNameError::Empty);
        assert_eq!(boxed.to_string(), "candidate name is empty");
    }
}
