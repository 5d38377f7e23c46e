use serde::{Deserialize, Serialize};

use crate::types::{DictionaryKind, LookupHit};

/// A single unit of work handed to a worker process
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "task", content = "args", rename_all = "snake_case")]
pub enum WorkerTask {
    /// Parse the managed source copy, write its cache and insert its terms into the trie
    Index { id: String, kind: DictionaryKind },
    /// Full-term lookup against one dictionary
    Search { id: String, term: String },
}

impl WorkerTask {
    pub fn id(&self) -> &str {
        match self {
            WorkerTask::Index { id, .. } | WorkerTask::Search { id, .. } => id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WorkerTask::Index { .. } => "index",
            WorkerTask::Search { .. } => "search",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerResult {
    Done { payload: WorkerPayload },
    Closed,
    Error { message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WorkerPayload {
    Indexed { terms: u64, inserted: u64 },
    Lookup { hits: Vec<LookupHit> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_wire_shape() {
        let task = WorkerTask::Search {
            id: "oxford".into(),
            term: "apple".into(),
        };
        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"task": "search", "args": {"id": "oxford", "term": "apple"}})
        );

        let parsed: WorkerTask =
            serde_json::from_str(r#"{"task":"index","args":{"id":"a","kind":"mdd"}}"#).unwrap();
        assert_eq!(
            parsed,
            WorkerTask::Index {
                id: "a".into(),
                kind: DictionaryKind::Mdd
            }
        );
    }

    #[test]
    fn test_result_wire_shape() {
        let closed: WorkerResult = serde_json::from_str(r#"{"status":"closed"}"#).unwrap();
        assert_eq!(closed, WorkerResult::Closed);

        let done = WorkerResult::Done {
            payload: WorkerPayload::Lookup {
                hits: vec![LookupHit {
                    term: "banana".into(),
                    definition: None,
                }],
            },
        };
        let json = serde_json::to_value(&done).unwrap();
        assert_eq!(json["status"], "done");
        assert_eq!(json["payload"]["kind"], "lookup");
        assert!(json["payload"]["hits"][0]["definition"].is_null());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        assert!(serde_json::from_str::<WorkerResult>(r#"{"status":"maybe"}"#).is_err());
    }
}
