use serde_json::Value;

use crate::error::AnswerError;

/// Coordinator -> worker (`spec.md` §4.6).
#[derive(Debug, Clone)]
pub enum DispatchMsg {
    Exec {
        task_id: String,
        method: String,
        params: Value,
        data: Vec<u8>,
    },
    Exit,
}

/// Worker -> coordinator (`spec.md` §4.6). `idx` identifies the emitting
/// worker so the coordinator can track its lifecycle independently.
#[derive(Debug, Clone)]
pub enum ReplyMsg {
    Wait {
        idx: usize,
    },
    Result {
        idx: usize,
        task_id: String,
        outcome: Result<Value, AnswerError>,
    },
    Progress {
        idx: usize,
        task_id: String,
        percent: u8,
    },
    Complete {
        idx: usize,
    },
}
