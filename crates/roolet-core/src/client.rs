use std::time::{Duration, Instant};

use serde_json::Value;

use crate::connection::Connection;
use crate::error::{AnswerError, AnswerErrorCode, RooletError};
use crate::session::Session;
use crate::wire::Command;

const DEFAULT_ITER_WAIT: Duration = Duration::from_millis(200);
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Overrides for a single [`RpcClient::call`] (`spec.md` §4.8).
#[derive(Debug, Clone, Copy)]
pub struct CallOptions {
    /// Block and poll `getresult` until completion or `timeout`. When
    /// `false`, a deferred call returns its `task` id immediately.
    pub sync: bool,
    pub iter_wait: Duration,
    pub timeout: Duration,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            sync: true,
            iter_wait: DEFAULT_ITER_WAIT,
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

/// What a call produced: an immediate or polled result, a deferred task id
/// (when `sync: false`), or a broker-reported failure. Broker errors during
/// Active are returned to the caller rather than torn down as fatal
/// (`spec.md` §7 tier 3).
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome {
    Result(Value),
    TaskId(String),
    Failed(AnswerError),
}

/// Caller-side RPC surface (`spec.md` §4.8): application code that invokes
/// remote methods, as opposed to hosting them. Wraps a [`Connection`] that
/// has already completed the Client-group handshake.
pub struct RpcClient {
    connection: Connection,
    session: Session,
    next_id: u64,
}

impl RpcClient {
    pub fn new(connection: Connection, session: Session) -> Self {
        Self {
            connection,
            session,
            next_id: 1,
        }
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    pub async fn call(
        &mut self,
        method: &str,
        params: Value,
        options: CallOptions,
    ) -> Result<CallOutcome, RooletError> {
        let mut command = Command::new(self.allocate_id(), method);
        command.cid = self.session.cid().unwrap_or_default().to_string();
        command.json = Some(params);

        let answer = self.connection.request(&command).await?;
        if let Some(error) = answer.error {
            return Ok(CallOutcome::Failed(error));
        }

        let body = answer.result.as_json();
        if let Some(data) = body.and_then(|value| value.get("data")) {
            if !data.is_null() {
                return Ok(CallOutcome::Result(data.clone()));
            }
        }

        let task_id = body
            .and_then(|value| value.get("task"))
            .and_then(Value::as_str)
            .ok_or_else(|| {
                RooletError::Protocol("call reply carried neither data nor task".to_string())
            })?
            .to_string();

        if !options.sync {
            return Ok(CallOutcome::TaskId(task_id));
        }

        self.poll_result(&task_id, options).await
    }

    async fn poll_result(
        &mut self,
        task_id: &str,
        options: CallOptions,
    ) -> Result<CallOutcome, RooletError> {
        let deadline = Instant::now() + options.timeout;
        loop {
            let mut command = Command::new(self.allocate_id(), "getresult");
            command.task = task_id.to_string();
            command.cid = self.session.cid().unwrap_or_default().to_string();

            let answer = self.connection.request(&command).await?;
            if let Some(error) = answer.error {
                return Ok(CallOutcome::Failed(error));
            }

            let body = answer.result.as_json();
            let exists = body
                .and_then(|value| value.get("exists"))
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if exists {
                let payload = body
                    .and_then(|value| value.get("data"))
                    .cloned()
                    .unwrap_or(Value::Null);
                return Ok(CallOutcome::Result(payload));
            }

            if Instant::now() >= deadline {
                return Ok(CallOutcome::Failed(AnswerError::new(
                    AnswerErrorCode::ResultTimeout,
                    format!("task {task_id} did not complete within {:?}", options.timeout),
                )));
            }

            tokio::time::sleep(options.iter_wait).await;
        }
    }
}
