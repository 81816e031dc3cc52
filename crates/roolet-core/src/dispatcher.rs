use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::TryRecvError;
use serde_json::{json, Value};
use tracing::{debug, error, trace, warn};

use crate::connection::Connection;
use crate::error::{AnswerError, AnswerErrorCode, RooletError};
use crate::wire::{Answer, Command};
use crate::worker::{DispatchMsg, ReplyMsg, WorkerPool};

/// Broker-initiated method names answered inline rather than routed through
/// the worker pool (`spec.md` §4.6: "other broker-initiated methods (status
/// probes, pings) are answered inline").
const INLINE_METHODS: &[&str] = &["status", "ping"];

/// Bridges the network read/write loop to the worker pool (`spec.md` §4.6).
/// Owns the socket after the handshake completes; no other component writes
/// to it.
pub struct Dispatcher {
    connection: Connection,
    pool: WorkerPool,
    active: Arc<AtomicBool>,
    iter_interval: Duration,
    live_workers: usize,
    shutdown_requested: bool,
}

impl Dispatcher {
    pub fn new(connection: Connection, pool: WorkerPool, active: Arc<AtomicBool>, iter: f64) -> Self {
        let live_workers = pool.worker_count();
        Self {
            connection,
            pool,
            active,
            iter_interval: Duration::from_secs_f64(iter.max(0.001)),
            live_workers,
            shutdown_requested: false,
        }
    }

    /// Runs until a graceful shutdown completes (`Ok`) or the connection is
    /// lost (`Err`, triggering the session's Reconnecting transition
    /// upstream in `Engine`).
    pub async fn run(mut self) -> Result<(), RooletError> {
        let mut interval = tokio::time::interval(self.iter_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            if !self.active.load(Ordering::SeqCst) && !self.shutdown_requested {
                self.pool.begin_shutdown();
                self.shutdown_requested = true;
            }

            tokio::select! {
                frame = self.connection.read_frame() => {
                    self.handle_inbound(frame?).await?;
                }
                _ = interval.tick() => {}
            }

            self.drain_replies().await?;

            if !self.active.load(Ordering::SeqCst) && self.live_workers == 0 {
                break;
            }
        }
        Ok(())
    }

    async fn handle_inbound(&mut self, frame: Value) -> Result<(), RooletError> {
        let method = frame.get("method").and_then(Value::as_str).unwrap_or("");

        if INLINE_METHODS.contains(&method) {
            return self.answer_inline(&frame, method).await;
        }

        let command = Command::from_wire(&frame)?;
        self.dispatch_call(command).await
    }

    async fn answer_inline(&mut self, frame: &Value, method: &str) -> Result<(), RooletError> {
        let id = frame.get("id").and_then(Value::as_u64).unwrap_or(0);
        let body = match method {
            "status" => json!({ "status": "alive" }),
            "ping" => json!({ "pong": true }),
            _ => json!({}),
        };
        let answer = Answer::ok(id, crate::wire::AnswerResult::Json(body));
        self.connection.write_frame(&answer.to_wire()).await
    }

    async fn dispatch_call(&mut self, command: Command) -> Result<(), RooletError> {
        if !self.active.load(Ordering::SeqCst) {
            // Shutdown in progress: behave exactly as if the pool were full.
            return self.reject_busy(command.id).await;
        }

        let task_id = if command.task.is_empty() {
            uuid::Uuid::new_v4().to_string()
        } else {
            command.task.clone()
        };
        let msg = DispatchMsg::Exec {
            task_id,
            method: command.method.clone(),
            params: command.json.clone().unwrap_or(Value::Null),
            data: command.data.clone(),
        };

        if self.pool.try_dispatch(msg).is_err() {
            warn!(method = %command.method, "dispatch queue full, rejecting call");
            return self.reject_busy(command.id).await;
        }
        Ok(())
    }

    async fn reject_busy(&mut self, id: u64) -> Result<(), RooletError> {
        let answer = Answer::err(
            id,
            AnswerError::new(AnswerErrorCode::AllServerBusy, "all workers are busy"),
        );
        self.connection.write_frame(&answer.to_wire()).await
    }

    async fn drain_replies(&mut self) -> Result<(), RooletError> {
        loop {
            match self.pool.reply_receiver().try_recv() {
                Ok(ReplyMsg::Wait { idx }) => trace!(idx, "worker idle"),
                Ok(ReplyMsg::Result {
                    task_id, outcome, ..
                }) => self.send_result(task_id, outcome).await?,
                Ok(ReplyMsg::Progress {
                    task_id, percent, ..
                }) => self.send_progress(task_id, percent).await?,
                Ok(ReplyMsg::Complete { idx }) => {
                    debug!(idx, "worker shut down");
                    self.live_workers = self.live_workers.saturating_sub(1);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    error!("worker pool reply channel disconnected");
                    break;
                }
            }
        }
        Ok(())
    }

    async fn send_result(
        &mut self,
        task_id: String,
        outcome: Result<Value, AnswerError>,
    ) -> Result<(), RooletError> {
        let mut command = Command::new(0, "result");
        command.task = task_id;
        command.json = Some(match outcome {
            Ok(value) => json!({ "result": value }),
            Err(error) => json!({ "error": { "code": error.code.code(), "message": error.message } }),
        });
        self.connection.write_frame(&command.to_wire()).await
    }

    async fn send_progress(&mut self, task_id: String, percent: u8) -> Result<(), RooletError> {
        let mut command = Command::new(0, "progress");
        command.task = task_id;
        command.json = Some(json!({ "percent": percent }));
        self.connection.write_frame(&command.to_wire()).await
    }
}
