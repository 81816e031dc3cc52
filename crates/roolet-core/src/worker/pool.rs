use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::error::{AnswerError, AnswerErrorCode, RooletError};
use crate::registry::{HandlerContext, MethodRegistry};
use crate::worker::{DispatchMsg, ProgressProxy, ReplyMsg, Timer};

/// Minimum poll interval an idle worker sleeps before checking the dispatch
/// queue again (`spec.md` §4.6 step 4).
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(250);

const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// N independent execution contexts bridging the async network task to
/// blocking, user-supplied handler code (`spec.md` §4.6). Each worker is a
/// plain OS thread; Rust threads have no GIL, so — unlike the
/// multiprocessing-based Python original — a thread per worker is enough to
/// keep blocking handlers from starving the networking loop.
pub struct WorkerPool {
    dispatch_tx: Sender<DispatchMsg>,
    reply_rx: Receiver<ReplyMsg>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// `count` must fall within `1..=1024` (`spec.md` §4.6).
    pub fn spawn(registry: Arc<MethodRegistry>, count: usize) -> Result<Self, RooletError> {
        Self::spawn_with_capacity(registry, count, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn spawn_with_capacity(
        registry: Arc<MethodRegistry>,
        count: usize,
        queue_capacity: usize,
    ) -> Result<Self, RooletError> {
        if count == 0 || count > 1024 {
            return Err(RooletError::InvalidWorkerCount(count));
        }

        let (dispatch_tx, dispatch_rx) = crossbeam_channel::bounded(queue_capacity);
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(queue_capacity);

        let handles = (0..count)
            .map(|idx| {
                let registry = registry.clone();
                let dispatch_rx = dispatch_rx.clone();
                let reply_tx = reply_tx.clone();
                std::thread::Builder::new()
                    .name(format!("roolet-worker-{idx}"))
                    .spawn(move || worker_loop(idx, registry, dispatch_rx, reply_tx))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        Ok(Self {
            dispatch_tx,
            reply_rx,
            handles,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }

    /// Non-blocking enqueue. Returns the message back to the caller when the
    /// dispatch queue is full so it can answer with `AllServerBusy`
    /// (`spec.md` §4.6 Backpressure) instead of blocking the read loop.
    pub fn try_dispatch(&self, msg: DispatchMsg) -> Result<(), DispatchMsg> {
        self.dispatch_tx.try_send(msg).map_err(|err| err.into_inner())
    }

    pub fn reply_receiver(&self) -> &Receiver<ReplyMsg> {
        &self.reply_rx
    }

    /// Sends `Exit` to every worker; callers should keep draining
    /// [`Self::reply_receiver`] until `worker_count()` `Complete` messages
    /// have been observed.
    pub fn begin_shutdown(&self) {
        for _ in 0..self.handles.len() {
            let _ = self.dispatch_tx.send(DispatchMsg::Exit);
        }
    }

    pub fn join(self) {
        for handle in self.handles {
            let _ = handle.join();
        }
    }
}

fn worker_loop(
    idx: usize,
    registry: Arc<MethodRegistry>,
    dispatch_rx: Receiver<DispatchMsg>,
    reply_tx: Sender<ReplyMsg>,
) {
    loop {
        match dispatch_rx.try_recv() {
            Ok(DispatchMsg::Exit) => {
                let _ = reply_tx.send(ReplyMsg::Complete { idx });
                break;
            }
            Ok(DispatchMsg::Exec {
                task_id,
                method,
                params,
                data,
            }) => {
                let outcome = execute(idx, &registry, &task_id, &method, params, data, &reply_tx);
                let _ = reply_tx.send(ReplyMsg::Result {
                    idx,
                    task_id,
                    outcome,
                });
            }
            Err(TryRecvError::Empty) => {
                let _ = reply_tx.send(ReplyMsg::Wait { idx });
                std::thread::sleep(IDLE_POLL_INTERVAL);
            }
            Err(TryRecvError::Disconnected) => break,
        }
    }
}

fn execute(
    idx: usize,
    registry: &MethodRegistry,
    task_id: &str,
    method: &str,
    params: serde_json::Value,
    data: Vec<u8>,
    reply_tx: &Sender<ReplyMsg>,
) -> Result<serde_json::Value, AnswerError> {
    let Some((handler, options)) = registry.get(method) else {
        return Err(AnswerError::new(
            AnswerErrorCode::NoMethod,
            format!("no such method: {method}"),
        ));
    };

    let progress = options.progress.then(|| {
        let reply_tx = reply_tx.clone();
        let task_id = task_id.to_string();
        ProgressProxy::new(Arc::new(move |percent| {
            let _ = reply_tx.send(ReplyMsg::Progress {
                idx,
                task_id: task_id.clone(),
                percent,
            });
        }))
    });
    let timer = options.timeout.map(Timer::new);

    let ctx = HandlerContext {
        params,
        data,
        progress,
        timer,
    };

    match catch_unwind(AssertUnwindSafe(|| handler.call(ctx))) {
        Ok(result) => result,
        Err(panic) => Err(AnswerError::new(
            AnswerErrorCode::ExecError,
            panic_message(panic),
        )),
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked".to_string()
    }
}
