mod messages;
mod pool;
mod progress;
mod timer;

pub use messages::{DispatchMsg, ReplyMsg};
pub use pool::WorkerPool;
pub use progress::ProgressProxy;
pub use timer::{Timer, TimerExceeded};
