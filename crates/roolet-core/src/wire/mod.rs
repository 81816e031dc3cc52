mod frame;
mod unit;

pub use frame::FrameBuilder;
pub use unit::{Answer, AnswerResult, Command};
