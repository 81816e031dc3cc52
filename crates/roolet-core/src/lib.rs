//! Protocol engine and worker pool for Roolet service workers and clients.
//!
//! The persistent connection to the broker, the cryptographic handshake,
//! the line-framed JSON-RPC 2.0 wire protocol, and the worker pool that
//! dispatches inbound calls to registered handlers all live here. See
//! [`Engine`] for the composition root.

mod client;
mod config;
mod connection;
mod dispatcher;
mod engine;
mod enums;
mod error;
mod registry;
mod session;
mod token;
mod wire;
mod worker;

pub use client::{CallOptions, CallOutcome, RpcClient};
pub use config::{Configuration, ConfigurationBuilder, ENV_PATH_VAR};
pub use connection::Connection;
pub use dispatcher::Dispatcher;
pub use engine::Engine;
pub use enums::GroupConnection;
pub use error::{AnswerError, AnswerErrorCode, RooletError};
pub use registry::{HandlerContext, MethodHandler, MethodOptions, MethodRegistry};
pub use session::{Session, SessionPhase};
pub use token::TokenMaker;
pub use wire::{Answer, AnswerResult, Command, FrameBuilder};
pub use worker::{DispatchMsg, ProgressProxy, ReplyMsg, Timer, TimerExceeded, WorkerPool};
