//! Minimal service worker: registers one method and runs until SIGINT/SIGTERM.
//!
//! Requires `ROOLET_CONG` to name a JSON configuration file with at least
//! `crypto_priv_key_path` set. See `spec.md` §6 for the full key list.

use roolet_core::{
    AnswerError, AnswerErrorCode, Configuration, Engine, HandlerContext, MethodOptions,
    MethodRegistry,
};
use serde_json::Value;

fn echo(ctx: HandlerContext) -> Result<Value, AnswerError> {
    ctx.params
        .get("message")
        .cloned()
        .ok_or_else(|| AnswerError::new(AnswerErrorCode::FormatError, "missing 'message'"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Configuration::from_env()?;

    let mut registry = MethodRegistry::new();
    registry.set("echo", echo, MethodOptions::default());

    let engine = Engine::new(config, registry);
    engine.run().await?;
    Ok(())
}
