use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AnswerError;
use crate::worker::{ProgressProxy, Timer};

/// Per-method execution options, overlaid on [`MethodOptions::default`]
/// (`spec.md` §4.5).
#[derive(Debug, Clone)]
pub struct MethodOptions {
    pub timeout: Option<std::time::Duration>,
    pub progress: bool,
    pub logger: bool,
}

impl Default for MethodOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            progress: true,
            logger: true,
        }
    }
}

impl MethodOptions {
    /// Overlays `self` (an override) onto `base` (the registry default):
    /// any field left at its own default falls back to `base`'s value.
    fn overlay(&self, base: &MethodOptions) -> MethodOptions {
        MethodOptions {
            timeout: self.timeout.or(base.timeout),
            progress: self.progress,
            logger: self.logger,
        }
    }
}

/// Side channels injected into a handler invocation when the effective
/// [`MethodOptions`] request them (`spec.md` §4.6 step 3).
pub struct HandlerContext {
    pub params: Value,
    /// Opaque payload from `Command::data`. Restricted to raw bytes rather
    /// than pickled objects (resolves the embedded-payload Open Question).
    pub data: Vec<u8>,
    pub progress: Option<ProgressProxy>,
    pub timer: Option<Timer>,
}

/// A registered, callable method. Handlers run on a worker thread and must
/// not block the network task; errors become a failed `Answer`.
pub trait MethodHandler: Send + Sync {
    fn call(&self, ctx: HandlerContext) -> Result<Value, AnswerError>;
}

impl<F> MethodHandler for F
where
    F: Fn(HandlerContext) -> Result<Value, AnswerError> + Send + Sync,
{
    fn call(&self, ctx: HandlerContext) -> Result<Value, AnswerError> {
        self(ctx)
    }
}

struct Registration {
    handler: Arc<dyn MethodHandler>,
    options: MethodOptions,
}

/// Process-wide mapping from method name to handler plus per-method
/// execution options (`spec.md` §4.5). Read-only once the engine reaches
/// the Active phase.
#[derive(Default)]
pub struct MethodRegistry {
    default_options: MethodOptions,
    methods: HashMap<String, Registration>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_options(default_options: MethodOptions) -> Self {
        Self {
            default_options,
            methods: HashMap::new(),
        }
    }

    pub fn set(
        &mut self,
        name: impl Into<String>,
        handler: impl MethodHandler + 'static,
        options: MethodOptions,
    ) {
        self.methods.insert(
            name.into(),
            Registration {
                handler: Arc::new(handler),
                options,
            },
        );
    }

    pub fn remove(&mut self, name: &str) {
        self.methods.remove(name);
    }

    pub fn get(&self, name: &str) -> Option<(Arc<dyn MethodHandler>, MethodOptions)> {
        self.methods
            .get(name)
            .map(|registration| {
                (
                    registration.handler.clone(),
                    registration.options.overlay(&self.default_options),
                )
            })
    }

    pub fn names(&self) -> Vec<String> {
        self.methods.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnswerErrorCode;

    fn ok_handler(_ctx: HandlerContext) -> Result<Value, AnswerError> {
        Ok(Value::String("ok".into()))
    }

    #[test]
    fn get_returns_none_for_unknown_method() {
        let registry = MethodRegistry::new();
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn set_then_get_roundtrips_handler_and_options() {
        let mut registry = MethodRegistry::new();
        registry.set("echo", ok_handler, MethodOptions::default());
        let (handler, options) = registry.get("echo").unwrap();
        assert!(options.progress);
        let ctx = HandlerContext {
            params: Value::Null,
            data: Vec::new(),
            progress: None,
            timer: None,
        };
        assert_eq!(handler.call(ctx).unwrap(), Value::String("ok".into()));
    }

    #[test]
    fn per_method_override_wins_over_default() {
        let mut registry =
            MethodRegistry::with_default_options(MethodOptions::default());
        registry.set(
            "slow",
            ok_handler,
            MethodOptions {
                timeout: Some(std::time::Duration::from_secs(5)),
                progress: false,
                logger: false,
            },
        );
        let (_, options) = registry.get("slow").unwrap();
        assert_eq!(options.timeout, Some(std::time::Duration::from_secs(5)));
        assert!(!options.progress);
    }

    #[test]
    fn remove_drops_method() {
        let mut registry = MethodRegistry::new();
        registry.set("echo", ok_handler, MethodOptions::default());
        registry.remove("echo");
        assert!(registry.get("echo").is_none());
    }

    #[test]
    fn names_lists_registered_methods() {
        let mut registry = MethodRegistry::new();
        registry.set("echo", ok_handler, MethodOptions::default());
        registry.set("ping", ok_handler, MethodOptions::default());
        let mut names = registry.names();
        names.sort();
        assert_eq!(names, vec!["echo".to_string(), "ping".to_string()]);
    }

    #[test]
    fn error_code_accessible_from_registry_module() {
        assert_eq!(AnswerErrorCode::NoMethod.code(), 102);
    }
}
