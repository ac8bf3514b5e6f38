use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::config::EngineConfig;
use crate::error::{AegisError, AegisResult};
use crate::models::StepAction;

use super::handlers::{
    BlockIpHandler, EscalateHandler, NotifyHandler, QuarantineHostHandler, RunScriptHandler,
    TagHandler, WaitHandler,
};
use super::StepHandler;

/// Maps each action kind to its handler. Populated once at startup; the
/// vocabulary is closed, so an unregistered action is a wiring bug surfaced
/// as an error, not a panic.
pub struct HandlerRegistry {
    handlers: HashMap<StepAction, Arc<dyn StepHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry with every built-in handler registered.
    pub fn with_defaults(config: &EngineConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(NotifyHandler::new()));
        registry.register(Arc::new(TagHandler));
        registry.register(Arc::new(BlockIpHandler));
        registry.register(Arc::new(QuarantineHostHandler));
        registry.register(Arc::new(EscalateHandler));
        registry.register(Arc::new(RunScriptHandler::new(
            config.script_allow_list.clone(),
        )));
        registry.register(Arc::new(WaitHandler));
        registry
    }

    /// Register a handler, replacing any previous one for the same action.
    pub fn register(&mut self, handler: Arc<dyn StepHandler>) {
        let action = handler.action();
        debug!(action = %action, "Registered step handler");
        self.handlers.insert(action, handler);
    }

    pub fn get(&self, action: StepAction) -> AegisResult<Arc<dyn StepHandler>> {
        self.handlers
            .get(&action)
            .cloned()
            .ok_or_else(|| AegisError::HandlerNotRegistered(action.name().to_string()))
    }

    pub fn registered_actions(&self) -> Vec<StepAction> {
        let mut actions: Vec<StepAction> = self.handlers.keys().copied().collect();
        actions.sort_by_key(|a| a.name());
        actions
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::with_defaults(&EngineConfig::default())
    }
}
