use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::context::{RequestContext, Services};
use crate::error::ScriptError;
use crate::task::{Task, TaskInput};

/// Validation plus data movement for one task type.
///
/// `validate` must not touch any store; `perform` does the I/O and returns
/// the value stored as the task's `result`.
#[async_trait]
pub trait TaskScript: Send + Sync {
    fn name(&self) -> &str;

    /// Keys that must be present in the task input.
    fn required_keys(&self) -> &'static [&'static str];

    fn validate(&self, task: &Task) -> Result<(), ScriptError> {
        require_keys(task.input(), self.required_keys())
    }

    async fn perform(&self, task: &Task, ctx: &ScriptContext) -> Result<Value, ScriptError>;
}

pub fn require_keys(input: &TaskInput, keys: &[&str]) -> Result<(), ScriptError> {
    match keys.iter().find(|k| !input.contains_key(**k)) {
        Some(key) => Err(ScriptError::invalid(format!(
            "Input does not contain '{key}' field"
        ))),
        None => Ok(()),
    }
}

/// Cooperative cancellation for one running task. Stores observe the token
/// between chunks; the reason ends up in the task message.
#[derive(Debug, Clone, Default)]
pub struct KillSwitch {
    token: CancellationToken,
    reason: Arc<Mutex<Option<String>>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn fire(&self, reason: Option<String>) {
        *self.reason.lock().unwrap_or_else(PoisonError::into_inner) = reason;
        self.token.cancel();
    }

    pub fn is_fired(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Everything a script run may use.
#[derive(Clone)]
pub struct ScriptContext {
    pub request: RequestContext,
    pub services: Services,
    pub kill: KillSwitch,
    /// Child of the kill token, also cancelled when the run's time budget
    /// runs out.
    deadline: CancellationToken,
}

impl ScriptContext {
    pub fn new(request: RequestContext, services: Services) -> Self {
        let kill = KillSwitch::new();
        let deadline = kill.token().child_token();
        Self {
            request,
            services,
            kill,
            deadline,
        }
    }

    pub fn with_kill_switch(mut self, kill: KillSwitch) -> Self {
        self.deadline = kill.token().child_token();
        self.kill = kill;
        self
    }

    /// Cancels [`ScriptContext::cancellation`] without firing the kill switch.
    pub fn expire(&self) {
        self.deadline.cancel();
    }

    pub fn auth_token(&self) -> Option<&str> {
        self.request.auth_token()
    }

    /// Fires on kill or when the time budget is spent.
    pub fn cancellation(&self) -> CancellationToken {
        self.deadline.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn first_missing_key_is_reported() {
        let input = json!({"import_from": "x"}).as_object().cloned().unwrap();
        let err = require_keys(&input, &["import_from", "import_from_format", "image_properties"])
            .unwrap_err();
        assert_eq!(
            err.failure_message(),
            "Invalid: Input does not contain 'import_from_format' field"
        );
        assert!(require_keys(&input, &["import_from"]).is_ok());
    }

    #[test]
    fn kill_switch_keeps_reason() {
        let kill = KillSwitch::new();
        assert!(!kill.is_fired());
        kill.fire(Some("operator request".into()));
        assert!(kill.is_fired());
        assert!(kill.token().is_cancelled());
        assert_eq!(kill.reason().as_deref(), Some("operator request"));
    }

    #[test]
    fn expiry_cancels_the_run_but_not_the_kill_switch() {
        let ctx = ScriptContext::new(RequestContext::default(), Services::in_memory("images"));
        let token = ctx.cancellation();
        ctx.expire();
        assert!(token.is_cancelled());
        assert!(!ctx.kill.is_fired());
    }

    #[test]
    fn kill_reaches_the_cancellation_token() {
        let kill = KillSwitch::new();
        let ctx = ScriptContext::new(RequestContext::default(), Services::in_memory("images"))
            .with_kill_switch(kill.clone());
        kill.fire(None);
        assert!(ctx.cancellation().is_cancelled());
    }
}
