use std::collections::HashMap;
use std::sync::Arc;

use crate::script::TaskScript;
use crate::task::TaskType;

/// Task type to script, fixed at startup.
#[derive(Clone, Default)]
pub struct ScriptRegistry {
    scripts: HashMap<TaskType, Arc<dyn TaskScript>>,
}

impl ScriptRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task_type: TaskType, script: Arc<dyn TaskScript>) -> &mut Self {
        self.scripts.insert(task_type, script);
        self
    }

    pub fn with(mut self, task_type: TaskType, script: Arc<dyn TaskScript>) -> Self {
        self.register(task_type, script);
        self
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskScript>> {
        self.scripts.get(&task_type).cloned()
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        let mut types: Vec<TaskType> = self.scripts.keys().copied().collect();
        types.sort_by_key(|t| t.as_str());
        types
    }
}

impl std::fmt::Debug for ScriptRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for t in self.task_types() {
            if let Some(s) = self.scripts.get(&t) {
                map.entry(&t.as_str(), &s.name());
            }
        }
        map.finish()
    }
}
