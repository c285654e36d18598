use std::{collections::HashMap, fs, path::Path, sync::Arc};

use tracing::{error, info};

use crate::flow::{
    definition::{CompletionHandler, Flow},
    error::FlowError,
    qa::QaFlowConfig,
};

/// All flows the engine knows, by name. Filled before the engine is built.
#[derive(Debug, Default)]
pub struct FlowRegistry {
    flows: HashMap<String, Arc<Flow>>,
}

impl FlowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, flow: Flow) -> Result<(), FlowError> {
        let name = flow.name().to_string();
        if self.flows.contains_key(&name) {
            return Err(FlowError::DuplicateFlow(name));
        }
        info!(flow = %name, steps = flow.steps().len(), "registered flow");
        self.flows.insert(name, Arc::new(flow));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<Arc<Flow>> {
        self.flows.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.flows.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.flows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flows.is_empty()
    }

    /// Register every `.ygtc` / `.jgtc` question flow in `dir`, each finishing
    /// through `on_complete`. Files that do not load are logged and skipped.
    /// Returns how many flows were registered.
    pub fn load_dir(&mut self, dir: &Path, on_complete: Option<CompletionHandler>) -> Result<usize, FlowError> {
        let mut paths: Vec<_> = fs::read_dir(dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| matches!(p.extension().and_then(|e| e.to_str()), Some("ygtc" | "jgtc")))
            .collect();
        paths.sort();

        let mut loaded = 0;
        for path in paths {
            let flow = QaFlowConfig::load(&path).and_then(|cfg| cfg.into_flow(on_complete.clone()));
            match flow.and_then(|flow| self.register(flow)) {
                Ok(()) => loaded += 1,
                Err(e) => error!(path = %path.display(), error = %e, "skipping flow file"),
            }
        }
        Ok(loaded)
    }
}
