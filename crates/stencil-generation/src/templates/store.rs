//! Template store
//!
//! Holds validated templates in discovery order together with the
//! inheritance graph and the per-id resolution cache. Mutations take the
//! write lock for the whole check-and-swap, so a template that fails any
//! check never becomes visible.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

use crate::{
    compatibility,
    error::{CompositionError, Result},
    models::{Template, TemplateData},
    templates::{
        graph::{InheritanceGraph, InheritanceNode, DEFAULT_MAX_DEPTH},
        resolver::ResolvedSource,
    },
};

/// Default bound on lock acquisition
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct StoreState {
    templates: HashMap<String, Arc<Template>>,
    order: Vec<String>,
    graph: InheritanceGraph,
}

/// Outcome of a registration: the stored template and the ids whose
/// resolutions were invalidated
#[derive(Debug, Clone)]
pub struct Registration {
    pub template: Arc<Template>,
    pub invalidated: Vec<String>,
    pub replaced: bool,
}

/// Thread-safe template store
#[derive(Debug)]
pub struct TemplateStore {
    state: RwLock<StoreState>,
    resolutions: RwLock<HashMap<String, Arc<ResolvedSource>>>,
    generation: AtomicU64,
    lock_timeout: Duration,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_MAX_DEPTH, DEFAULT_LOCK_TIMEOUT)
    }

    pub fn with_limits(max_depth: usize, lock_timeout: Duration) -> Self {
        Self {
            state: RwLock::new(StoreState {
                templates: HashMap::new(),
                order: Vec::new(),
                graph: InheritanceGraph::new(max_depth),
            }),
            resolutions: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
            lock_timeout,
        }
    }

    /// Register a new template; fails if the id is already taken
    pub fn register(&self, data: TemplateData) -> Result<Registration> {
        self.insert(Template::from_data(data)?, false)
    }

    /// Replace a template in place, or register it if absent
    ///
    /// On failure the previous version stays active.
    pub fn reload(&self, data: TemplateData) -> Result<Registration> {
        self.insert(Template::from_data(data)?, true)
    }

    fn insert(&self, template: Template, allow_replace: bool) -> Result<Registration> {
        let mut state = self.write_state()?;
        let replaced = state.templates.contains_key(&template.id);
        if replaced && !allow_replace {
            return Err(CompositionError::Validation(format!(
                "Template '{}' is already registered",
                template.id
            )));
        }

        state.graph.check_insert(&template.id, template.parent())?;
        Self::check_types(&state, &template)?;

        let id = template.id.clone();
        let parent = template.inheritance.extends.clone();
        state.graph.insert(&id, parent.as_deref());
        let template = Arc::new(template);
        state.templates.insert(id.clone(), Arc::clone(&template));
        if !replaced {
            state.order.push(id.clone());
        }

        let invalidated = state.graph.lineage(&id);
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.purge_resolutions(&invalidated)?;
        drop(state);

        info!(
            template_id = %id,
            replaced,
            invalidated = invalidated.len(),
            "Registered template"
        );

        Ok(Registration {
            template,
            invalidated,
            replaced,
        })
    }

    /// Check the type against the registered parent and registered children
    fn check_types(state: &StoreState, template: &Template) -> Result<()> {
        let own_type = template.metadata.template_type.as_str();

        if let Some(parent) = template.parent().and_then(|p| state.templates.get(p)) {
            let parent_type = parent.metadata.template_type.as_str();
            if !compatibility::can_extend(own_type, parent_type) {
                return Err(CompositionError::IncompatibleTypes {
                    child: template.id.clone(),
                    child_type: own_type.to_string(),
                    parent: parent.id.clone(),
                    parent_type: parent_type.to_string(),
                });
            }
        }

        for child in state
            .templates
            .values()
            .filter(|t| t.parent() == Some(template.id.as_str()))
        {
            let child_type = child.metadata.template_type.as_str();
            if !compatibility::can_extend(child_type, own_type) {
                return Err(CompositionError::IncompatibleTypes {
                    child: child.id.clone(),
                    child_type: child_type.to_string(),
                    parent: template.id.clone(),
                    parent_type: own_type.to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Arc<Template>> {
        self.read_state()?
            .templates
            .get(id)
            .cloned()
            .ok_or_else(|| CompositionError::TemplateNotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.read_state()?.templates.contains_key(id))
    }

    /// All templates in discovery order
    pub fn all(&self) -> Result<Vec<Arc<Template>>> {
        let state = self.read_state()?;
        Ok(state
            .order
            .iter()
            .filter_map(|id| state.templates.get(id).cloned())
            .collect())
    }

    pub fn ids(&self) -> Result<Vec<String>> {
        Ok(self.read_state()?.order.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read_state()?.order.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn node(&self, id: &str) -> Result<Option<InheritanceNode>> {
        Ok(self.read_state()?.graph.node(id).cloned())
    }

    /// `id` and its transitive descendants, breadth-first
    pub fn lineage(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.read_state()?.graph.lineage(id))
    }

    /// Templates on the chain from `id` to its root, leaf first
    ///
    /// Fails with `TemplateNotFound` if any declared parent is missing.
    pub fn chain(&self, id: &str) -> Result<Vec<Arc<Template>>> {
        let state = self.read_state()?;
        let max_depth = state.graph.max_depth();
        let mut chain = Vec::new();
        let mut current = Some(id.to_string());

        while let Some(current_id) = current {
            let template = state
                .templates
                .get(&current_id)
                .cloned()
                .ok_or(CompositionError::TemplateNotFound(current_id))?;
            if chain.len() > max_depth {
                return Err(CompositionError::InheritanceTooDeep {
                    id: id.to_string(),
                    depth: chain.len(),
                    max_depth,
                });
            }
            current = template.inheritance.extends.clone();
            chain.push(template);
        }

        Ok(chain)
    }

    /// Mutation counter; bumped by every successful registration
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn cached_resolution(&self, id: &str) -> Option<Arc<ResolvedSource>> {
        self.resolutions
            .try_read_for(self.lock_timeout)?
            .get(id)
            .cloned()
    }

    /// Cache a resolution unless the store changed since `observed_generation`
    pub fn cache_resolution(&self, source: Arc<ResolvedSource>, observed_generation: u64) {
        let Some(mut resolutions) = self.resolutions.try_write_for(self.lock_timeout) else {
            return;
        };
        if self.generation() == observed_generation {
            resolutions.insert(source.template_id.clone(), source);
        }
    }

    fn purge_resolutions(&self, ids: &[String]) -> Result<()> {
        let mut resolutions = self
            .resolutions
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.timeout("resolution cache write"))?;
        for id in ids {
            if resolutions.remove(id).is_some() {
                debug!(template_id = %id, "Invalidated cached resolution");
            }
        }
        Ok(())
    }

    fn read_state(&self) -> Result<RwLockReadGuard<'_, StoreState>> {
        self.state
            .try_read_for(self.lock_timeout)
            .ok_or_else(|| self.timeout("template store read"))
    }

    fn write_state(&self) -> Result<RwLockWriteGuard<'_, StoreState>> {
        self.state
            .try_write_for(self.lock_timeout)
            .ok_or_else(|| self.timeout("template store write"))
    }

    fn timeout(&self, operation: &str) -> CompositionError {
        CompositionError::Timeout {
            operation: operation.to_string(),
            timeout_ms: self.lock_timeout.as_millis() as u64,
        }
    }
}

impl Default for TemplateStore {
    fn default() -> Self {
        Self::new()
    }
}
