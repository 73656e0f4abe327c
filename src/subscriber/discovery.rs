use std::{
    any::{type_name, TypeId},
    collections::{HashMap, HashSet},
    sync::Arc,
};

use dashmap::DashMap;
use tracing::debug;

use super::{
    binding::{DeclaredLevel, HandlerSet},
    DeclaringType, HandlerBinding, Subscriber, ThreadMode, HANDLER_NAME_PREFIX,
};
use crate::{event::EventType, EventBusError, EventBusResult};

/// Finds and caches the handler bindings of subscriber types.
pub struct HandlerDiscovery {
    cache: DashMap<TypeId, Arc<[Arc<HandlerBinding>]>>,
    skip_verification: HashSet<String>,
}

impl HandlerDiscovery {
    pub fn new(skip_verification: &[String]) -> Self {
        Self {
            cache: DashMap::new(),
            skip_verification: skip_verification.iter().cloned().collect(),
        }
    }

    /// Returns the bindings of `S`: its own handlers first, then inherited
    /// ones in declaration order, minus shadowed ones.
    pub fn find_handlers<S: Subscriber>(&self) -> EventBusResult<Arc<[Arc<HandlerBinding>]>> {
        if let Some(cached) = self.cache.get(&TypeId::of::<S>()) {
            return Ok(cached.clone());
        }

        let bindings = self.filter_handlers(HandlerSet::<S>::collect())?;
        if bindings.is_empty() {
            return Err(EventBusError::NoHandlersFound {
                subscriber: type_name::<S>().to_string(),
            });
        }

        let bindings: Arc<[Arc<HandlerBinding>]> = bindings.into();
        Ok(self
            .cache
            .entry(TypeId::of::<S>())
            .or_insert(bindings)
            .clone())
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn filter_handlers(&self, root: DeclaredLevel) -> EventBusResult<Vec<Arc<HandlerBinding>>> {
        let mut ancestors = HashMap::new();
        collect_ancestors(&root, &mut ancestors);

        let mut bindings = Vec::new();
        let mut found: HashMap<(String, EventType), DeclaringType> = HashMap::new();
        let mut visited = HashSet::new();
        let mut pending = vec![&root];

        while let Some(level) = pending.pop() {
            if !visited.insert(level.declaring_type.id) {
                continue;
            }
            let declaring_type = level.declaring_type;

            for candidate in &level.candidates {
                let Some(suffix) = candidate.name.strip_prefix(HANDLER_NAME_PREFIX) else {
                    debug!(
                        subscriber = declaring_type.name,
                        handler = %candidate.name,
                        "Skipping handler not named {}",
                        HANDLER_NAME_PREFIX
                    );
                    continue;
                };
                let Some(thread_mode) = self.thread_mode(declaring_type, &candidate.name, suffix)?
                else {
                    continue;
                };

                let key = (candidate.name.clone(), candidate.event_type);
                let shadowed = match found.get(&key) {
                    Some(previous) => !is_subtype(&ancestors, declaring_type, *previous),
                    None => false,
                };
                if shadowed {
                    continue;
                }
                found.insert(key, declaring_type);
                bindings.push(Arc::new(HandlerBinding::new(
                    candidate,
                    declaring_type,
                    thread_mode,
                )));
            }

            // Depth-first, parents in declaration order
            pending.extend(level.parents.iter().rev());
        }
        Ok(bindings)
    }

    fn thread_mode(
        &self,
        declaring_type: DeclaringType,
        name: &str,
        suffix: &str,
    ) -> EventBusResult<Option<ThreadMode>> {
        match ThreadMode::from_suffix(suffix) {
            Some(mode) => Ok(Some(mode)),
            None if self.skip_verification.contains(declaring_type.name) => Ok(None),
            None => Err(EventBusError::IllegalHandlerName {
                subscriber: declaring_type.name.to_string(),
                handler: name.to_string(),
            }),
        }
    }
}

fn collect_ancestors(
    level: &DeclaredLevel,
    ancestors: &mut HashMap<TypeId, HashSet<TypeId>>,
) -> HashSet<TypeId> {
    if let Some(known) = ancestors.get(&level.declaring_type.id) {
        return known.clone();
    }
    let mut own = HashSet::new();
    for parent in &level.parents {
        own.insert(parent.declaring_type.id);
        own.extend(collect_ancestors(parent, ancestors));
    }
    ancestors.insert(level.declaring_type.id, own.clone());
    own
}

/// True if `candidate` is `of` itself or derives from it.
fn is_subtype(
    ancestors: &HashMap<TypeId, HashSet<TypeId>>,
    candidate: DeclaringType,
    of: DeclaringType,
) -> bool {
    candidate == of
        || ancestors
            .get(&candidate.id)
            .is_some_and(|set| set.contains(&of.id))
}
