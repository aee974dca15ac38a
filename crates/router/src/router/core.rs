use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tracing::{debug, error, info, warn};

use beast_core::{Message, Route};
use beast_rules::{Rule, RuleContext, RuleId};

use crate::definition::RouteDefinition;
use crate::error::{Result, RoutingError, StoreError};
use crate::store::RouteStore;

/// A registered route together with its live rule instance.
struct ActiveRoute {
    definition: RouteDefinition,
    rule: Rule,
}

/// Owns every live rule and expands inbound messages into deliveries.
///
/// Registry changes take the write lock briefly; [`expand`](Router::expand)
/// only holds the read lock long enough to snapshot the active routes, so
/// rule evaluation never blocks registration and vice versa.
pub struct Router {
    ctx: RuleContext,
    routes: RwLock<IndexMap<String, Arc<ActiveRoute>>>,
    next_rule_id: AtomicU64,
    store: Option<Arc<dyn RouteStore>>,
}

impl Router {
    /// Router without persistence.
    pub fn new(ctx: RuleContext) -> Self {
        Self {
            ctx,
            routes: RwLock::new(IndexMap::new()),
            next_rule_id: AtomicU64::new(1),
            store: None,
        }
    }

    /// Router that writes every registry change through to `store`.
    pub fn with_store(ctx: RuleContext, store: Arc<dyn RouteStore>) -> Self {
        Self {
            ctx,
            routes: RwLock::new(IndexMap::new()),
            next_rule_id: AtomicU64::new(1),
            store: Some(store),
        }
    }

    pub fn context(&self) -> &RuleContext {
        &self.ctx
    }

    /// Register every definition in the store. Definitions that fail to build
    /// are logged and skipped. Returns how many routes were registered.
    pub fn load_from_store(&self) -> Result<usize> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let mut loaded = 0;
        for definition in store.list()? {
            let name = definition.name.clone();
            match self.insert(definition) {
                Ok(rule_id) => {
                    info!(route = %name, rule_id, "loaded route");
                    loaded += 1;
                }
                Err(e) => warn!(route = %name, error = %e, "skipping route"),
            }
        }
        Ok(loaded)
    }

    /// Add a new route, persisting it first. Fails with
    /// [`RoutingError::RouteExists`] if the name is taken.
    pub fn register(&self, definition: RouteDefinition) -> Result<RuleId> {
        definition.validate()?;
        let mut routes = self.write();
        if routes.contains_key(&definition.name) {
            return Err(RoutingError::RouteExists(definition.name));
        }
        let active = self.build(definition)?;
        if let Some(store) = &self.store {
            store.store(&active.definition).map_err(|e| match e {
                StoreError::AlreadyExists(name) => RoutingError::RouteExists(name),
                other => other.into(),
            })?;
        }
        let rule_id = active.rule.id();
        info!(route = %active.definition.name, rule_id, kind = %active.rule.kind(), "registered route");
        routes.insert(active.definition.name.clone(), Arc::new(active));
        Ok(rule_id)
    }

    /// Replace an existing route. The old rule is disposed: its timers are
    /// cancelled and its open slots are superseded.
    pub fn update(&self, definition: RouteDefinition) -> Result<RuleId> {
        definition.validate()?;
        let mut routes = self.write();
        if !routes.contains_key(&definition.name) {
            return Err(RoutingError::NoSuchRoute(definition.name));
        }
        let active = self.build(definition)?;
        if let Some(store) = &self.store {
            store.update(&active.definition)?;
        }
        let rule_id = active.rule.id();
        let name = active.definition.name.clone();
        let old = routes.insert(name.clone(), Arc::new(active));
        drop(routes);

        if let Some(old) = old {
            old.rule.dispose();
        }
        info!(route = %name, rule_id, "updated route");
        Ok(rule_id)
    }

    /// Remove a route and dispose its rule.
    pub fn unregister(&self, name: &str) -> Result<RouteDefinition> {
        let mut routes = self.write();
        if !routes.contains_key(name) {
            return Err(RoutingError::NoSuchRoute(name.to_string()));
        }
        if let Some(store) = &self.store {
            match store.delete(name) {
                Ok(()) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }
        let removed = routes.shift_remove(name);
        drop(routes);

        let Some(removed) = removed else {
            return Err(RoutingError::NoSuchRoute(name.to_string()));
        };
        removed.rule.dispose();
        info!(route = %name, rule_id = removed.rule.id(), "unregistered route");
        Ok(removed.definition.clone())
    }

    pub fn definition(&self, name: &str) -> Option<RouteDefinition> {
        self.read().get(name).map(|r| r.definition.clone())
    }

    /// All definitions in registration order.
    pub fn definitions(&self) -> Vec<RouteDefinition> {
        self.read().values().map(|r| r.definition.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Evaluate `message` against the active routes and return one
    /// [`Route`] per recipient of every rule that produced output.
    ///
    /// A `Trigger` whose `job` names a route is only shown to that route.
    /// A `MultiRouted` message skips rule evaluation: its payload goes to the
    /// recipients of the route it names, or straight to the named adaptor.
    /// A rule that errors or panics is logged and skipped; the remaining
    /// routes are still evaluated.
    pub fn expand(&self, message: &Message) -> Vec<Route> {
        if let Message::MultiRouted { destination, payload } = message {
            return self.address(destination, payload);
        }
        let targets = self.targets(message);
        let mut out = Vec::new();

        for route in targets {
            let name = &route.definition.name;
            let result = catch_unwind(AssertUnwindSafe(|| route.rule.handle(message)));
            let produced = match result {
                Ok(Ok(Some(produced))) => produced,
                Ok(Ok(None)) => continue,
                Ok(Err(e)) => {
                    warn!(route = %name, rule_id = route.rule.id(), error = %e, "rule evaluation failed");
                    continue;
                }
                Err(_) => {
                    error!(route = %name, rule_id = route.rule.id(), "rule panicked during evaluation");
                    continue;
                }
            };

            debug!(
                route = %name,
                input = message.kind(),
                output = produced.kind(),
                recipients = route.definition.recipients.len(),
                "rule produced message"
            );
            out.extend(
                route
                    .definition
                    .recipients
                    .iter()
                    .map(|recipient| Route::new(recipient.clone(), produced.clone())),
            );
        }
        out
    }

    fn address(&self, destination: &str, payload: &Message) -> Vec<Route> {
        let routes = self.read();
        match routes.get(destination) {
            Some(route) if route.definition.active => route
                .definition
                .recipients
                .iter()
                .map(|recipient| Route::new(recipient.clone(), payload.clone()))
                .collect(),
            Some(_) => {
                debug!(route = %destination, "addressed route inactive, dropping payload");
                Vec::new()
            }
            None => vec![Route::new(destination, payload.clone())],
        }
    }

    fn targets(&self, message: &Message) -> Vec<Arc<ActiveRoute>> {
        let routes = self.read();
        if let Message::Trigger { job, .. } = message {
            if let Some(route) = routes.get(job) {
                return if route.definition.active {
                    vec![Arc::clone(route)]
                } else {
                    Vec::new()
                };
            }
        }
        routes
            .values()
            .filter(|r| r.definition.active)
            .cloned()
            .collect()
    }

    fn build(&self, definition: RouteDefinition) -> Result<ActiveRoute> {
        let id = self.next_rule_id.fetch_add(1, Ordering::Relaxed);
        let rule = Rule::build(id, &definition.rule, &self.ctx.for_route(&definition.name))?;
        Ok(ActiveRoute { definition, rule })
    }

    /// Insert without persisting; used when loading from the store.
    fn insert(&self, definition: RouteDefinition) -> Result<RuleId> {
        definition.validate()?;
        let mut routes = self.write();
        if routes.contains_key(&definition.name) {
            return Err(RoutingError::RouteExists(definition.name));
        }
        let active = self.build(definition)?;
        let rule_id = active.rule.id();
        routes.insert(active.definition.name.clone(), Arc::new(active));
        Ok(rule_id)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<String, Arc<ActiveRoute>>> {
        self.routes.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<String, Arc<ActiveRoute>>> {
        self.routes.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        let routes = self.routes.get_mut().unwrap_or_else(PoisonError::into_inner);
        for route in routes.values() {
            route.rule.dispose();
        }
    }
}
