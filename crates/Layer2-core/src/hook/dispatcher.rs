//! Hook Dispatcher - priority-ordered handlers per extension point
//!
//! Registrations are kept sorted by ascending priority. Ties go by owner rank,
//! the order in which plugins were first seen, then by registration order.
//! `execute` takes a snapshot of the handler list under the read lock
//! and then awaits each handler strictly one after another, so a concurrent
//! `unregister_all` only affects calls that start after it.

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use plughost_foundation::{HookSettings, Result};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::types::{panic_message, HookContext, HookContribution, HookName, HookResult};

// ============================================================================
// HookHandler
// ============================================================================

/// A callable registered on an extension point
#[async_trait]
pub trait HookHandler: Send + Sync {
    /// `Ok(None)` contributes nothing
    async fn handle(&self, ctx: &HookContext) -> Result<Option<HookResult>>;
}

struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> HookHandler for FnHandler<F>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HookResult>>> + Send + 'static,
{
    async fn handle(&self, ctx: &HookContext) -> Result<Option<HookResult>> {
        (self.f)(ctx.clone()).await
    }
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn HookHandler>
where
    F: Fn(HookContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<HookResult>>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

// ============================================================================
// HookRegistration
// ============================================================================

#[derive(Clone)]
pub struct HookRegistration {
    pub id: u64,
    pub hook: HookName,
    /// Plugin id that owns the handler
    pub owner: String,
    /// Lower runs first
    pub priority: i32,
    pub handler: Arc<dyn HookHandler>,
    owner_rank: u64,
}

impl std::fmt::Debug for HookRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookRegistration")
            .field("id", &self.id)
            .field("hook", &self.hook)
            .field("owner", &self.owner)
            .field("priority", &self.priority)
            .finish()
    }
}

/// One entry of a `register_all` batch
pub struct PendingHandler {
    pub hook: HookName,
    pub priority: i32,
    pub handler: Arc<dyn HookHandler>,
}

// ============================================================================
// HookDispatcher
// ============================================================================

pub struct HookDispatcher {
    table: RwLock<HashMap<HookName, Vec<HookRegistration>>>,
    next_id: AtomicU64,
    /// Owner id -> tie-break rank; kept across `unregister_all`
    owner_ranks: Mutex<HashMap<String, u64>>,
    next_rank: AtomicU64,
    max_result_depth: usize,
    handler_timeout: Option<Duration>,
}

impl Default for HookDispatcher {
    fn default() -> Self {
        Self::new(&HookSettings::default())
    }
}

impl HookDispatcher {
    pub fn new(settings: &HookSettings) -> Self {
        Self {
            table: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            owner_ranks: Mutex::new(HashMap::new()),
            next_rank: AtomicU64::new(0),
            max_result_depth: settings.max_result_depth,
            handler_timeout: settings.handler_timeout(),
        }
    }

    pub fn max_result_depth(&self) -> usize {
        self.max_result_depth
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Give an owner its place among equal-priority handlers
    ///
    /// The first call for an owner fixes its rank. Registering handlers for an
    /// owner without a rank reserves one.
    pub fn reserve_owner(&self, owner: &str) -> u64 {
        let mut ranks = self.owner_ranks.lock();
        if let Some(rank) = ranks.get(owner) {
            return *rank;
        }
        let rank = self.next_rank.fetch_add(1, Ordering::Relaxed);
        ranks.insert(owner.to_string(), rank);
        rank
    }

    /// Drop an owner's rank; it is ranked last when it comes back
    pub fn forget_owner(&self, owner: &str) {
        self.owner_ranks.lock().remove(owner);
    }

    pub fn register(
        &self,
        hook: HookName,
        owner: &str,
        handler: Arc<dyn HookHandler>,
        priority: i32,
    ) -> u64 {
        let mut table = self.table.write();
        self.insert(&mut table, hook, owner, handler, priority)
    }

    /// Register a batch under one write lock; callers never see half of it
    pub fn register_all(&self, owner: &str, batch: Vec<PendingHandler>) -> Vec<u64> {
        let mut table = self.table.write();
        batch
            .into_iter()
            .map(|p| self.insert(&mut table, p.hook, owner, p.handler, p.priority))
            .collect()
    }

    fn insert(
        &self,
        table: &mut HashMap<HookName, Vec<HookRegistration>>,
        hook: HookName,
        owner: &str,
        handler: Arc<dyn HookHandler>,
        priority: i32,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let owner_rank = self.reserve_owner(owner);
        let list = table.entry(hook).or_default();
        let pos = list.partition_point(|r| (r.priority, r.owner_rank) <= (priority, owner_rank));
        list.insert(
            pos,
            HookRegistration {
                id,
                hook,
                owner: owner.to_string(),
                priority,
                handler,
                owner_rank,
            },
        );
        debug!(plugin = owner, hook = %hook, priority, "Registered hook handler");
        id
    }

    pub fn unregister(&self, id: u64) -> bool {
        let mut table = self.table.write();
        for list in table.values_mut() {
            if let Some(pos) = list.iter().position(|r| r.id == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drop every handler of a plugin in one critical section
    pub fn unregister_all(&self, owner: &str) -> usize {
        let mut table = self.table.write();
        let mut removed = 0;
        for list in table.values_mut() {
            let before = list.len();
            list.retain(|r| r.owner != owner);
            removed += before - list.len();
        }
        table.retain(|_, list| !list.is_empty());
        if removed > 0 {
            debug!(plugin = owner, removed, "Unregistered hook handlers");
        }
        removed
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Registrations of a hook in execution order
    pub fn registrations(&self, hook: HookName) -> Vec<HookRegistration> {
        self.table.read().get(&hook).cloned().unwrap_or_default()
    }

    pub fn handler_count(&self, hook: HookName) -> usize {
        self.table.read().get(&hook).map_or(0, Vec::len)
    }

    /// Hooks a plugin currently has handlers on
    pub fn hooks_of(&self, owner: &str) -> Vec<HookName> {
        let table = self.table.read();
        let mut hooks: Vec<HookName> = table
            .iter()
            .filter(|(_, list)| list.iter().any(|r| r.owner == owner))
            .map(|(hook, _)| *hook)
            .collect();
        hooks.sort();
        hooks
    }

    // ========================================================================
    // Execution
    // ========================================================================

    /// Run all handlers of a hook and collect their results in order
    pub async fn execute(&self, hook: HookName, ctx: &HookContext) -> Vec<HookResult> {
        self.execute_detailed(hook, ctx)
            .await
            .into_iter()
            .map(|c| c.result)
            .collect()
    }

    /// Like [`execute`](Self::execute), keeping the owning plugin of each result
    pub async fn execute_detailed(&self, hook: HookName, ctx: &HookContext) -> Vec<HookContribution> {
        let snapshot = self.registrations(hook);
        let mut contributions = Vec::with_capacity(snapshot.len());

        for registration in snapshot {
            if let Some(result) = self.run_one(&registration, ctx).await {
                contributions.push(HookContribution {
                    plugin_id: registration.owner,
                    result,
                });
            }
        }

        contributions
    }

    async fn run_one(&self, registration: &HookRegistration, ctx: &HookContext) -> Option<HookResult> {
        let call = AssertUnwindSafe(registration.handler.handle(ctx)).catch_unwind();

        let outcome = match self.handler_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        plugin = %registration.owner,
                        hook = %registration.hook,
                        "Hook handler timed out after {:?}",
                        limit
                    );
                    return None;
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(Ok(Some(result))) => {
                if result.depth() > self.max_result_depth {
                    warn!(
                        plugin = %registration.owner,
                        hook = %registration.hook,
                        "Hook result nests deeper than {}; dropped",
                        self.max_result_depth
                    );
                    None
                } else {
                    Some(result)
                }
            }
            Ok(Ok(None)) => None,
            Ok(Err(e)) => {
                warn!(
                    plugin = %registration.owner,
                    hook = %registration.hook,
                    "Hook handler failed: {}",
                    e
                );
                None
            }
            Err(panic) => {
                warn!(
                    plugin = %registration.owner,
                    hook = %registration.hook,
                    "Hook handler panicked: {}",
                    panic_message(panic.as_ref())
                );
                None
            }
        }
    }
}
