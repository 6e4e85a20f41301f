//! Subscription lifecycle and the single-consumer driver loop.
//!
//! [`Subscription::open`] spawns the driver task for one entity table and
//! returns the handle; [`Subscription::close`] tears it down. Subscription
//! lifetime is explicit at the call site — nothing subscribes as a side
//! effect of construction.
//!
//! The driver owns the store, the ledger, and the reconciler outright and
//! processes one command at a time, run-to-completion. Local optimistic
//! writes and remote notifications funnel through the same queue, so queue
//! order is the only mutual exclusion needed. Company lookups are the one
//! async side effect: they run off-loop and their results re-enter the
//! queue, while later notifications for the same entity wait their turn so
//! per-entity arrival order is preserved. After `close`, results of still
//! in-flight lookups find the queue gone and are discarded.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::access::AccessContext;
use crate::config::EngineConfig;
use crate::engine::{ReconcileStats, Reconciler};
use crate::entity::{ChangeNotification, Entity, EntityId, EntityKind};
use crate::error::{Error, Result};
use crate::ledger::OptimisticLedger;
use crate::resolver::{CompanyDirectory, CompanyResolver};
use crate::store::LocalStore;

enum Command {
    Notification(ChangeNotification),
    Resolved {
        notification: ChangeNotification,
        companies: CompanyDirectory,
    },
    Begin {
        entity: Entity,
    },
    Confirm {
        temp_id: EntityId,
        server_id: EntityId,
        reply: oneshot::Sender<Result<()>>,
    },
    Prune {
        temp_id: EntityId,
    },
    Rollback {
        temp_id: EntityId,
    },
    Snapshot {
        reply: oneshot::Sender<Vec<Entity>>,
    },
    Roots {
        reply: oneshot::Sender<Vec<Entity>>,
    },
    StableKey {
        id: EntityId,
        reply: oneshot::Sender<EntityId>,
    },
    Stats {
        reply: oneshot::Sender<ReconcileStats>,
    },
}

/// Clonable handle the transport adapter uses to push notifications.
#[derive(Clone)]
pub struct Notifier {
    commands: mpsc::Sender<Command>,
}

impl Notifier {
    pub async fn push(&self, notification: ChangeNotification) -> Result<()> {
        self.commands
            .send(Command::Notification(notification))
            .await
            .map_err(|_| Error::ChannelClosed)
    }
}

/// An open reconciliation session for one entity table.
pub struct Subscription {
    commands: mpsc::Sender<Command>,
    shutdown: Option<oneshot::Sender<()>>,
    driver: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Start the driver for `kind`'s table under the given access context.
    ///
    /// Must be called within a tokio runtime.
    pub fn open<R: CompanyResolver>(
        kind: EntityKind,
        ctx: AccessContext,
        resolver: R,
        config: EngineConfig,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(config.channel.capacity);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let driver = Driver {
            store: LocalStore::new(),
            ledger: OptimisticLedger::new(),
            reconciler: Reconciler::new(kind, ctx, &config),
            resolver: Arc::new(resolver),
            commands: commands_tx.clone(),
            pending: HashMap::new(),
            in_flight: HashSet::new(),
        };
        let handle = tokio::spawn(driver.run(commands_rx, shutdown_rx));

        Self {
            commands: commands_tx,
            shutdown: Some(shutdown_tx),
            driver: Some(handle),
        }
    }

    /// Handle for the transport adapter feeding this subscription.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            commands: self.commands.clone(),
        }
    }

    /// Feed one change notification from the push channel.
    pub async fn push(&self, notification: ChangeNotification) -> Result<()> {
        self.send(Command::Notification(notification)).await
    }

    /// Register a local optimistic write and show its row immediately.
    ///
    /// `entity.id` must be a freshly minted temp id
    /// ([`EntityId::random_temp`]).
    pub async fn begin_write(&self, entity: Entity) -> Result<()> {
        self.send(Command::Begin { entity }).await
    }

    /// Record the server id returned by the write's direct response.
    pub async fn confirm_write(&self, temp_id: EntityId, server_id: EntityId) -> Result<()> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(Command::Confirm {
            temp_id,
            server_id,
            reply: reply_tx,
        })
        .await?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)?
    }

    /// Drop the ledger entry for a reconciled write.
    pub async fn prune(&self, temp_id: EntityId) -> Result<()> {
        self.send(Command::Prune { temp_id }).await
    }

    /// Abandon a failed write: drops the ledger entry and the optimistic row.
    pub async fn rollback(&self, temp_id: EntityId) -> Result<()> {
        self.send(Command::Rollback { temp_id }).await
    }

    /// Point-in-time copy of the collection.
    pub async fn snapshot(&self) -> Result<Vec<Entity>> {
        self.query(|reply| Command::Snapshot { reply }).await
    }

    /// Top-level entities, promoted children included.
    pub async fn roots(&self) -> Result<Vec<Entity>> {
        self.query(|reply| Command::Roots { reply }).await
    }

    /// The identity the rendering layer should key `id` by.
    pub async fn stable_key_for(&self, id: EntityId) -> Result<EntityId> {
        self.query(|reply| Command::StableKey { id, reply }).await
    }

    pub async fn stats(&self) -> Result<ReconcileStats> {
        self.query(|reply| Command::Stats { reply }).await
    }

    /// Tear down the subscription. In-flight lookups are discarded and
    /// never touch the (now dropped) collection.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(driver) = self.driver.take() {
            let _ = driver.await;
        }
    }

    async fn send(&self, command: Command) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    async fn query<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(command(reply_tx)).await?;
        reply_rx.await.map_err(|_| Error::ChannelClosed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

struct Driver<R: CompanyResolver> {
    store: LocalStore,
    ledger: OptimisticLedger,
    reconciler: Reconciler,
    resolver: Arc<R>,
    commands: mpsc::Sender<Command>,
    /// Notifications waiting behind an in-flight lookup for the same
    /// entity; preserves per-entity arrival order.
    pending: HashMap<EntityId, VecDeque<ChangeNotification>>,
    in_flight: HashSet<EntityId>,
}

impl<R: CompanyResolver> Driver<R> {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                command = commands.recv() => match command {
                    None => break,
                    Some(command) => self.handle(command),
                },
            }
        }
        tracing::debug!("subscription driver stopped");
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::Notification(notification) => self.on_notification(notification),
            Command::Resolved {
                notification,
                companies,
            } => self.on_resolved(notification, companies),
            Command::Begin { entity } => {
                self.ledger.begin(entity.id.clone());
                self.store.insert(entity);
            }
            Command::Confirm {
                temp_id,
                server_id,
                reply,
            } => {
                let result = self.ledger.confirm(&temp_id, server_id);
                if let Err(err) = &result {
                    tracing::error!(error = %err, "rejecting write confirmation");
                }
                let _ = reply.send(result);
            }
            Command::Prune { temp_id } => self.ledger.prune(&temp_id),
            Command::Rollback { temp_id } => {
                if let Some(entry) = self.ledger.rollback(&temp_id) {
                    self.store.remove(&entry.temp_id);
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.store.snapshot());
            }
            Command::Roots { reply } => {
                let roots = self.store.roots().into_iter().cloned().collect();
                let _ = reply.send(roots);
            }
            Command::StableKey { id, reply } => {
                let _ = reply.send(self.ledger.stable_key_for(&id));
            }
            Command::Stats { reply } => {
                let _ = reply.send(self.reconciler.stats());
            }
        }
    }

    fn on_notification(&mut self, notification: ChangeNotification) {
        let Some(id) = notification.next.id.value().cloned() else {
            // Malformed; the reconciler drops and logs it.
            self.apply_now(&notification, &CompanyDirectory::new());
            return;
        };

        if self.in_flight.contains(&id) {
            self.pending.entry(id).or_default().push_back(notification);
            return;
        }

        if !self.dispatch(notification) {
            self.in_flight.insert(id);
        }
    }

    fn on_resolved(&mut self, notification: ChangeNotification, companies: CompanyDirectory) {
        let id = notification.next.id.value().cloned();
        self.apply_now(&notification, &companies);

        // Drain anything that queued up behind this entity's lookup.
        let Some(id) = id else { return };
        loop {
            let next = self.pending.get_mut(&id).and_then(VecDeque::pop_front);
            match next {
                Some(queued) => {
                    if !self.dispatch(queued) {
                        // A new lookup is in flight; stay registered.
                        return;
                    }
                }
                None => {
                    self.pending.remove(&id);
                    self.in_flight.remove(&id);
                    return;
                }
            }
        }
    }

    /// Apply synchronously when no lookup is needed; otherwise spawn the
    /// lookup and return false. The result re-enters the queue as
    /// [`Command::Resolved`].
    fn dispatch(&mut self, notification: ChangeNotification) -> bool {
        let lookups =
            self.reconciler
                .company_lookups_needed(&self.store, &self.ledger, &notification);
        if lookups.is_empty() {
            self.apply_now(&notification, &CompanyDirectory::new());
            return true;
        }

        let resolver = Arc::clone(&self.resolver);
        let commands = self.commands.clone();
        tokio::spawn(async move {
            let mut companies = CompanyDirectory::new();
            for client_id in lookups {
                match resolver.resolve_company(&client_id).await {
                    Ok(Some(company_id)) => companies.insert(client_id, company_id),
                    Ok(None) => {}
                    Err(err) => {
                        // Unresolved stays out of the directory; the entity
                        // fails closed to not-visible.
                        tracing::warn!(client_id = %client_id, error = %err, "company lookup failed");
                    }
                }
            }
            // After teardown the queue is gone and this result is discarded.
            let _ = commands
                .send(Command::Resolved {
                    notification,
                    companies,
                })
                .await;
        });
        false
    }

    fn apply_now(&mut self, notification: &ChangeNotification, companies: &CompanyDirectory) {
        self.reconciler
            .apply(&mut self.store, &self.ledger, notification, companies);
    }
}
