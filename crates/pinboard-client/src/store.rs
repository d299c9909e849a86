use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use pinboard_types::events::TableChange;
use pinboard_types::models::{Account, Avatar, Pin};

use crate::config::{AccessMode, ClientConfig, StoreConfig};
use crate::error::RemoteResult;
use crate::identity::{IdentityProvider, StaticIdentityProvider};
use crate::mirror::{Collection, Collections, Mirror};
use crate::notice::{Notice, NoticeKind};
use crate::remote::{ChangeHandler, HttpRemote, RemoteStore, Subscription};
use crate::session::{AccessPolicy, InviteOnly, OpenAccess, SessionState};

/// Notices buffered for slow consumers before they start lagging.
const NOTICE_BUFFER: usize = 64;

/// Application-wide handle over the mirrored collections, the mutation
/// engine and the session. Cheap to clone; every clone shares one state.
#[derive(Clone)]
pub struct Store {
    pub(crate) inner: Arc<StoreInner>,
}

pub(crate) struct StoreInner {
    pub(crate) remote: Arc<dyn RemoteStore>,
    pub(crate) identity: Option<Arc<dyn IdentityProvider>>,
    pub(crate) access: Arc<dyn AccessPolicy>,
    pub(crate) config: StoreConfig,
    pub(crate) mirror: RwLock<Mirror>,
    pub(crate) session: RwLock<SessionState>,
    /// Serializes session resolution so concurrent notifications can't
    /// provision the same email twice.
    pub(crate) resolve_lock: tokio::sync::Mutex<()>,
    unconfigured_reported: AtomicBool,
    notices: broadcast::Sender<Notice>,
    gates: [RefreshGate; 3],
    tasks: Mutex<Vec<JoinHandle<()>>>,
    subscriptions: Mutex<Vec<Subscription>>,
}

/// Collapses overlapping refresh requests for one collection into the one
/// in flight plus at most one trailing run.
#[derive(Default)]
struct RefreshGate {
    running: AtomicBool,
    dirty: AtomicBool,
}

impl Drop for StoreInner {
    fn drop(&mut self) {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
    }
}

pub struct StoreBuilder {
    remote: Arc<dyn RemoteStore>,
    identity: Option<Arc<dyn IdentityProvider>>,
    access: Option<Arc<dyn AccessPolicy>>,
    config: StoreConfig,
}

impl StoreBuilder {
    pub fn identity(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.identity = Some(provider);
        self
    }

    /// Overrides the policy selected by `StoreConfig::access`.
    pub fn access_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.access = Some(policy);
        self
    }

    pub fn config(mut self, config: StoreConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Store {
        let access: Arc<dyn AccessPolicy> = match self.access {
            Some(policy) => policy,
            None => match self.config.access {
                AccessMode::Open => Arc::new(OpenAccess),
                AccessMode::InviteOnly => Arc::new(InviteOnly::new(self.config.admin_email.clone())),
            },
        };
        let (notices, _) = broadcast::channel(NOTICE_BUFFER);

        Store {
            inner: Arc::new(StoreInner {
                remote: self.remote,
                identity: self.identity,
                access,
                config: self.config,
                mirror: RwLock::new(Mirror::default()),
                session: RwLock::new(SessionState::Unauthenticated),
                resolve_lock: tokio::sync::Mutex::new(()),
                unconfigured_reported: AtomicBool::new(false),
                notices,
                gates: Default::default(),
                tasks: Mutex::new(Vec::new()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }
}

impl Store {
    pub fn builder(remote: Arc<dyn RemoteStore>) -> StoreBuilder {
        StoreBuilder {
            remote,
            identity: None,
            access: None,
            config: StoreConfig::default(),
        }
    }

    /// Build a store talking to the configured HTTP API. A missing identity
    /// profile leaves the store without a provider.
    pub fn from_config(config: ClientConfig) -> anyhow::Result<Self> {
        let remote_cfg = config
            .remote
            .ok_or_else(|| anyhow::anyhow!("PINBOARD_API_URL and PINBOARD_API_KEY must be set"))?;
        let remote = HttpRemote::from_config(&remote_cfg)?;

        let mut builder = Store::builder(Arc::new(remote)).config(config.store);
        if let Some(identity) = &config.identity {
            builder = builder.identity(Arc::new(StaticIdentityProvider::from_config(identity)));
        }
        Ok(builder.build())
    }

    /// Resolve the session, load every collection, open the change
    /// subscriptions and start following identity changes.
    pub async fn start(&self) {
        self.resolve_current_session().await;
        self.load_all().await;
        self.open_subscriptions().await;
        self.watch_identity();
    }

    /// Release every subscription and background task.
    pub fn shutdown(&self) {
        let subscriptions: Vec<Subscription> = match self.inner.subscriptions.lock() {
            Ok(mut subs) => subs.drain(..).collect(),
            Err(e) => {
                error!("Subscription list poisoned: {}", e);
                Vec::new()
            }
        };
        let released = subscriptions.len();
        drop(subscriptions);

        if let Ok(mut tasks) = self.inner.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        info!("Store shut down ({} subscriptions released)", released);
    }

    // -- Snapshots --

    /// Fetch one collection and replace the local copy wholesale. On failure
    /// the previous local copy stays in place.
    pub async fn load_snapshot(&self, collection: Collection) -> RemoteResult<()> {
        let remote = &self.inner.remote;
        let result = match collection {
            Collection::Accounts => match remote.list_accounts().await {
                Ok(accounts) => {
                    self.inner.mirror.write().await.replace_accounts(accounts);
                    self.sync_session_account().await;
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Collection::Pins => match remote.list_pins().await {
                Ok(pins) => {
                    self.inner.mirror.write().await.replace_pins(pins);
                    Ok(())
                }
                Err(e) => Err(e),
            },
            Collection::Avatars => match remote.list_avatars().await {
                Ok(avatars) => {
                    self.inner.mirror.write().await.replace_avatars(avatars);
                    Ok(())
                }
                Err(e) => Err(e),
            },
        };

        if let Err(e) = &result {
            warn!("Failed to load {}: {}", collection.as_str(), e);
            self.notify(NoticeKind::SnapshotFailed {
                collection: collection.as_str(),
            });
        }
        result
    }

    pub async fn load_all(&self) {
        for collection in Collection::ALL {
            let _ = self.load_snapshot(collection).await;
        }
    }

    /// Re-fetch a collection, coalescing with any refresh already running.
    pub async fn refresh(&self, collection: Collection) {
        let gate = &self.inner.gates[collection.index()];
        gate.dirty.store(true, Ordering::Release);
        if gate.running.swap(true, Ordering::AcqRel) {
            return;
        }

        loop {
            gate.dirty.store(false, Ordering::Release);
            let _ = self.load_snapshot(collection).await;
            gate.running.store(false, Ordering::Release);

            // Another request arrived while loading: run once more unless
            // someone else already picked it up.
            if !gate.dirty.load(Ordering::Acquire) || gate.running.swap(true, Ordering::AcqRel) {
                break;
            }
        }
    }

    /// Keep the authenticated account in step with the freshly loaded rows.
    async fn sync_session_account(&self) {
        let Some(id) = self.inner.session.read().await.account().map(|a| a.id) else {
            return;
        };
        let fresh = self.inner.mirror.read().await.account(id).cloned();
        if let Some(fresh) = fresh {
            let mut session = self.inner.session.write().await;
            if let SessionState::Authenticated(account) = &mut *session {
                if account.id == fresh.id {
                    *account = fresh;
                }
            }
        }
    }

    // -- Subscriptions --

    async fn open_subscriptions(&self) {
        for collection in Collection::ALL {
            let weak = Arc::downgrade(&self.inner);
            let closed = weak.clone();
            let handler = ChangeHandler::new(move |change: TableChange| {
                debug!("{:?} on {}, refreshing", change.kind, change.table);
                let weak = weak.clone();
                tokio::spawn(async move {
                    if let Some(store) = upgrade(&weak) {
                        store.refresh(collection).await;
                    }
                });
            })
            .on_close(move || {
                if let Some(store) = upgrade(&closed) {
                    warn!("Change channel for {} ended", collection.as_str());
                    store.notify(NoticeKind::RealtimeUnavailable {
                        collection: collection.as_str(),
                    });
                }
            });

            match self.inner.remote.subscribe(collection.table(), handler).await {
                Ok(subscription) => match self.inner.subscriptions.lock() {
                    Ok(mut subs) => subs.push(subscription),
                    Err(e) => error!("Subscription list poisoned: {}", e),
                },
                Err(e) => {
                    warn!("Could not subscribe to {}: {}", collection.as_str(), e);
                    self.notify(NoticeKind::RealtimeUnavailable {
                        collection: collection.as_str(),
                    });
                }
            }
        }
    }

    /// Number of change subscriptions currently open.
    pub fn active_subscriptions(&self) -> usize {
        self.inner
            .subscriptions
            .lock()
            .map(|subs| subs.iter().filter(|s| s.is_active()).count())
            .unwrap_or(0)
    }

    fn watch_identity(&self) {
        let Some(provider) = &self.inner.identity else {
            return;
        };
        let mut rx = provider.watch();
        // The current value was resolved by start()
        rx.borrow_and_update();

        let weak = Arc::downgrade(&self.inner);
        self.spawn_task(async move {
            while rx.changed().await.is_ok() {
                rx.borrow_and_update();
                let Some(store) = upgrade(&weak) else {
                    break;
                };
                store.resolve_current_session().await;
            }
        });
    }

    /// Schedule the delayed safety-net re-fetch that follows a confirmed pin
    /// write, in case the push channel misses it.
    pub(crate) fn schedule_fallback_refresh(&self, collections: &'static [Collection]) {
        let Some(delay) = self.inner.config.fallback_refresh else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        self.spawn_task(async move {
            tokio::time::sleep(delay).await;
            if let Some(store) = upgrade(&weak) {
                for collection in collections {
                    store.refresh(*collection).await;
                }
            }
        });
    }

    fn spawn_task<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(fut);
        match self.inner.tasks.lock() {
            Ok(mut tasks) => {
                tasks.retain(|t| !t.is_finished());
                tasks.push(handle);
            }
            Err(e) => error!("Task list poisoned: {}", e),
        }
    }

    // -- Notices --

    /// Receive every notice raised after this call.
    pub fn notices(&self) -> broadcast::Receiver<Notice> {
        self.inner.notices.subscribe()
    }

    pub(crate) fn notify(&self, kind: NoticeKind) {
        let notice = Notice::new(kind, self.inner.config.locale);
        debug!("Notice: {}", notice.title);
        let _ = self.inner.notices.send(notice);
    }

    /// Raise the configuration notice once per store.
    pub(crate) fn report_unconfigured(&self) {
        if !self.inner.unconfigured_reported.swap(true, Ordering::AcqRel) {
            warn!("No identity provider configured; sign-in disabled");
            self.notify(NoticeKind::IdentityUnconfigured);
        }
    }

    // -- Readers --

    pub async fn accounts(&self) -> Vec<Account> {
        self.inner.mirror.read().await.collections().accounts.clone()
    }

    pub async fn pins(&self) -> Vec<Pin> {
        self.inner.mirror.read().await.collections().pins.clone()
    }

    pub async fn avatars(&self) -> Vec<Avatar> {
        self.inner.mirror.read().await.collections().avatars.clone()
    }

    pub async fn snapshot(&self) -> Collections {
        self.inner.mirror.read().await.collections().clone()
    }

    pub async fn account(&self, id: Uuid) -> Option<Account> {
        self.inner.mirror.read().await.account(id).cloned()
    }

    /// Accounts by points, highest first; ties by name.
    pub async fn leaderboard(&self) -> Vec<Account> {
        let mut accounts = self.accounts().await;
        accounts.sort_by(|a, b| b.points.cmp(&a.points).then_with(|| a.name.cmp(&b.name)));
        accounts
    }

    pub async fn session_state(&self) -> SessionState {
        self.inner.session.read().await.clone()
    }

    /// The signed-in account as currently mirrored, including optimistic
    /// point changes.
    pub async fn current_account(&self) -> Option<Account> {
        let session = self.inner.session.read().await.account().cloned()?;
        let mirrored = self.inner.mirror.read().await.account(session.id).cloned();
        Some(mirrored.unwrap_or(session))
    }

    pub async fn is_admin(&self) -> bool {
        self.current_account().await.is_some_and(|a| a.is_admin())
    }

    pub(crate) async fn set_session(&self, state: SessionState) {
        *self.inner.session.write().await = state;
    }
}

fn upgrade(weak: &Weak<StoreInner>) -> Option<Store> {
    weak.upgrade().map(|inner| Store { inner })
}
