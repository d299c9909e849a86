//! Remote reached over the pinboard HTTP API, with changes pushed over its
//! realtime WebSocket.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pinboard_types::api::{
    AvatarSelection, DeletedCount, NewAccount, NewAvatar, NewInvite, NewPin, ReactionTally, RoleUpdate,
};
use pinboard_types::events::{RealtimeCommand, RealtimeEvent, Table};
use pinboard_types::models::{Account, Avatar, Invite, Pin, Role};

use super::{ChangeHandler, RemoteStore, Subscription};
use crate::config::RemoteConfig;
use crate::error::{RemoteError, RemoteResult};

const API_KEY_HEADER: &str = "apikey";

/// How long a new realtime channel may take to confirm before subscribing fails.
const READY_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpRemote {
    client: Client,
    base: Url,
    api_key: String,
}

impl HttpRemote {
    pub fn new(api_url: &str, api_key: impl Into<String>) -> RemoteResult<Self> {
        let base = Url::parse(api_url).map_err(|e| RemoteError::Transport(format!("bad API URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(RemoteError::Transport(format!("bad API URL: {}", api_url)));
        }
        Ok(Self {
            client: Client::new(),
            base,
            api_key: api_key.into(),
        })
    }

    pub fn from_config(cfg: &RemoteConfig) -> RemoteResult<Self> {
        Self::new(&cfg.api_url, cfg.api_key.clone())
    }

    /// Build `base/seg/seg...`, percent-encoding each segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client
            .request(method, self.url(segments))
            .header(API_KEY_HEADER, &self.api_key)
    }

    async fn send(&self, req: RequestBuilder, what: impl Into<String>) -> RemoteResult<Response> {
        let resp = req.send().await?;
        match resp.status() {
            s if s.is_success() => Ok(resp),
            StatusCode::NOT_FOUND => Err(RemoteError::NotFound(what.into())),
            s => {
                debug!("Remote rejected request with {}", s);
                Err(RemoteError::Rejected { status: s.as_u16() })
            }
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> RemoteResult<T> {
        let resp = self.send(self.request(Method::GET, segments), segments.join("/")).await?;
        Ok(resp.json().await?)
    }

    async fn send_json<B, T>(&self, method: Method, segments: &[&str], body: &B) -> RemoteResult<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let req = self.request(method, segments).json(body);
        let resp = self.send(req, segments.join("/")).await?;
        Ok(resp.json().await?)
    }

    async fn send_empty<B: Serialize + ?Sized>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<&B>,
    ) -> RemoteResult<()> {
        let mut req = self.request(method, segments);
        if let Some(body) = body {
            req = req.json(body);
        }
        self.send(req, segments.join("/")).await?;
        Ok(())
    }

    fn realtime_url(&self) -> RemoteResult<Url> {
        let mut url = self.url(&["realtime"]);
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        url.set_scheme(scheme)
            .map_err(|_| RemoteError::Transport(format!("cannot derive realtime URL from {}", self.base)))?;
        url.query_pairs_mut().append_pair(API_KEY_HEADER, &self.api_key);
        Ok(url)
    }
}

fn decode_event(text: &str) -> Option<RealtimeEvent> {
    serde_json::from_str(text)
        .map_err(|e| warn!("Unreadable realtime event: {}", e))
        .ok()
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn list_accounts(&self) -> RemoteResult<Vec<Account>> {
        self.get_json(&["accounts"]).await
    }

    async fn find_account_by_email(&self, email: &str) -> RemoteResult<Option<Account>> {
        match self.get_json(&["accounts", "by-email", email]).await {
            Ok(account) => Ok(Some(account)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert_account(&self, account: NewAccount) -> RemoteResult<Account> {
        self.send_json(Method::POST, &["accounts"], &account).await
    }

    async fn set_account_role(&self, id: Uuid, role: Role) -> RemoteResult<()> {
        let id = id.to_string();
        self.send_empty(Method::PATCH, &["accounts", &id, "role"], Some(&RoleUpdate { role }))
            .await
    }

    async fn set_account_avatar(&self, id: Uuid, selection: AvatarSelection) -> RemoteResult<()> {
        let id = id.to_string();
        self.send_empty(Method::PATCH, &["accounts", &id, "avatar"], Some(&selection))
            .await
    }

    async fn delete_pins_for_account(&self, id: Uuid) -> RemoteResult<usize> {
        let id = id.to_string();
        let req = self.request(Method::DELETE, &["accounts", &id, "pins"]);
        let count: DeletedCount = self.send(req, format!("account {}", id)).await?.json().await?;
        Ok(count.deleted)
    }

    async fn delete_account(&self, id: Uuid) -> RemoteResult<()> {
        let id = id.to_string();
        self.send_empty::<()>(Method::DELETE, &["accounts", &id], None).await
    }

    async fn list_pins(&self) -> RemoteResult<Vec<Pin>> {
        self.get_json(&["pins"]).await
    }

    async fn insert_pin(&self, pin: NewPin) -> RemoteResult<Pin> {
        self.send_json(Method::POST, &["pins"], &pin).await
    }

    async fn delete_pin(&self, id: Uuid) -> RemoteResult<()> {
        let id = id.to_string();
        self.send_empty::<()>(Method::DELETE, &["pins", &id], None).await
    }

    async fn add_pin_reaction(&self, id: Uuid) -> RemoteResult<u32> {
        let id = id.to_string();
        let req = self.request(Method::POST, &["pins", &id, "reactions"]);
        let tally: ReactionTally = self.send(req, format!("pin {}", id)).await?.json().await?;
        Ok(tally.reactions)
    }

    async fn list_avatars(&self) -> RemoteResult<Vec<Avatar>> {
        self.get_json(&["avatars"]).await
    }

    async fn insert_avatar(&self, avatar: NewAvatar) -> RemoteResult<Avatar> {
        self.send_json(Method::POST, &["avatars"], &avatar).await
    }

    async fn update_avatar(&self, avatar: Avatar) -> RemoteResult<Avatar> {
        let id = avatar.id.to_string();
        self.send_json(Method::PUT, &["avatars", &id], &avatar).await
    }

    async fn delete_avatar(&self, id: Uuid) -> RemoteResult<()> {
        let id = id.to_string();
        self.send_empty::<()>(Method::DELETE, &["avatars", &id], None).await
    }

    async fn list_invites(&self) -> RemoteResult<Vec<Invite>> {
        self.get_json(&["invites"]).await
    }

    async fn find_invite(&self, email: &str) -> RemoteResult<Option<Invite>> {
        match self.get_json(&["invites", email]).await {
            Ok(invite) => Ok(Some(invite)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn insert_invite(&self, email: &str) -> RemoteResult<Invite> {
        let body = NewInvite { email: email.to_string() };
        self.send_json(Method::POST, &["invites"], &body).await
    }

    async fn delete_invite(&self, email: &str) -> RemoteResult<()> {
        self.send_empty::<()>(Method::DELETE, &["invites", email], None).await
    }

    async fn subscribe(&self, table: Table, handler: ChangeHandler) -> RemoteResult<Subscription> {
        let url = self.realtime_url()?;
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut sink, mut stream) = stream.split();

        // The server confirms the connection before accepting commands
        let ready = tokio::time::timeout(READY_TIMEOUT, async {
            while let Some(msg) = stream.next().await {
                if let Message::Text(text) = msg? {
                    if let Some(RealtimeEvent::Ready { .. }) = decode_event(&text) {
                        return Ok::<(), RemoteError>(());
                    }
                }
            }
            Err(RemoteError::Transport("realtime channel closed before ready".into()))
        })
        .await
        .map_err(|_| RemoteError::Transport("realtime channel did not confirm in time".into()))?;
        ready?;

        let command = serde_json::to_string(&RealtimeCommand::Subscribe { tables: vec![table] })
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        sink.send(Message::text(command)).await?;
        info!("Realtime subscription to {} open", table);

        let task = tokio::spawn(async move {
            // Pong replies are queued by the reader and flushed through the shared stream
            let _sink = sink;
            while let Some(msg) = stream.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        if let Some(RealtimeEvent::Change(change)) = decode_event(&text) {
                            if change.table == table {
                                handler.changed(change);
                            }
                        }
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Realtime channel for {} failed: {}", table, e);
                        break;
                    }
                }
            }
            debug!("Realtime subscription to {} closed", table);
            handler.closed();
        });

        Ok(Subscription::new(table, task))
    }
}
