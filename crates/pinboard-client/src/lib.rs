//! Client-side state for pinboard: a local mirror of the remote tables kept
//! fresh by push notifications, optimistic writes with rollback, and the
//! session resolver that maps an external identity onto an account.

pub mod config;
pub mod engine;
pub mod error;
pub mod identity;
pub mod mirror;
pub mod notice;
pub mod remote;
pub mod session;
pub mod store;

pub use config::{AccessMode, ClientConfig, Locale, StoreConfig};
pub use engine::MutationOutcome;
pub use error::{IdentityError, RemoteError, RemoteResult};
pub use identity::{IdentityProvider, Session, StaticIdentityProvider};
pub use mirror::{Collection, Collections};
pub use notice::{Notice, NoticeKind, NoticeLevel};
pub use remote::{EmbeddedRemote, HttpRemote, RemoteStore, Subscription};
pub use session::{AccessPolicy, InviteOnly, OpenAccess, SessionState};
pub use store::{Store, StoreBuilder};
