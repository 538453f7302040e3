//! Server-side sessions for axum.
//!
//! Session values live in a [`store::Collection`], the client only carries a
//! signed (and optionally encrypted) token holding the record id.

pub mod codec;
pub mod config;
pub mod session;
pub mod store;
pub mod transport;

pub(crate) mod utils;

pub use codec::{CodecError, KeyPair, KeyRing};
pub use session::{
    Session, SessionError, SessionId, SessionOptions, SessionStore, SessionStoreBuilder,
    SessionValues,
};
pub use store::{Collection, MemCollection, RecordStore, SessionRecord};
pub use transport::{CookieTransport, HeaderTransport, TokenSink, TokenTransport};
pub use utils::{Clock, ManualClock, SystemClock};

pub use cookie_monster::SameSite;
