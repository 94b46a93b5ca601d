//! Fixed-size pool of authenticated HTTP sessions
//!
//! Every listing request borrows one session, uses its bearer credential, and
//! hands it back. A background manager periodically refreshes all
//! credentials, and it only ever touches sessions that are provably idle.
//!
//! Session lifecycle:
//! 1. Pool is built once with N sessions, each already holding a credential
//! 2. Callers `acquire`/`checkout` a session, send requests, release it
//! 3. Refresh cycle closes the gate, waits until all N are idle, takes them
//! 4. Each session's credential is replaced; sessions go back; gate reopens
//! 5. A refresh that cannot complete is fatal: the gate stays closed and the
//!    owner is signalled once

pub mod error;
pub mod pool;
pub mod refresh;
pub mod session;

pub use error::{Error, Result};
pub use pool::{Gate, PooledSession, SessionPool};
pub use refresh::{
    AuthLifecycleManager, CredentialSource, RefreshFuture, RefreshHandle, RefreshPhase,
    RefreshSchedule,
};
pub use session::Session;
