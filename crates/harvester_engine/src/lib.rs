//! Harvester engine: token lifecycle, transport and the page worker pool.
mod auth;
mod harvest;
mod item_set;
mod persist;
mod retry;
mod shutdown;
mod token;
mod transport;
mod types;

pub use auth::{AuthProvider, Credentials, KeycloakProvider};
pub use harvest::{HarvestSettings, Harvester, Job, TokenSource};
pub use item_set::ItemSet;
pub use persist::{ensure_output_dir, write_rows, AtomicFileWriter, PersistError};
pub use retry::{retry_with_policy, RetryAction, RetryError, RetryPolicy};
pub use shutdown::ShutdownCoordinator;
pub use token::{TokenHandle, TokenManager, TokenSettings};
pub use transport::{ReqwestTransport, RetryingTransport, Transport, TransportSettings};
pub use types::{
    AuthError, HarvestError, HarvestReport, PageError, PageResponse, Token, TransportError,
    TransportFailure,
};
