//! Harvester core: pure query planning and the token-renewal state machine.
mod effect;
mod msg;
mod pagination;
mod query;
mod split;
mod state;
mod update;

pub use effect::{RenewalEffect, RenewalTrigger};
pub use msg::RenewalMsg;
pub use pagination::{OffsetPagination, PaginationError};
pub use query::{PaginationScheme, SetupError, SourceKind, SourceQuery};
pub use split::{is_date_filtered, split_by_date, DateRangeJob, SplitError};
pub use state::{RenewalSettings, RenewalState, TokenLifetime};
pub use update::update;
