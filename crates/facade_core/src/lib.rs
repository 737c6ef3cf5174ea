//! Entity access façade over a persistence session.
//!
//! The façade (`EntityFacade`) exposes lookup, find-or-create, removal,
//! save/flush, validation and query composition for one entity type while the
//! session (`Session`) owns identity resolution and durability.

pub mod config;
pub mod db;
pub mod error;
pub mod facade;
pub mod logging;
pub mod model;
pub mod query;
pub mod session;
pub mod store;
pub mod validation;

pub use config::{ConfigError, FacadeConfig, FlushPolicy};
pub use error::{FacadeError, FacadeResult};
pub use facade::{EntityFacade, FindOrCreateInput, OnMissing, QueryWorker, Target};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::entity::{Entity, EntityError, EntityId, EntityMetadata, PropertyMap, ID_FIELD};
pub use query::{Comparison, Filter, QueryBuilder, SortDirection};
pub use session::{Managed, Session, SessionError, SessionResult, UnitOfWorkSession};
pub use store::memory::MemoryStore;
pub use store::sqlite::SqliteStore;
pub use store::{DocumentStore, StoreError};
pub use validation::{Rule, RuleSet};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
