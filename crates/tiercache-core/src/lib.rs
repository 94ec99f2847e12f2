//! tiercache core
//!
//! This crate holds the pieces shared by the client and server coordinators:
//! the entry model, the memory tier, the HTTP cache protocol codec, per-call
//! directives, and the durable-tier persistence service.

pub mod codec;
pub mod config;
pub mod directive;
pub mod entry;
pub mod error;
pub mod memory;
pub mod persistence;
pub mod record;

pub use codec::{Operation, ResponseClass};
pub use config::KeyValSettings;
pub use directive::{
    MemoryCacheConfig, MemoryDirective, MemoryOptions, MemoryPolicy, PersistConfig,
    PersistDirective, PersistMode, PersistOverrides, PersistRequest, VerifyFn,
};
pub use entry::Entry;
pub use error::CoreError;
pub use memory::MemoryTier;
pub use persistence::PersistenceService;
pub use record::{RecordError, WriteRecord};
