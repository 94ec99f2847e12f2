//! In-process memory tier

mod tier;

pub use tier::MemoryTier;
