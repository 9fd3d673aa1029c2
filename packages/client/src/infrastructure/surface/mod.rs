//! Render surface implementations.

pub mod inmemory;

pub use inmemory::InMemorySurface;
