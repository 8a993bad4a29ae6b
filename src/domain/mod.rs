pub mod allocator;
pub mod blocks;
pub mod capacity;
pub mod error;
pub mod models;
pub mod roster;
