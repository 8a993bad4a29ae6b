pub mod bootstrap;
pub mod registry;
pub mod scheduling;
