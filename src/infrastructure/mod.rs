pub mod booking_calendar;
pub mod config;
pub mod error;
pub mod event_mapper;
pub mod schedule_block_store;
pub mod storage;
pub mod telemetry;
