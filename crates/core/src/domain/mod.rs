pub mod appointment;
pub mod message;
pub mod schedule;
pub mod session;
pub mod tenant;
