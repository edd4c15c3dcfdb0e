//! HTTP handlers for classmoji-relay

pub mod fanout;

pub use fanout::fan_out;
