//! Session handling for incoming build requests
//!
//! This module handles:
//! - Running one request/response cycle per connection
//! - Reporting the terminal status line
//! - Serving a single connection or many, depending on configuration

mod connection;
mod dispatcher;

pub use connection::ConnectionHandler;
pub use dispatcher::Dispatcher;
