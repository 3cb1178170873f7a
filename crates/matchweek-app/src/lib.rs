// Library root: configuration, the league service and the console protocol,
// shared by the binary and the integration tests.

pub mod config;
pub mod protocol;
pub mod service;
