//! Integration tests: the desk wired end to end against in-memory fakes.

mod fake_transport;
mod scenarios;
