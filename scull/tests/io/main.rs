//! Integration tests for the storage layer

mod store;
