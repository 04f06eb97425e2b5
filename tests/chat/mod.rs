//! Chat core tests, one module per area.

mod loader_tests;
mod match_tests;
mod message_tests;
mod pagination_tests;
mod report_tests;
