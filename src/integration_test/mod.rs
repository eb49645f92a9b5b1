//! Scenarios spanning several components: nodes talking over TCP and many requests racing
//! their timeouts.

mod network_test;
mod test_utils;
