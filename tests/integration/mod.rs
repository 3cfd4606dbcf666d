//! Integration tests for the Dateline reconciliation service


mod cache_store;
mod cli_commands;
mod config_integration;
mod properties;
mod resolver_scenarios;
