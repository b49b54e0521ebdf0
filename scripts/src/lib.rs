//! An idempotent, dependency-ordered deployment orchestrator for the margin
//! trading protocol's contracts.
//!
//! Deploy tasks form a static dependency graph. The planner orders a target's
//! dependency closure, the executor deploys whatever the address book does not
//! yet record, and the registrar wires deployed contracts to the dependency
//! controller. Rerunning a deploy converges on the same state without sending
//! redundant transactions.

#![deny(missing_docs)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod actions;
pub mod address_book;
pub mod artifacts;
pub mod catalog;
pub mod cli;
pub mod client;
mod commands;
pub mod config;
pub mod constants;
pub mod errors;
pub mod executor;
pub mod planner;
pub mod registrar;
mod solidity;
pub mod types;
