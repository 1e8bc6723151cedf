//! Subscription Engine - plan tiers, founder discounts, proration and quotas
//! for a multi-role marketplace.
//!
//! Layout follows ports and adapters:
//!
//! - `domain` - subscription aggregate, state machine, catalog, pricing rules
//! - `ports` - traits for persistence, founder allocation, payment gateway, events, clock
//! - `adapters` - in-memory, PostgreSQL and HTTP implementations
//! - `application` - command handlers and the [`SubscriptionEngine`] facade
//! - `config` / `telemetry` - environment configuration and tracing setup

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
pub mod telemetry;

pub use application::SubscriptionEngine;
