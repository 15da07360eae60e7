#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::wildcard_imports)]

//! An mDNS (multicast DNS, RFC 6762) client library: issue
//! service-discovery queries over link-local multicast, collect
//! responses on every attached interface, cache what's learned, and
//! stream newly discovered records back to the caller.
//!
//! The entry point is [`query::QueryDriver`]; it is backed by a
//! single-owner cache actor reached through [`cache::CacheHandle`]
//! and one [`interface`] worker per interface a query fans out to.
//! [`wire`] is the RFC 1035/6762 message codec those workers encode
//! and decode with.

pub mod cache;
pub mod error;
pub mod events;
pub mod interface;
pub mod query;
pub mod settings;
pub mod wire;
