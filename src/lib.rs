//! foodome - a FooDB/HMDB crawler that cross-links food compounds with
//! human metabolome records
//!
//! The FooDB catalog is crawled first and populates the compound, class and
//! food tables; the HMDB catalog is then reconciled against it, attaching
//! metabolite identities, biospecimen links and concentration observations
//! to the compounds the first pass produced.

pub mod cache;
pub mod config;
pub mod crawl;
pub mod error;
pub mod ingest;
pub mod parse;
pub mod store;
pub mod xml;
