//! Instantly SuperSearch adapter: free preview counts, billable enrichment
//! submission and enrichment status, behind the `leadloop-core` traits.

pub mod client;

pub use client::SuperSearchClient;
