// src/ingest/providers/mod.rs
pub mod mapserver;
pub mod spc_rss;
