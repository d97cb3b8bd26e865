//! # LeapLogic RAG
//!
//! Retrieval-augmented question answering over a local document collection.
//!
//! Files under a knowledge directory are chunked, embedded, and stored in
//! SQLite with each embedding kept as a little-endian `f32` blob. Questions
//! are embedded the same way, matched against stored chunks by cosine
//! similarity, and answered by a chat model conditioned on the best chunks.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌─────────────┐   ┌──────────┐
//! │  Knowledge  │──▶│  Pipeline   │──▶│  SQLite  │
//! │  directory  │   │ Chunk+Embed │   │ BLOB vec │
//! └─────────────┘   └─────────────┘   └────┬─────┘
//!                                          │
//!                      ┌───────────────────┤
//!                      ▼                   ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 │  (rag)   │       │  (axum)  │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! rag init                      # create database
//! rag ingest                    # index the knowledge directory
//! rag ask "What is S3?"         # answer on the command line
//! rag serve                     # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`codec`] | Embedding blob encoding |
//! | [`connector_fs`] | Knowledge directory scanning |
//! | [`chunk`] | Text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`llm`] | Chat backends and prompt rendering |
//! | [`store`] | SQLite vector store |
//! | [`search`] | Similarity ranking |
//! | [`ingest`] | Knowledge base rebuild |
//! | [`engine`] | Question answering |
//! | [`error`] | Engine error types |
//! | [`server`] | HTTP API |
//! | [`companion`] | Hello server |
//! | [`diagnose`] | Embedding self-check |
//! | [`stats`] | Statistics report |
//! | [`logging`] | Tracing setup |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod codec;
pub mod companion;
pub mod config;
pub mod connector_fs;
pub mod db;
pub mod diagnose;
pub mod embedding;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod search;
pub mod server;
pub mod stats;
pub mod store;
