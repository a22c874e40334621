//! # IntelliSphere
//!
//! A domain-scoped retrieval-augmented conversation engine.
//!
//! Documents for each knowledge domain (health, law, finance, ...) are
//! chunked, embedded and written to a per-domain vector index. At request
//! time the engine picks the domain's index, retrieves the chunks closest
//! to the question, merges them with the last few turns of the caller's
//! session and asks a language model for the answer. Conversations are
//! persisted per `(user, domain, session)`.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────┐   ┌──────────────┐
//! │  Sources  │──▶│     Indexer      │──▶│ index.vec    │
//! │ PDF/CSV/… │   │ chunk+dedup+embed│   │ index.json   │
//! └───────────┘   └──────────────────┘   └──────┬───────┘
//!                                               │
//!                        ┌──────────────────────┤ IndexRegistry (cache)
//!                        ▼                      │
//!                 ┌─────────────┐        ┌──────▼──────┐
//!  CLI / HTTP ───▶│  Responder  │◀──────▶│ Conversation│
//!                 │ prompt+LLM  │        │    Store    │
//!                 └─────────────┘        └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! isx init                            # create database
//! isx index all                       # build every domain index
//! isx search law "what is tort law"   # inspect retrieval
//! isx ask --user ana@example.com --domain law "what is tort law"
//! isx serve                           # start the HTTP API
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Typed errors at module seams |
//! | [`chunk`] | Boundary-aware overlapping chunker |
//! | [`loader`] | PDF / CSV / text loaders and source discovery |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | On-disk flat vector index |
//! | [`indexer`] | Index build pipeline |
//! | [`domain`] | Domain → index location map |
//! | [`registry`] | Loaded-index cache |
//! | [`store`] | Conversation persistence |
//! | [`users`] | User registration |
//! | [`prompt`] | Prompt assembly |
//! | [`generation`] | Text generation providers |
//! | [`responder`] | Retrieval-augmented answer pipeline |
//! | [`server`] | HTTP API |
//! | [`commands`] | CLI command implementations |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chunk;
pub mod commands;
pub mod config;
pub mod db;
pub mod domain;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod indexer;
pub mod loader;
pub mod migrate;
pub mod models;
pub mod prompt;
pub mod registry;
pub mod responder;
pub mod server;
pub mod store;
pub mod users;
pub mod vector_index;
