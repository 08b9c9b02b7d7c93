//! Contract pipeline dashboard back-end.
//!
//! ## Overview
//!
//! Contracts flow through six pipeline stages. The dashboard pulls
//! opportunities from Salesforce, keeps the editable status in a local
//! SQLite store (mirrored to Notion pages), spawns stage-specific tasks when
//! a contract moves, lists DocuSign envelopes, and compares contract
//! revisions into redlines.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │  (React) │ <─────── │    └─ api.rs  (route handlers, AppState)         │
//! └──────────┘          │         │                                        │
//!                       │         │ apply_status_change()                  │
//!                       │         v                                        │
//!                       │  notion.rs ──> db.rs <── templates.rs            │
//!                       │                  ^                               │
//!                       │  salesforce.rs ──┤  (TokenManager in oauth.rs)   │
//!                       │  docusign.rs ────┘                               │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module       | Responsibility                                           |
//! |--------------|----------------------------------------------------------|
//! | `models`     | Shared types: `Contract`, `PipelineStage`, `Task`, ...   |
//! | `db`         | SQLite access via `DbHandle` (thin `Arc<Mutex<_>>`)      |
//! | `stage_map`  | Salesforce stage name → pipeline stage lookup            |
//! | `contracts`  | Computed contract fields, filters and KPI summary        |
//! | `documents`  | Required-document checklist and completeness score       |
//! | `batch`      | Staged status edits and the sequential batch save        |
//! | `compare`    | Character diff, change stats, section grouping           |
//! | `export`     | Redline `.docx` rendering                                |
//! | `oauth`      | PKCE helpers and the cache → store → refresh resolver    |

pub mod api;
pub mod batch;
pub mod compare;
pub mod contracts;
pub mod db;
pub mod docusign;
pub mod documents;
pub mod export;
pub mod models;
pub mod notion;
pub mod oauth;
pub mod salesforce;
pub mod server;
pub mod stage_map;
pub mod templates;
