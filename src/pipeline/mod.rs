//! Pipeline stages for scan ingestion.
//!
//! Each submodule implements exactly one step. Every step that touches the
//! outside world does so through a narrow trait ([`prepare::ImageCodec`],
//! [`client::TranscriptionClient`], [`crop::BlobStore`],
//! [`schedule::Sleeper`], [`reindex::IdGenerator`]) so the whole pipeline
//! runs against in-memory fakes in tests.
//!
//! ## Data Flow
//!
//! ```text
//!            ┌────────────────────── per chunk of ≤3 pages ──────────────────────┐
//! pages ──▶ prepare ──▶ request ──▶ client ──▶ rescue ──▶ reindex ──▶ sections ──▶ crop
//!           (resize,    (prompt +   (HTTP)    (repair    (absolute               (per flagged
//!            JPEG)       schema)               JSON)      pages, ids)              question)
//! ```
//!
//! 1. [`prepare`]  — downsample and JPEG-encode a page for transmission
//! 2. [`schedule`] — partition pages into chunks, pace requests, turn chunk
//!    failures into placeholder sections
//! 3. [`request`]  — build the prompt + schema + images for one chunk
//! 4. [`client`]   — the only stage with network I/O
//! 5. [`rescue`]   — parse the response, closing truncated JSON
//! 6. [`reindex`]  — map chunk-local page indices back to absolute pages
//! 7. [`crop`]     — cut flagged diagrams out of the full-resolution pages

pub mod client;
pub mod crop;
pub mod prepare;
pub mod reindex;
pub mod request;
pub mod rescue;
pub mod schedule;
pub mod schema;
