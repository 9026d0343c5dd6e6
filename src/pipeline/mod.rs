//! Pipeline stages for report composition.
//!
//! Each submodule implements one transformation step and is testable on its
//! own. Only [`capture`] and [`input`] are async; everything else is pure.
//!
//! ## Data Flow
//!
//! ```text
//! ingest ──▶ aggregate ──▶ capture ──┐
//!                         (chart)    │
//! images ────────────────────────────┼──▶ layout ──▶ render (crate::render)
//! text ──────────────────────────────┘             ▲
//!                               input ──▶ encode ──┘ (PDF images)
//! ```
//!
//! 1. [`ingest`]    — spreadsheet bytes → validated `TableData`
//! 2. [`aggregate`] — question columns → per-question response tallies
//! 3. [`chart`]     — tally → SVG → PNG via `resvg`
//! 4. [`capture`]   — sequential, settle-delayed rasterisation with
//!    per-chart failure isolation
//! 5. [`images`]    — bucketed photo store with contiguous ordinals
//! 6. [`text`]      — deterministic cleanup of user-entered free text
//! 7. [`layout`]    — item counts → fixed-capacity page descriptors
//! 8. [`input`]     — hosted image reference → bytes
//! 9. [`encode`]    — any raster → JPEG for PDF embedding

pub mod aggregate;
pub mod capture;
pub mod chart;
pub mod encode;
pub mod images;
pub mod ingest;
pub mod input;
pub mod layout;
pub mod text;
