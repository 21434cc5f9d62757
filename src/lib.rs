//! # img-convert
//!
//! Converts uploaded raster images to WebP or AVIF, with optional responsive
//! variants and a size-optimization pass. Built to sit behind an upload
//! endpoint: every uploaded file goes in, one processed record comes out,
//! and anything that cannot or should not be converted passes through intact.
//!
//! # Architecture: Decide, Plan, Execute
//!
//! ```text
//! 1. Decide    upload + settings  →  Convert(primary job) | Skip(reason)
//! 2. Plan      metadata + table   →  breakpoint jobs (one per size × format)
//! 3. Execute   jobs               →  artifacts on disk, merged into one record
//! ```
//!
//! The first two stages are pure functions over image metadata and an
//! immutable settings snapshot, so nearly all policy is tested against a mock
//! codec without encoding a single pixel. Only the executor writes files.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`upload`] | Per-request entry point: fans jobs out, merges results into a [`upload::ProcessedUpload`] |
//! | [`pipeline`] | Decision, breakpoint planning and job execution |
//! | [`imaging`] | Codec boundary: the [`imaging::ImageBackend`] trait and its pure-Rust implementation |
//! | [`settings`] | Conversion settings: schema, validation, defaults, persistence |
//! | [`store`] | Namespaced key/value persistence behind the settings service |
//! | [`admin`] | Framework-free handlers for the `GET`/`PUT /settings` routes |
//! | [`config`] | Host configuration (`img-convert.toml`): store location, workers, breakpoints |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Settings Are a Snapshot
//!
//! A request reads the settings once and passes the resulting
//! [`settings::Settings`] value down to every job. An admin update racing with
//! an upload never produces a record half in the old settings and half in the
//! new ones.
//!
//! ## Failures Stay Local
//!
//! A broken breakpoint job is logged and recorded, and the upload carries on
//! without that variant. A broken primary job keeps the original file. The only
//! way an upload produces nothing is cancellation, which removes every artifact
//! written so far.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding, resampling (Lanczos3) and encoding go through the `image` crate,
//! `webp`, the `rav1e`-backed AVIF encoder and `rav1d` for AVIF decoding. No
//! system libraries, no external processes.

pub mod admin;
pub mod config;
pub mod imaging;
pub mod output;
pub mod pipeline;
pub mod settings;
pub mod store;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;
