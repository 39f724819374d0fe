//! # photo-ingest
//!
//! Turns raw photos dropped into a website's public asset tree into
//! delivery-ready WebP files, records every asset's dimensions and face focus
//! point in a JSON manifest, and moves the originals out of the public tree.
//!
//! # Architecture: One Sequential Pass
//!
//! ```text
//! public/photos/IMG_0001.JPG
//!   │  detect face  →  focus (0.41, 0.33) keyed as /photos/img-0001.webp
//!   │  convert      →  public/photos/img-0001.webp
//!   │  merge        →  public/assets.json
//!   └  archive      →  originals/photos/IMG_0001.JPG
//! ```
//!
//! Stages run one after another, one file at a time, and each one is
//! idempotent: running again after an interruption finishes the job. A safety
//! gate stops the run before anything is written if face detection failed on
//! too many photos. See [`pipeline`] for the full sequence.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Filename → URL-safe slug |
//! | [`scan`] | Recursive discovery of raw and encoded files |
//! | [`imaging`] | Codec backend trait, WebP conversion with skip-if-present |
//! | [`faces`] | Face detector trait, rustface backend, failure isolation |
//! | [`focus`] | Focus points and the manifest key they will belong to |
//! | [`manifest`] | Manifest load/merge/persist and the missing-file lifecycle |
//! | [`archive`] | Moves processed originals to the archive tree |
//! | [`pipeline`] | Orchestration, dry run, safety gate, run report |
//! | [`config`] | `photo-ingest.toml` loading and validation |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`output`] | CLI progress and summary formatting |
//!
//! # Design Decisions
//!
//! ## Hand Edits Win
//!
//! An encoded file that already exists is never re-encoded, and a focus point
//! already stored in the manifest is never replaced by a fresh detection.
//! Both may have been tuned by hand.
//!
//! ## Capabilities Are Passed In
//!
//! The codec ([`imaging::ImageBackend`]) and the face detector
//! ([`faces::FaceDetector`]) are trait objects built once per run and handed
//! to [`pipeline::run_with`]. Configuration is a plain value passed the same
//! way. Tests swap in recording mocks; nothing lives in global state.
//!
//! ## No System Dependencies
//!
//! Decoding uses the `image` crate and face detection the pure-Rust
//! `rustface` port of SeetaFace. Lossy WebP goes through `webp`, which builds
//! libwebp from source. The only file needed at runtime is the face model.

pub mod archive;
pub mod config;
pub mod faces;
pub mod focus;
pub mod imaging;
pub mod logging;
pub mod manifest;
pub mod naming;
pub mod output;
pub mod pipeline;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_helpers;
