//! Image codec access.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Decode** | `image` crate |
//! | **Encode → WebP** | `webp` crate, lossy, configured quality |
//!
//! The module is split into:
//! - **Parameters**: what to encode ([`Quality`], [`EncodeParams`])
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Convert**: [`ImageEncoder`], the idempotent, dry-run aware conversion step

pub mod backend;
pub mod convert;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use convert::{ConvertError, ConvertStatus, Conversion, ImageEncoder, destination_path};
pub use params::{EncodeParams, Quality};
pub use rust_backend::RustBackend;
