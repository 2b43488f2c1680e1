//! Pipeline stages for page-level text transformation.
//!
//! Each submodule implements exactly one step and is testable on its own.
//!
//! ## Data Flow
//!
//! ```text
//! render ──▶ discover ──▶ dispatch ──▶ transform ──▶ aggregate
//! (pdfium)   (dir scan)   (N tasks)    (encode+call)  (write+report)
//! ```
//!
//! 1. [`render`]    optional producer: rasterise pages or extract their
//!    text into `{id}-page-{n}.{ext}` files; runs in `spawn_blocking`
//! 2. [`discover`]  list a directory, match one document's artifacts and
//!    order them by page number
//! 3. [`dispatch`]  run one task per page with at most N in flight,
//!    isolating panics
//! 4. [`transform`] prepare the artifact ([`encode`]) and call the
//!    transform service with a fixed-delay retry budget
//! 5. [`aggregate`] write successful pages and build the report

pub mod aggregate;
pub mod discover;
pub mod dispatch;
pub mod encode;
pub mod render;
pub mod transform;
