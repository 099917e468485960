//! Bridge from `tracing` to the log store
//!
//! [`PersistLayer`] picks up every event the host emits and queues it on a
//! [`CaptureWriter`]; a single background task drains the queue into
//! [`crate::LogBook::save`] in emission order. Emitting an event never waits
//! on storage.
//!
//! ```ignore
//! let writer = CaptureWriter::spawn(book.clone());
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(PersistLayer::new(writer))
//!     .init();
//! tracing::warn!(tag = "billing", "invoice {} rejected", id);
//! ```

pub mod layer;
pub mod writer;

pub use layer::PersistLayer;
pub use writer::CaptureWriter;
