pub mod capture;
pub mod config;
pub mod connect;
pub mod error;
pub mod logbook;
pub mod record;
pub mod rotation;
pub mod store;
pub mod trace;

pub use capture::{CaptureWriter, PersistLayer};
pub use connect::open_store;
pub use error::{Result, StoreError};
pub use logbook::LogBook;
pub use record::{Color, LogPage, LogRecord, NewLog};
pub use rotation::Limits;

use config::LoggingConfig;
use tracing_subscriber::layer::Layered;
use tracing_subscriber::{fmt, prelude::*, reload, EnvFilter, Registry};

type PersistSlot = reload::Handle<Option<PersistLayer>, Layered<EnvFilter, Registry>>;

/// Returned by [`init_tracing`]; attaches persistence once a store is open
#[derive(Clone)]
pub struct TracingHandle {
    persist: PersistSlot,
}

impl TracingHandle {
    /// Start persisting this process's own events through `writer`
    ///
    /// Returns false when the subscriber from [`init_tracing`] was never
    /// installed or is gone.
    pub fn attach_capture(&self, writer: CaptureWriter) -> bool {
        match self.persist.reload(Some(PersistLayer::new(writer))) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("Warning: Failed to attach log capture: {}", e);
                false
            }
        }
    }
}

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides `cfg.level`. Console output goes to stderr so that
/// command output on stdout stays machine-readable. Persistence of the
/// process's own events starts later, through
/// [`TracingHandle::attach_capture`], so that events logged while the store
/// is being opened still reach the console.
///
/// Can only take effect once per process.
pub fn init_tracing(cfg: &LoggingConfig) -> TracingHandle {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&cfg.level));
    let (persist, slot) = reload::Layer::new(None::<PersistLayer>);

    let registry = tracing_subscriber::registry().with(filter).with(persist);
    let result = if cfg.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .try_init()
    } else {
        registry
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("Warning: Failed to initialize tracing: {}", e);
    }

    TracingHandle { persist: slot }
}
