//! NOS Boot Reason - persistent reset-reason beacon and crash log
//!
//! This crate records *why* the previous boot ended and keeps a small text
//! log in reserved memory that survives a warm reset, so that the next boot
//! stage (bootloader, ramdump tooling, field diagnostics) can read both back.
//!
//! # Architecture
//!
//! - **region**: named reserved regions, mapping attributes, bounded views
//! - **header**: the 64-byte persisted log header and its checksum
//! - **store**: the append-only text log with restart-on-overflow
//! - **magic**: reset-reason codes and the subsystem table
//! - **beacon**: the single-word reset-reason beacon and failure text slot
//! - **panic**: panic notifier chain integration
//! - **oops**: one-shot PC/LR capture with symbol lookup
//! - **context**: [`Diagnostics`], which owns all of the above
//! - **reader**: post-mortem decoding of a region image
//!
//! # Usage
//!
//! ```rust
//! use nos_bootreason::sim::{SimBoard, SimPanicChain};
//! use nos_bootreason::{brlog, install, Config, Diagnostics, LogStore, NoIrq, ResetMagic};
//!
//! static DIAG: spin::Once<Diagnostics> = spin::Once::new();
//!
//! let board = SimBoard::new();
//! let log = board.add("brlog_mem", 0x8000_0000, 4096);
//! LogStore::provision(&log).unwrap();
//! board.add("imem,reset_reason", 0x0c26_465c, 4);
//! board.add("imem,tz_reset_reason", 0x0c26_4660, 4);
//!
//! let chain = SimPanicChain::new();
//! let diag = install(&DIAG, &board, &chain, &Config::default(), NoIrq, None).unwrap();
//! brlog!(diag, "thermal zone {} tripped\n", 3).unwrap();
//! diag.set_magic(ResetMagic::THERMAL);
//! ```

#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod beacon;
pub mod config;
pub mod context;
pub mod error;
pub mod header;
pub mod magic;
pub mod oops;
pub mod panic;
pub mod reader;
pub mod region;
#[cfg(feature = "std")]
pub mod sim;
pub mod store;
pub mod sync;

pub use beacon::{Beacon, FailureSlot};
pub use config::Config;
pub use context::Diagnostics;
pub use error::{Error, Result};
pub use header::{checksum, LogHeader, HEADER_MAGIC, HEADER_SIZE};
pub use magic::{ResetMagic, RestartLevel};
pub use oops::{NoSymbols, Symbol, SymbolResolver, SymbolTable};
pub use panic::{NotifyResult, PanicChain, PanicEvent, PanicNotifier};
pub use reader::Snapshot;
pub use region::{MapAttributes, MappedRegion, PhysAddr, RegionDescriptor, RegionLimits, RegionProvider};
pub use store::{LineBuf, LogStore};
pub use sync::{IrqControl, IrqLock, NoIrq};

/// Format into the persistent log of a [`Diagnostics`] context
///
/// Evaluates to the `Result` of [`Diagnostics::append_fmt`].
#[macro_export]
macro_rules! brlog {
    ($diag:expr, $($arg:tt)*) => {
        $diag.append_fmt(::core::format_args!($($arg)*))
    };
}

/// Bring up the subsystem and publish it in `slot`
///
/// Maps every region, reports the boot reason passed on the command line
/// and registers the panic hook. A second call returns
/// [`Error::AlreadyInstalled`] without touching the regions again.
pub fn install<I, P, C>(
    slot: &'static spin::Once<Diagnostics<I>>,
    provider: &P,
    chain: &C,
    config: &Config,
    irq: I,
    cmdline: Option<&str>,
) -> Result<&'static Diagnostics<I>>
where
    I: IrqControl + Send + 'static,
    P: RegionProvider + ?Sized,
    C: PanicChain + ?Sized,
{
    if slot.is_completed() {
        return Err(Error::AlreadyInstalled);
    }

    let diag = Diagnostics::init(provider, config, irq)?;

    if let Some(reason) = cmdline.and_then(|line| config.boot_reason_token(line)) {
        log::info!(target: "bootreason", "previous boot reason: {}", reason);
    }

    let mut installed = false;
    let diag = slot.call_once(|| {
        installed = true;
        diag
    });
    if !installed {
        return Err(Error::AlreadyInstalled);
    }

    if let Err(err) = chain.register(diag) {
        log::error!(target: "bootreason", "failed to register panic hook: {}", err);
        return Err(Error::RegistrationFailed);
    }

    log::info!(target: "bootreason", "boot reason diagnostics installed");
    Ok(diag)
}
