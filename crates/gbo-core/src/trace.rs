//! Feature-gated trace macros. Each expands to `log::trace!` when its cargo
//! feature is enabled and to nothing otherwise.

#[cfg(feature = "cpu-trace")]
macro_rules! cpu_trace {
    ($($arg:tt)*) => { log::trace!(target: "gbo::cpu", $($arg)*) };
}

#[cfg(not(feature = "cpu-trace"))]
macro_rules! cpu_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "ppu-trace")]
macro_rules! ppu_trace {
    ($($arg:tt)*) => { log::trace!(target: "gbo::ppu", $($arg)*) };
}

#[cfg(not(feature = "ppu-trace"))]
macro_rules! ppu_trace {
    ($($arg:tt)*) => {};
}

#[cfg(feature = "apu-trace")]
macro_rules! apu_trace {
    ($($arg:tt)*) => { log::trace!(target: "gbo::apu", $($arg)*) };
}

#[cfg(not(feature = "apu-trace"))]
macro_rules! apu_trace {
    ($($arg:tt)*) => {};
}
