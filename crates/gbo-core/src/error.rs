use thiserror::Error;

/// Fatal conditions surfaced by the emulation core.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("ROM image is {len} bytes, smaller than one 16 KiB bank")]
    RomTooSmall { len: usize },
    #[error("illegal opcode {opcode:#04X} executed at {pc:#06X}")]
    IllegalOpcode { opcode: u8, pc: u16 },
    #[error("save state rejected: {0}")]
    SaveState(#[from] SaveStateError),
    #[error("audio output unavailable: {0}")]
    Audio(#[from] ResampleError),
    #[error("host I/O: {0}")]
    Storage(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SaveStateError {
    #[error("unsupported save state version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
    #[error("save state was captured from \"{found}\", but \"{expected}\" is loaded")]
    CartridgeMismatch { expected: String, found: String },
    #[error("save state field `{field}` holds {found} bytes, expected {expected}")]
    Length {
        field: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("malformed save state: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResampleError {
    #[error("invalid resampler settings: rates and channel count must be positive")]
    InvalidSettings,
    #[error("buffer of {len} samples is not a multiple of {channels} channels")]
    IncorrectSampleLength { len: usize, channels: usize },
}
