//! Block and stream codecs.
//!
//! A stream is a `u32` value count, a `u32` block size, the full blocks,
//! and a tail: remainders of at most [`LITERAL_TAIL_MAX`] values are spelled
//! out as big-endian `i32` literals, anything longer becomes one more block.
//!
//! Each block carries a packed `k_byte` (index-mode flag and both outlier
//! counts), the block minimum, the run table, and then, depending on the
//! [`Layout`], either three separately packed value planes or a single
//! interleaved bit stream in original position order. The two layouts share
//! every header field but order them differently and are not interoperable;
//! a deployment picks one and uses it on both ends.
//!
//! ## Safety checks
//!
//! The decoder validates everything it later relies on: the frame's block
//! size against the `k_byte` field limits, field widths, outlier counts
//! against the collapsed length, the run table against the block length,
//! and the frame's total count against an allocation cap.
//! Reads past the end of input surface as [`DecodeError::TruncatedInput`].

pub(crate) mod decoder;
pub(crate) mod encoder;

/// Largest permitted block size; the packed `k_byte` field gives the low
/// outlier count only 15 bits.
pub const MAX_BLOCK_SIZE: u32 = 32_767;

/// Longest stream remainder emitted as raw `i32` literals instead of a
/// tail block.
pub const LITERAL_TAIL_MAX: usize = 3;

/// Cap on the bytes a decoded frame may claim to need (1 GiB).
pub(crate) const DECODE_ALLOC_LIMIT: u64 = 1 << 30;

/// How a block lays out its side data and value payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layout {
    /// Three separately packed value planes (normals, then low outliers,
    /// then high outliers), each padded by the word-tail discipline.
    Planar,
    /// One bit stream holding every value in original position order, each
    /// field sized by its class.
    Interleaved,
}

/// Reasons an encode call rejects its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    /// A block's value span does not fit the delta range.
    #[error(transparent)]
    SpanOverflow(#[from] crate::delta::SpanError),

    /// Block size outside `1..=MAX_BLOCK_SIZE`.
    #[error("block size {0} outside 1..={MAX_BLOCK_SIZE}")]
    BlockSizeOutOfRange(u32),

    /// More values than the frame's 32-bit count field can describe.
    #[error("input of {0} values exceeds the frame's length field")]
    InputTooLong(usize),

    /// More collapsed runs than the one-byte run table can describe.
    #[error("run table needs {0} entries; at most 255 fit")]
    RunTableOverflow(usize),
}

/// Errors surfaced by encoding. The output buffer contents are undefined
/// after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    /// The output slice is too small for the encoded stream.
    #[error("insufficient output buffer: {0}")]
    InsufficientOutputBuffer(#[from] crate::bits::WriteError),

    /// The input violates an encoder precondition.
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InputError),
}

/// Ways a decoded header can be internally inconsistent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    /// A field width byte outside `1..=32`.
    #[error("field width {0} outside 1..=32")]
    WidthOutOfRange(u8),

    /// The frame's block size is zero.
    #[error("zero block size")]
    ZeroBlockSize,

    /// The frame's block size exceeds what the `k_byte` fields can carry.
    #[error("block size {0} outside 1..={MAX_BLOCK_SIZE}")]
    BlockSizeOutOfRange(u32),

    /// The frame claims more data than the decoder will allocate.
    #[error("frame of {0} values exceeds the allocation cap")]
    FrameTooLarge(u64),

    /// The run table has an odd entry count.
    #[error("run table holds {0} values; entries come in pairs")]
    OddRunTable(usize),

    /// A run starts past the block or has a zero length.
    #[error("run ({start}, {len}) does not fit a block of {block_len}")]
    RunOutOfRange { start: u32, len: u32, block_len: usize },

    /// Run starts must strictly increase.
    #[error("run table starts are not strictly increasing")]
    UnorderedRuns,

    /// The run table collapses the block to nothing.
    #[error("run table leaves no collapsed values")]
    EmptyCollapse,

    /// More outliers than collapsed values.
    #[error("{outliers} outliers exceed the {collapsed} collapsed values")]
    OutlierOverflow { outliers: usize, collapsed: usize },

    /// Side data disagrees with the outlier counts.
    #[error("outlier side data is inconsistent with the header counts")]
    SideDataMismatch,

    /// The block did not expand to the length the frame promised.
    #[error("block expanded to {got} values; the frame promised {expected}")]
    LengthMismatch { got: usize, expected: usize },
}

/// Errors surfaced by decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The input ended before the stream was complete.
    #[error("truncated input: {0}")]
    TruncatedInput(#[from] crate::bits::ReadError),

    /// A header field is out of range or inconsistent with its block.
    #[error("corrupt header: {0}")]
    CorruptHeader(#[from] HeaderError),
}
