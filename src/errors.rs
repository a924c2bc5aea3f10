//! Error kinds for `triecore`, per §7 of the specification. `FatalInvariantViolation` is
//! deliberately **not** a variant here — per §7's policy it's a programmer error and is
//! reported via `panic!`/`debug_assert!`, not a `Result`.

use alloc::string::{String, ToString};
use derive_more::{Display, From};

/// Errors produced while decoding an RLP-encoded [crate::node::Node].
#[derive(Debug, Display, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// The outer RLP item was a byte string where a list was expected, or vice versa.
    #[display("expected {expected}, found {found}")]
    UnexpectedShape {
        /// What the decoder expected ("list" or "string").
        expected: &'static str,
        /// What it actually found.
        found: &'static str,
    },
    /// A branch/leaf/extension list did not have one of the two valid lengths (17, or 2).
    #[display("unexpected node list length: {0}")]
    UnexpectedLength(usize),
    /// A byte string exceeded the 32-byte bound required for a hash or embedded slot.
    #[display("field exceeded 32 bytes: {0}")]
    FieldTooLarge(usize),
    /// An embedded child's terminal marker (`0x0F`) was missing or malformed.
    #[display("missing or malformed embedded-node terminator")]
    MissingEmbeddedTerminator,
    /// A byte after the embedded terminator was non-zero.
    #[display("non-zero byte after embedded-node terminator")]
    NonZeroTrailingByte,
    /// The account payload was not itself a well-formed 4-element RLP list.
    #[display("malformed account payload: {0}")]
    MalformedAccount(&'static str),
    /// The compact path's high nibble carried neither a leaf nor an extension flag.
    #[display("invalid compact path flag nibble: {0:#x}")]
    InvalidCompactPathFlag(u8),
    /// Trailing bytes remained after decoding a complete item.
    #[display("trailing bytes after decoded item")]
    TrailingBytes,
    /// The input was empty where at least one byte was required.
    #[display("unexpected end of input")]
    UnexpectedEof,
    /// A length prefix was non-canonical (e.g. a multi-byte length that could have fit
    /// in the short form).
    #[display("non-canonical RLP length encoding")]
    NonCanonicalLength,
}

impl core::error::Error for DecodeError {}

/// Wraps an error reported by the external `NodeSource`/node manager. The inner message
/// is whatever `ToString` the source's own error type produced (§6: "Errors from the
/// source are surfaced and stop the current operation").
#[derive(Debug, Display, Clone, PartialEq, Eq)]
#[display("node source error: {0}")]
pub struct SourceError(pub String);

impl SourceError {
    /// Builds a [SourceError] from any error implementing [`ToString`].
    pub fn from_display<E: ToString>(err: E) -> Self {
        Self(err.to_string())
    }
}

impl core::error::Error for SourceError {}

/// Top-level error for hashing and general trie-reading operations.
#[derive(Debug, Display, Clone, PartialEq, Eq, From)]
pub enum TrieError {
    /// Propagated decode failure.
    #[display("{_0}")]
    Decode(DecodeError),
    /// Propagated node-source failure.
    #[display("{_0}")]
    Source(SourceError),
    /// A cancellation token tripped mid-traversal.
    #[display("operation canceled")]
    Cancelled,
}

impl core::error::Error for TrieError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        match self {
            Self::Decode(e) => Some(e),
            Self::Source(e) => Some(e),
            Self::Cancelled => None,
        }
    }
}

/// Error for the diff engine. Diffing never produces a "proof incomplete" style soft
/// failure — both sides are assumed fully resolvable — so it only wraps [TrieError].
#[derive(Debug, Display, Clone, PartialEq, Eq, From)]
#[display("{_0}")]
pub struct DiffError(pub TrieError);

impl core::error::Error for DiffError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// Error for witness-proof creation. Lookups against an already-built [crate::witness::Proof]
/// never return this type — per §7, `ProofIncomplete`/`InvalidProof` are reported as
/// `complete = false` / `is_valid() == false`, not as errors.
#[derive(Debug, Display, Clone, PartialEq, Eq, From)]
#[display("{_0}")]
pub struct WitnessError(pub TrieError);

impl core::error::Error for WitnessError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        Some(&self.0)
    }
}

/// A [Result] alias for decode operations.
pub type DecodeResult<T> = Result<T, DecodeError>;
/// A [Result] alias for general trie operations.
pub type TrieResult<T> = Result<T, TrieError>;
/// A [Result] alias for diff operations.
pub type DiffResult<T> = Result<T, DiffError>;
/// A [Result] alias for witness-proof creation.
pub type WitnessResult<T> = Result<T, WitnessError>;
