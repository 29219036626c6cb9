//! Error taxonomy for the scanner core.
//!
//! Every core API returns an explicit [`Result`]; nothing in this crate
//! halts the device on failure. The variants map to the recovery policy
//! the caller is expected to apply:
//!
//! | Variant | Class | Recovery |
//! |---------|-------|----------|
//! | [`Error::ResourceExhausted`] | timer pool full | reject the triggering request, back off |
//! | [`Error::QueueFull`] | event ring full | reportable fault, surfaced in the status report |
//! | [`Error::Busy`] | operation already in flight | retry at the next completion boundary |
//! | [`Error::Unsupported`] | hardware capability rejected a setting | pick a supported value |
//! | [`Error::NotInitialized`] | sensor session not configured | call `initialize` and retry |
//! | [`Error::Exhausted`] | sensor retry budget spent | session invalidated, scan aborted |
//! | [`Error::Protocol`] | malformed host input | drop the command, resynchronize the stream |
//!
//! Genuine programming-contract violations use `debug_assert!` and are
//! compiled out of release builds.

use thiserror::Error;

/// Convenience result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Top-level error type for all core operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Error {
    /// The fixed timer pool has no free slot.
    #[error("timer pool exhausted")]
    ResourceExhausted,

    /// The event ring buffer has no room for another item.
    #[error("event queue full")]
    QueueFull,

    /// The target resource already has an operation outstanding.
    #[error("operation already in progress")]
    Busy,

    /// The underlying hardware capability rejected the requested setting.
    #[error("unsupported by hardware capability")]
    Unsupported,

    /// The sensor session is not initialized.
    #[error("sensor session not initialized")]
    NotInitialized,

    /// The sensor retry budget was spent without a successful trigger.
    #[error("sensor retry budget exhausted")]
    Exhausted,

    /// Malformed input from the host stream.
    #[error("protocol fault: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Faults raised while decoding host input.
///
/// These never abort a scan: the offending bytes are dropped and the
/// stream is resynchronized by the transport (see
/// [`protocol::resync`](crate::protocol::resync)).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ProtocolError {
    /// Header tag or length field did not decode.
    #[error("malformed frame header")]
    BadHeader,

    /// Command name or binary command id is not recognized.
    #[error("unknown command")]
    UnknownCommand,

    /// A command argument failed to parse or was out of range.
    #[error("bad command argument")]
    BadArgument,

    /// The payload ended before the fixed-layout record was complete.
    #[error("truncated payload")]
    Truncated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_error_converts() {
        let e: Error = ProtocolError::BadHeader.into();
        assert_eq!(e, Error::Protocol(ProtocolError::BadHeader));
    }

    #[cfg(feature = "std")]
    #[test]
    fn errors_display() {
        assert_eq!(
            format!("{}", Error::ResourceExhausted),
            "timer pool exhausted"
        );
        assert_eq!(
            format!("{}", Error::Protocol(ProtocolError::Truncated)),
            "protocol fault: truncated payload"
        );
    }
}
