use thiserror::Error;
use tokio::sync::mpsc::error::SendError as MpscSendError;

use crate::rtp_parameters::{MediaKind, PayloadType, RtpCodecCapability};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// ErrUnknownType indicates an error with Unknown info.
    #[error("unknown")]
    ErrUnknownType,

    /// ErrRoomClosed indicates an operation executed after the room has
    /// already been closed.
    #[error("room closed")]
    ErrRoomClosed,

    /// ErrRoomNotJoined indicates an operation which requires a joined room.
    #[error("room not joined")]
    ErrRoomNotJoined,

    /// ErrRoomAlreadyJoined indicates join() was called while joining or joined.
    #[error("room already joining or joined")]
    ErrRoomAlreadyJoined,

    #[error("transport closed")]
    ErrTransportClosed,
    #[error("producer closed")]
    ErrProducerClosed,
    #[error("consumer closed")]
    ErrConsumerClosed,
    #[error("peer closed")]
    ErrPeerClosed,

    /// ErrCommandQueueClosed is delivered to every command that settles after
    /// its queue was closed, whether it ran or not.
    #[error("command queue closed")]
    ErrCommandQueueClosed,

    /// ErrCommandPanicked indicates the executor panicked while running a command.
    #[error("command execution panicked")]
    ErrCommandPanicked,

    #[error("producer already handled by a transport")]
    ErrProducerAlreadyHandled,
    #[error("consumer already handled by a transport")]
    ErrConsumerAlreadyHandled,
    #[error("not a sending transport")]
    ErrNotASendingTransport,
    #[error("not a receiving transport")]
    ErrNotAReceivingTransport,

    /// ErrSpyCannotProduce indicates a producer was requested by a spy peer.
    #[error("spy peers cannot produce")]
    ErrSpyCannotProduce,

    #[error("track ended")]
    ErrTrackEnded,

    /// ErrTrackKindMismatch indicates that the new track is of a different kind than the previous one.
    #[error("new track must be of the same kind as previous")]
    ErrTrackKindMismatch,

    /// ErrRequestTimeout indicates the remote router did not answer a request in time.
    #[error("request timeout")]
    ErrRequestTimeout,

    /// ErrRequestFailed carries the reason given by the remote router when it rejects a request.
    #[error("request failed: {0}")]
    ErrRequestFailed(String),

    /// ErrCannotSend indicates the negotiated capabilities have no codec of the given kind.
    #[error("cannot send {0}")]
    ErrCannotSend(MediaKind),

    /// ErrConsumerNotSupported indicates the local device cannot decode the consumer's codecs.
    #[error("unsupported codecs")]
    ErrConsumerNotSupported,

    /// ErrUnsupportedCodecs lists every mandatory room codec the local device cannot receive.
    #[error(
        "local device does not support mandatory room codecs: {}",
        codecs.iter().map(|c| c.mime_type.as_str()).collect::<Vec<_>>().join(", ")
    )]
    ErrUnsupportedCodecs { codecs: Vec<RtpCodecCapability> },

    /// ErrMandatoryCodecNotFound is a room configuration error: a mandatory
    /// payload type is not advertised by the room at all.
    #[error("mandatory codec PT {0} not found in remote codecs")]
    ErrMandatoryCodecNotFound(PayloadType),

    #[error("invalid transport direction: {0}")]
    ErrInvalidDirection(String),
    #[error("invalid media kind: {0}")]
    ErrInvalidKind(String),
    #[error("invalid consumer profile: {0}")]
    ErrInvalidProfile(String),

    /// ErrNotANotification indicates an inbound message without the
    /// notification flag set.
    #[error("not a notification")]
    ErrNotANotification,
    #[error("unknown notification method: {0}")]
    ErrUnknownNotification(String),
    #[error("transport not found: {0}")]
    ErrTransportNotFound(String),
    #[error("producer not found: {0}")]
    ErrProducerNotFound(String),
    #[error("peer not found: {0}")]
    ErrPeerNotFound(String),
    #[error("consumer not found: {0}")]
    ErrConsumerNotFound(String),
    #[error("peer already exists: {0}")]
    ErrPeerAlreadyExists(String),
    #[error("consumer already exists: {0}")]
    ErrConsumerAlreadyExists(String),

    #[error("RoomBuilder requires a device")]
    ErrNoDevice,
    #[error("RoomBuilder requires a message sender")]
    ErrNoMessageSender,

    #[error("mpsc send: {0}")]
    MpscSend(String),
    #[error("json: {0}")]
    Json(String),

    #[allow(non_camel_case_types)]
    #[error("{0}")]
    new(String),
}

impl Error {
    /// is_invalid_state reports errors caused by operating on a closed entity,
    /// a room in the wrong state or an entity in the wrong role.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            Error::ErrRoomClosed
                | Error::ErrRoomNotJoined
                | Error::ErrRoomAlreadyJoined
                | Error::ErrTransportClosed
                | Error::ErrProducerClosed
                | Error::ErrConsumerClosed
                | Error::ErrPeerClosed
                | Error::ErrCommandQueueClosed
                | Error::ErrProducerAlreadyHandled
                | Error::ErrConsumerAlreadyHandled
                | Error::ErrNotASendingTransport
                | Error::ErrNotAReceivingTransport
                | Error::ErrSpyCannotProduce
                | Error::ErrTrackEnded
        )
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ErrRequestTimeout)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Error::ErrUnsupportedCodecs { .. }
                | Error::ErrConsumerNotSupported
                | Error::ErrCannotSend(_)
        )
    }

    /// is_type_error reports malformed caller input.
    pub fn is_type_error(&self) -> bool {
        matches!(
            self,
            Error::ErrInvalidDirection(_)
                | Error::ErrInvalidKind(_)
                | Error::ErrInvalidProfile(_)
                | Error::ErrTrackKindMismatch
                | Error::ErrNotANotification
        )
    }
}

// Because Tokio SendError is parameterized, we sadly lose the backtrace.
impl<T> From<MpscSendError<T>> for Error {
    fn from(e: MpscSendError<T>) -> Self {
        Error::MpscSend(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}
