//! The peer side of a stream connection.
//!
//! A peer process runs [`serve`] over its stdin and stdout:
//! - Expects `Hello` first and answers `Welcome` or `Rejected`
//! - Applies each following request to the local registry
//! - Writes exactly one reply line per request
//! - Stops on `Shutdown` or end of input
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - Malformed requests are answered with an error reply, not dropped

use std::io::{BufRead, Write};

use tracing::{debug, info, warn};

use tandem_core::SettingsHandle;
use tandem_protocol::{ErrorKind, PeerReply, PeerRequest, ProtocolVersion, RequestEnvelope};

use crate::dispatch::Dispatcher;
use crate::error::TransportError;
use crate::frame::{read_message, write_message};

/// What a finished serve loop did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServeSummary {
    /// Connection number assigned in the handshake.
    pub connection_id: u32,
    /// Requests answered after the handshake, including `Shutdown`.
    pub requests: usize,
    /// True if the loop ended on `Shutdown` rather than end of input.
    pub shutdown: bool,
}

/// Serves requests against `settings` until `Shutdown` or end of input.
///
/// # Errors
///
/// - `TransportError::VersionMismatch` if the controller speaks another
///   major version (after replying `Rejected`)
/// - `TransportError::UnexpectedMessage` if the first request is not `Hello`
/// - `TransportError::Eof` if input ends before the handshake
/// - I/O errors on either stream
pub fn serve<R, W>(reader: R, writer: W, settings: SettingsHandle) -> Result<ServeSummary, TransportError>
where
    R: BufRead,
    W: Write,
{
    serve_with(reader, writer, &Dispatcher::new(settings))
}

/// Like [`serve`], with a caller-supplied dispatcher.
pub fn serve_with<R, W>(
    mut reader: R,
    mut writer: W,
    dispatcher: &Dispatcher,
) -> Result<ServeSummary, TransportError>
where
    R: BufRead,
    W: Write,
{
    let connection_id = handshake(&mut reader, &mut writer, dispatcher)?;
    info!(connection_id, "Peer handshake completed");

    let mut summary = ServeSummary {
        connection_id,
        requests: 0,
        shutdown: false,
    };

    loop {
        let envelope = match read_message::<RequestEnvelope, _>(&mut reader) {
            Ok(envelope) => envelope,
            Err(TransportError::Eof) => {
                debug!(connection_id, "Controller closed the stream");
                break;
            }
            Err(TransportError::ParseError(e)) => {
                warn!(connection_id, error = %e, "Malformed request");
                write_message(&mut writer, &PeerReply::error(ErrorKind::Protocol, e))?;
                continue;
            }
            Err(e) => return Err(e),
        };

        summary.requests += 1;
        let (reply, stop) = respond(envelope, dispatcher);
        write_message(&mut writer, &reply)?;
        if stop {
            summary.shutdown = true;
            break;
        }
    }

    info!(
        connection_id,
        requests = summary.requests,
        shutdown = summary.shutdown,
        "Peer stopped serving"
    );
    Ok(summary)
}

fn handshake<R, W>(reader: &mut R, writer: &mut W, dispatcher: &Dispatcher) -> Result<u32, TransportError>
where
    R: BufRead,
    W: Write,
{
    let envelope = read_message::<RequestEnvelope, _>(reader)?;

    let controller_version = envelope.protocol_version;
    if !controller_version.is_compatible_with(&ProtocolVersion::CURRENT) {
        warn!(
            controller_version = %controller_version,
            peer_version = %ProtocolVersion::CURRENT,
            "Protocol version mismatch"
        );
        write_message(
            writer,
            &PeerReply::rejected(&format!(
                "Protocol version {} not compatible with peer version {}",
                controller_version,
                ProtocolVersion::CURRENT
            )),
        )?;
        return Err(TransportError::VersionMismatch {
            local: ProtocolVersion::CURRENT,
            peer: controller_version,
        });
    }

    match envelope.request {
        PeerRequest::Hello { connection_id } => {
            let reply = dispatcher.dispatch(PeerRequest::Hello { connection_id });
            write_message(writer, &reply)?;
            Ok(connection_id)
        }
        other => {
            write_message(
                writer,
                &PeerReply::error(ErrorKind::Protocol, "Expected hello for handshake"),
            )?;
            Err(TransportError::UnexpectedMessage(format!("{other:?}")))
        }
    }
}

/// Returns the reply and whether the loop should stop.
fn respond(envelope: RequestEnvelope, dispatcher: &Dispatcher) -> (PeerReply, bool) {
    if !envelope
        .protocol_version
        .is_compatible_with(&ProtocolVersion::CURRENT)
    {
        let message = format!(
            "Protocol version {} not compatible with peer version {}",
            envelope.protocol_version,
            ProtocolVersion::CURRENT
        );
        return (PeerReply::error(ErrorKind::Protocol, message), false);
    }

    match envelope.request {
        PeerRequest::Hello { .. } => (
            PeerReply::error(ErrorKind::Protocol, "Already connected"),
            false,
        ),
        PeerRequest::Shutdown => (dispatcher.dispatch(PeerRequest::Shutdown), true),
        request => (dispatcher.dispatch(request), false),
    }
}
