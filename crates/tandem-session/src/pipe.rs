//! Connections to peer processes over a byte stream.
//!
//! [`StreamConnection`] speaks the request/reply protocol over any buffered
//! reader and writer pair. [`PipeConnection`] owns a child process and talks
//! to it over the child's stdin and stdout.
//!
//! # Panic-Free Guarantees
//!
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - A broken pipe surfaces as `TransportError`, never as a panic

use std::io::{BufRead, BufReader, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};

use tracing::{debug, info, warn};

use tandem_protocol::{PeerReply, PeerRequest, ProtocolVersion, RequestEnvelope};

use crate::connection::{Connection, ConnectionId, ConnectionKind};
use crate::error::TransportError;
use crate::frame::{read_message, write_message};

/// A remote connection over a reader/writer pair.
#[derive(Debug)]
pub struct StreamConnection<R, W> {
    id: ConnectionId,
    reader: R,
    writer: W,
    peer_version: ProtocolVersion,
}

impl<R: BufRead, W: Write> StreamConnection<R, W> {
    /// Performs the handshake and returns the ready connection.
    ///
    /// Sends `Hello` with the assigned id and expects `Welcome` back.
    ///
    /// # Errors
    ///
    /// - `TransportError::Rejected` if the peer refuses the handshake
    /// - `TransportError::VersionMismatch` if the peer's major version differs
    /// - `TransportError::UnexpectedMessage` for any other reply
    pub fn handshake(id: ConnectionId, mut reader: R, mut writer: W) -> Result<Self, TransportError> {
        write_message(
            &mut writer,
            &RequestEnvelope::new(PeerRequest::Hello {
                connection_id: id.get(),
            }),
        )?;

        match read_message::<PeerReply, _>(&mut reader)? {
            PeerReply::Welcome {
                protocol_version,
                connection_id,
            } if connection_id == id.get() => {
                ProtocolVersion::CURRENT.check(&protocol_version)?;
                debug!(id = %id, peer_version = %protocol_version, "Handshake completed");
                Ok(Self {
                    id,
                    reader,
                    writer,
                    peer_version: protocol_version,
                })
            }
            PeerReply::Rejected {
                reason,
                protocol_version,
            } => {
                warn!(id = %id, peer_version = %protocol_version, reason = %reason, "Handshake rejected");
                Err(TransportError::Rejected(reason))
            }
            other => Err(TransportError::UnexpectedMessage(format!("{other:?}"))),
        }
    }

    /// Protocol version the peer announced.
    pub fn peer_version(&self) -> ProtocolVersion {
        self.peer_version
    }
}

impl<R, W> Connection for StreamConnection<R, W>
where
    R: BufRead + Send,
    W: Write + Send,
{
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Remote
    }

    fn invoke(&mut self, request: PeerRequest) -> Result<PeerReply, TransportError> {
        let label = request.label();
        write_message(&mut self.writer, &RequestEnvelope::new(request))?;
        let reply = read_message(&mut self.reader)?;
        debug!(id = %self.id, request = label, "Reply received");
        Ok(reply)
    }
}

/// A peer running as a child process, reached over its stdin and stdout.
///
/// The child's stderr is inherited so its logs reach the controller's
/// terminal. Dropping the connection kills the child if it is still running.
#[derive(Debug)]
pub struct PipeConnection {
    child: Child,
    stream: StreamConnection<BufReader<ChildStdout>, ChildStdin>,
}

impl PipeConnection {
    /// Launches `command` with `args` and performs the handshake.
    ///
    /// # Errors
    ///
    /// `TransportError::Io` if the process cannot be started, or any
    /// handshake error from [`StreamConnection::handshake`].
    pub fn spawn(id: ConnectionId, command: &str, args: &[String]) -> Result<Self, TransportError> {
        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| TransportError::Io(format!("failed to start {command}: {e}")))?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                reap(&mut child);
                return Err(TransportError::Io(format!("{command} has no stdio pipes")));
            }
        };

        match StreamConnection::handshake(id, BufReader::new(stdout), stdin) {
            Ok(stream) => {
                info!(id = %id, command = %command, pid = child.id(), "Peer started");
                Ok(Self { child, stream })
            }
            Err(e) => {
                reap(&mut child);
                Err(e)
            }
        }
    }

    /// Process id of the peer.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

impl Connection for PipeConnection {
    fn id(&self) -> ConnectionId {
        self.stream.id()
    }

    fn kind(&self) -> ConnectionKind {
        ConnectionKind::Remote
    }

    fn invoke(&mut self, request: PeerRequest) -> Result<PeerReply, TransportError> {
        self.stream.invoke(request)
    }
}

impl Drop for PipeConnection {
    fn drop(&mut self) {
        if let Ok(None) = self.child.try_wait() {
            reap(&mut self.child);
        }
    }
}

fn reap(child: &mut Child) {
    if let Err(e) = child.kill() {
        debug!(pid = child.id(), error = %e, "Peer already exited");
    }
    match child.wait() {
        Ok(status) => debug!(pid = child.id(), status = %status, "Peer reaped"),
        Err(e) => debug!(pid = child.id(), error = %e, "Failed to reap peer"),
    }
}
