//! TCP transport.
//!
//! Each connection gets its own reader thread, which decodes messages off the
//! socket and hands them to the connection's inbox. Writes happen on the caller's
//! thread.
use std::io::{self, Write};
use std::net::{self, TcpStream};
use std::thread;
use std::time;

use log::*;

use lightsync_common::bitcoin::consensus::encode::{self, Decodable};
use lightsync_common::bitcoin::network::message::RawNetworkMessage;
use lightsync_common::message::Message;
use lightsync_common::network::Network;
use lightsync_net::{Connection, Inbox, PeerId, Transport};

use crate::wire::Codec;

/// Stack size for spawned threads, in bytes.
/// Since we're creating a thread per peer, we want to keep the stack size small.
const THREAD_STACK_SIZE: usize = 1024 * 1024;

/// Default time to wait for a connection to be established.
pub const DEFAULT_CONNECT_TIMEOUT: time::Duration = time::Duration::from_secs(6);
/// Default time a connection may stay silent before it is dropped. Must be
/// longer than the interval at which peers are pinged.
pub const DEFAULT_READ_TIMEOUT: time::Duration = time::Duration::from_secs(3 * 60);

/// Transport over plain TCP sockets.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    network: Network,
    timeout: time::Duration,
    read_timeout: time::Duration,
}

impl TcpTransport {
    /// Create a new transport for the given network.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            timeout: DEFAULT_CONNECT_TIMEOUT,
            read_timeout: DEFAULT_READ_TIMEOUT,
        }
    }

    /// Set the connect and write timeout.
    pub fn timeout(mut self, timeout: time::Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the time a connection may stay silent before it is dropped.
    pub fn read_timeout(mut self, timeout: time::Duration) -> Self {
        self.read_timeout = timeout;
        self
    }
}

impl Transport<Message> for TcpTransport {
    type Connection = TcpConnection;

    fn connect(&self, addr: &PeerId, inbox: Inbox<Message>) -> io::Result<TcpConnection> {
        debug!(target: "net", "{}: Connecting..", addr);

        let stream = TcpStream::connect_timeout(addr, self.timeout)?;

        stream.set_nodelay(true)?;
        stream.set_write_timeout(Some(self.timeout))?;
        stream.set_read_timeout(Some(self.read_timeout))?;

        let local = stream.local_addr()?;
        let codec = Codec::new(self.network, local, *addr);
        let reader = {
            let stream = stream.try_clone()?;
            let codec = codec.clone();

            thread::Builder::new()
                .name(format!("{}", addr))
                .stack_size(THREAD_STACK_SIZE)
                .spawn(move || read(stream, codec, inbox))?
        };
        debug!(target: "net", "{}: Connected (local address {})", addr, local);

        Ok(TcpConnection {
            addr: *addr,
            stream,
            codec,
            reader: Some(reader),
        })
    }
}

/// A TCP connection.
#[derive(Debug)]
pub struct TcpConnection {
    addr: PeerId,
    stream: TcpStream,
    codec: Codec,
    /// Reader thread. `None` once closed.
    reader: Option<thread::JoinHandle<()>>,
}

impl Connection<Message> for TcpConnection {
    fn send(&mut self, msg: Message) -> Result<(), lightsync_net::Error> {
        if self.reader.is_none() {
            return Err(lightsync_net::Error::Closed);
        }
        let cmd = msg.cmd();
        let Some(bytes) = self.codec.encode(msg) else {
            debug!(target: "net", "{}: Not sending unsupported `{}` message", self.addr, cmd);
            return Ok(());
        };
        trace!(target: "net", "{}: Sending `{}` ({} bytes)", self.addr, cmd, bytes.len());

        if let Err(err) = self.stream.write_all(&bytes) {
            // Wake up the reader, which reports the disconnection.
            self.stream.shutdown(net::Shutdown::Both).ok();

            return Err(err.into());
        }
        Ok(())
    }

    fn close(&mut self) {
        if let Some(reader) = self.reader.take() {
            self.stream.shutdown(net::Shutdown::Both).ok();

            if reader.join().is_err() {
                error!(target: "net", "{}: Reader thread panicked", self.addr);
            }
        }
    }
}

impl Drop for TcpConnection {
    fn drop(&mut self) {
        self.close();
    }
}

fn read(stream: TcpStream, codec: Codec, inbox: Inbox<Message>) {
    let addr = inbox.addr();
    let mut reader = io::BufReader::new(stream);

    loop {
        let raw = match RawNetworkMessage::consensus_decode(&mut reader) {
            Ok(raw) => raw,
            Err(encode::Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                debug!(target: "net", "{}: Remote closed the connection", addr);

                return inbox.disconnected(None);
            }
            Err(encode::Error::Io(err))
                if matches!(
                    err.kind(),
                    io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
                ) =>
            {
                debug!(target: "net", "{}: Connection timed out", addr);

                return inbox.disconnected(Some(io::ErrorKind::TimedOut.into()));
            }
            Err(encode::Error::Io(err)) => return inbox.disconnected(Some(err)),
            Err(err) => {
                return inbox.disconnected(Some(io::Error::new(
                    io::ErrorKind::InvalidData,
                    err.to_string(),
                )))
            }
        };
        let cmd = raw.cmd();

        match codec.decode(raw) {
            Ok(Some(msg)) => {
                if inbox.received(msg).is_err() {
                    // Nobody is listening anymore.
                    return;
                }
            }
            Ok(None) => {
                trace!(target: "net", "{}: Ignoring `{}` message", addr, cmd);
            }
            Err(err) => {
                warn!(target: "net", "{}: Invalid `{}` message: {}", addr, cmd, err);

                return inbox.disconnected(Some(io::Error::new(
                    io::ErrorKind::InvalidData,
                    err.to_string(),
                )));
            }
        }
    }
}
