use std::{
    io::{self, ErrorKind, Read},
    net::{SocketAddr, TcpListener, TcpStream},
    sync::Arc,
    thread,
    time::Duration,
};

use tracing::{error, info, warn};

use crate::{diagnostics::Result, session::Crawlspace};

pub const DEFAULT_PORT: u16 = 2222;

const INITIAL_BACKOFF: Duration = Duration::from_millis(5);
const MAX_BACKOFF: Duration = Duration::from_secs(1);

const ASCII_EOT: u8 = 0x04;

impl Crawlspace {
    /// Binds `localhost:port` and serves sessions on it.
    pub fn listen_and_serve(self: &Arc<Self>, port: u16) -> Result<()> {
        let listener = TcpListener::bind(("localhost", port))?;
        self.serve(listener)
    }

    /// Accepts connections forever, one session thread per client. Anyone who
    /// can reach the listener gets full access to the registrations.
    pub fn serve(self: &Arc<Self>, listener: TcpListener) -> Result<()> {
        info!(address = %listener.local_addr()?, "crawlspace listening");
        let mut delay = Duration::ZERO;
        loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    delay = Duration::ZERO;
                    let crawlspace = Arc::clone(self);
                    thread::spawn(move || crawlspace.handle(stream, peer));
                }
                Err(err) if is_transient(&err) => {
                    delay = next_backoff(delay);
                    warn!(error = %err, ?delay, "accept failed, retrying");
                    thread::sleep(delay);
                }
                Err(err) => {
                    error!(error = %err, "accept failed");
                    return Err(err.into());
                }
            }
        }
    }

    fn handle(&self, stream: TcpStream, peer: SocketAddr) {
        info!(%peer, "session opened");
        let reader = match stream.try_clone() {
            Ok(reader) => reader,
            Err(err) => {
                warn!(%peer, error = %err, "could not split connection");
                return;
            }
        };
        match self.interact(EotTranslate::new(reader), stream) {
            Ok(()) => info!(%peer, "session closed"),
            Err(err) => warn!(%peer, error = %err, "session ended with error"),
        }
    }
}

fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset
            | ErrorKind::Interrupted
            | ErrorKind::WouldBlock
            | ErrorKind::TimedOut
    )
}

fn next_backoff(delay: Duration) -> Duration {
    if delay.is_zero() {
        INITIAL_BACKOFF
    } else {
        (delay * 2).min(MAX_BACKOFF)
    }
}

/// Treats an EOT byte (Ctrl-D from a raw terminal client) at the end of a
/// read as end of input.
pub struct EotTranslate<R> {
    inner: R,
    finished: bool,
}

impl<R: Read> EotTranslate<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            finished: false,
        }
    }
}

impl<R: Read> Read for EotTranslate<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.finished {
            return Ok(0);
        }
        let n = self.inner.read(buf)?;
        if n > 0 && buf[n - 1] == ASCII_EOT {
            self.finished = true;
            return Ok(n - 1);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn backoff_doubles_up_to_a_second() {
        let mut delay = Duration::ZERO;
        let mut seen = Vec::new();
        for _ in 0..10 {
            delay = next_backoff(delay);
            seen.push(delay.as_millis());
        }
        assert_eq!(seen, [5, 10, 20, 40, 80, 160, 320, 640, 1000, 1000]);
    }

    #[test]
    fn serves_a_session_per_connection() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let address = listener.local_addr().unwrap();
        let crawlspace = Arc::new(Crawlspace::new());
        thread::spawn(move || crawlspace.serve(listener));

        for _ in 0..2 {
            let mut client = TcpStream::connect(address).unwrap();
            client.write_all(b"1 == 1\n\x04").unwrap();
            let mut transcript = String::new();
            client.read_to_string(&mut transcript).unwrap();
            assert_eq!(
                transcript,
                "crawlspace registrations:\nprint, quit, repr\n> true\n> "
            );
        }
    }

    #[test]
    fn trailing_eot_ends_the_stream() {
        let mut reader = EotTranslate::new(&b"print(1)\n\x04"[..]);
        let mut text = String::new();
        reader.read_to_string(&mut text).unwrap();
        assert_eq!(text, "print(1)\n");
    }
}
