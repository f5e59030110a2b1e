//! The built-in connection handler used by `harbord`.
//!
//! Routing lives outside Harbor; the daemon only proves the listener is up
//! by answering every request with `204 No Content`.

use std::io::{self, Read, Write};
use std::time::Duration;

use harbor_server::{HandlerError, TcpConnection};

/// Response written for every request.
pub const NO_CONTENT_RESPONSE: &[u8] =
    b"HTTP/1.1 204 No Content\r\nConnection: close\r\nContent-Length: 0\r\n\r\n";

/// How long a client may take to send its request head.
pub const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

const MAX_HEAD_LEN: usize = 8 * 1024;

/// Reads until the blank line ending a request head, end of stream, or
/// 8 KiB, whichever comes first. Returns the number of bytes consumed.
pub fn read_request_head<R: Read>(reader: &mut R) -> io::Result<usize> {
    let mut head = Vec::with_capacity(512);
    let mut buf = [0u8; 512];

    while head.len() < MAX_HEAD_LEN {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            break;
        }
    }

    Ok(head.len())
}

/// Answers one request with [`NO_CONTENT_RESPONSE`].
pub fn no_content(conn: &mut TcpConnection) -> Result<(), HandlerError> {
    conn.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    respond(conn)
}

fn respond<C: Read + Write>(conn: &mut C) -> Result<(), HandlerError> {
    let consumed = read_request_head(conn)?;
    tracing::debug!(bytes = consumed, "request head read");
    conn.write_all(NO_CONTENT_RESPONSE)?;
    conn.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    /// Reads from a fixed request, records what is written.
    struct Duplex {
        input: Cursor<Vec<u8>>,
        output: Vec<u8>,
    }

    impl Duplex {
        fn new(request: &[u8]) -> Self {
            Self {
                input: Cursor::new(request.to_vec()),
                output: Vec::new(),
            }
        }
    }

    impl Read for Duplex {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.input.read(buf)
        }
    }

    impl Write for Duplex {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.output.write(buf)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_read_request_head() {
        let request = b"GET /status HTTP/1.1\r\nHost: device\r\n\r\n";
        let mut reader = Cursor::new(request.to_vec());
        assert_eq!(read_request_head(&mut reader).unwrap(), request.len());
    }

    #[test]
    fn test_read_request_head_eof() {
        let mut reader = Cursor::new(b"GET / HTTP/1.0\r\n".to_vec());
        assert_eq!(read_request_head(&mut reader).unwrap(), 16);

        let mut empty = Cursor::new(Vec::new());
        assert_eq!(read_request_head(&mut empty).unwrap(), 0);
    }

    #[test]
    fn test_read_request_head_is_bounded() {
        let mut reader = Cursor::new(vec![b'a'; 64 * 1024]);
        let consumed = read_request_head(&mut reader).unwrap();
        assert!(consumed >= MAX_HEAD_LEN);
        assert!(consumed < MAX_HEAD_LEN + 512);
    }

    #[test]
    fn test_respond_writes_no_content() {
        let mut conn = Duplex::new(b"POST /ir HTTP/1.1\r\nContent-Length: 0\r\n\r\n");
        respond(&mut conn).unwrap();
        assert_eq!(conn.output, NO_CONTENT_RESPONSE);
    }
}
