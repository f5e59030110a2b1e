//! Connection handler capability.
//!
//! The supervisor is given one [`ConnectionHandler`] at construction and
//! calls it once per accepted connection, on a pool worker thread. Plain
//! closures work as handlers:
//!
//! ```rust
//! use harbor_server::{ConnectionHandler, HandlerError};
//! use std::io::Write;
//!
//! let handler = |conn: &mut Vec<u8>| -> Result<(), HandlerError> {
//!     conn.write_all(b"hello")?;
//!     Ok(())
//! };
//!
//! let mut buf = Vec::new();
//! handler.handle(&mut buf).unwrap();
//! assert_eq!(buf, b"hello");
//! ```

use std::io;

use thiserror::Error;

/// Error returned by a connection handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Reading from or writing to the connection failed.
    #[error("connection I/O error: {0}")]
    Io(#[from] io::Error),

    /// The handler rejected the request.
    #[error("handler error: {0}")]
    Custom(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wraps any error as a handler failure.
    pub fn custom(err: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::Custom(err.into())
    }
}

/// Handles one accepted connection.
///
/// The connection is borrowed; the supervisor releases it after `handle`
/// returns, errs or panics.
pub trait ConnectionHandler<C>: Send + Sync + 'static {
    /// Serves `conn` to completion.
    fn handle(&self, conn: &mut C) -> Result<(), HandlerError>;
}

impl<C, F> ConnectionHandler<C> for F
where
    F: Fn(&mut C) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, conn: &mut C) -> Result<(), HandlerError> {
        self(conn)
    }
}
