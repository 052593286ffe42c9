//! Lazy row streaming over an open cursor.

use crate::db::driver::{ConnectionHandle, ConnectionProvider, Cursor};
use crate::error::DaoResult;
use crate::models::Row;
use std::sync::Arc;
use tracing::debug;

/// Step applied to every row before it is yielded.
pub type RowPreprocessor = Box<dyn FnMut(&mut Row) + Send>;

/// Forward-only, single-pass sequence of rows.
///
/// The iterator owns the release of its connection: [`RowIterator::close`]
/// (or dropping the iterator) closes the cursor and then gives an owned
/// connection back to its provider. Once the cursor reports an error the
/// iterator yields nothing further.
pub struct RowIterator {
    cursor: Option<Box<dyn Cursor>>,
    handle: ConnectionHandle,
    owns_connection: bool,
    provider: Arc<dyn ConnectionProvider>,
    preprocessor: Option<RowPreprocessor>,
    yielded: u64,
    closed: bool,
}

impl RowIterator {
    pub(crate) fn new(
        cursor: Box<dyn Cursor>,
        handle: ConnectionHandle,
        owns_connection: bool,
        provider: Arc<dyn ConnectionProvider>,
        preprocessor: Option<RowPreprocessor>,
    ) -> Self {
        Self {
            cursor: Some(cursor),
            handle,
            owns_connection,
            provider,
            preprocessor,
            yielded: 0,
            closed: false,
        }
    }

    /// Close the cursor and release the connection. Idempotent.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.cursor = None;
        if self.owns_connection {
            if let Some(conn) = self.handle.take() {
                self.provider.release(conn);
            }
        }
        debug!(
            connection = self.handle.id(),
            rows = self.yielded,
            "Row iterator closed"
        );
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Id of the connection the cursor runs on.
    pub fn connection_id(&self) -> u64 {
        self.handle.id()
    }
}

impl Iterator for RowIterator {
    type Item = DaoResult<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        let cursor = self.cursor.as_mut()?;
        match cursor.next_row() {
            Ok(Some(mut row)) => {
                if let Some(preprocess) = self.preprocessor.as_mut() {
                    preprocess(&mut row);
                }
                self.yielded += 1;
                Some(Ok(row))
            }
            Ok(None) => {
                self.cursor = None;
                None
            }
            Err(e) => {
                self.cursor = None;
                Some(Err(e))
            }
        }
    }
}

impl Drop for RowIterator {
    fn drop(&mut self) {
        self.close();
    }
}
