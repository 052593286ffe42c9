//! Statements and their positional parameters.

use super::Value;
use std::fmt;

/// Default number of parameter sets sent per driver batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// A statement plus positional parameters, bound left to right to `?`
/// placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub statement: String,
    pub params: Vec<Value>,
}

impl Command {
    pub fn new(statement: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            statement: statement.into(),
            params: normalize_params(params),
        }
    }

    /// A command without parameters.
    pub fn sql(statement: impl Into<String>) -> Self {
        Self::new(statement, Vec::new())
    }

    /// Append one positional parameter.
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.statement)?;
        if !self.params.is_empty() {
            write!(f, " {:?}", self.params)?;
        }
        Ok(())
    }
}

/// One statement executed against many prepared parameter sets.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchCommand {
    pub statement: String,
    pub params: Vec<Vec<Value>>,
}

impl BatchCommand {
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            params: Vec::new(),
        }
    }

    pub fn add(mut self, params: Vec<Value>) -> Self {
        self.params.push(normalize_params(params));
        self
    }
}

/// A batch whose parameter sets are produced lazily.
///
/// Sets are pulled from the iterator and flushed to the driver every
/// `batch_size` entries.
pub struct IteratorBatchCommand {
    pub statement: String,
    pub params: Box<dyn Iterator<Item = Vec<Value>> + Send>,
    pub batch_size: usize,
}

impl IteratorBatchCommand {
    pub fn new<I>(statement: impl Into<String>, params: I) -> Self
    where
        I: IntoIterator<Item = Vec<Value>>,
        I::IntoIter: Send + 'static,
    {
        Self {
            statement: statement.into(),
            params: Box::new(params.into_iter()),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    /// Override the flush size. Zero is treated as one.
    pub fn batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl fmt::Debug for IteratorBatchCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IteratorBatchCommand")
            .field("statement", &self.statement)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

/// Expand a sole list parameter into individual positional parameters.
///
/// `[List([a, b, c])]` becomes `[a, b, c]`; any other shape is returned
/// unchanged.
pub fn normalize_params(mut params: Vec<Value>) -> Vec<Value> {
    if params.len() == 1 && matches!(params[0], Value::List(_)) {
        if let Some(Value::List(items)) = params.pop() {
            return items;
        }
    }
    params
}

/// Trim a statement and drop one trailing `;`.
pub fn fix_sql(sql: &str) -> String {
    let trimmed = sql.trim();
    trimmed
        .strip_suffix(';')
        .map(str::trim_end)
        .unwrap_or(trimmed)
        .to_string()
}
