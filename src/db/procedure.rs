//! Stored procedure parameter introspection and call preparation.

use crate::db::driver::Connection;
use crate::error::{DaoError, DaoResult};
use crate::models::{ProcedureColumn, SpParam, SpParamType, Value};
use tracing::debug;

/// A prepared procedure or function invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct CallableStatement {
    /// Procedure name as given by the caller, possibly schema-qualified.
    pub name: String,
    pub params: Vec<SpParam>,
    /// Function calls yield a return value ahead of the OUT values.
    pub function: bool,
}

impl CallableStatement {
    /// Portable call text: `{call NAME(?,?)}`, or `{? = call NAME(?)}` for functions.
    pub fn call_text(&self) -> String {
        let placeholders = vec!["?"; self.params.len()].join(",");
        if self.function {
            format!("{{? = call {}({})}}", self.name, placeholders)
        } else {
            format!("{{call {}({})}}", self.name, placeholders)
        }
    }

    /// Values bound as inputs: `(position, value)` for IN and IN_OUT slots
    /// with a non-null value. Positions are 1-based.
    pub fn bound_inputs(&self) -> impl Iterator<Item = (usize, &Value)> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction.is_input() && !p.value.is_null())
            .map(|(i, p)| (i + 1, &p.value))
    }

    /// Registered output slots in declared order, with their 1-based position.
    pub fn output_slots(&self) -> impl Iterator<Item = (usize, &SpParam)> {
        self.params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.direction.is_output())
            .map(|(i, p)| (i + 1, p))
    }

    /// Number of values a successful call yields.
    pub fn result_len(&self) -> usize {
        usize::from(self.function) + self.output_slots().count()
    }
}

/// Split `schema.name` into its parts. Only the last dot separates.
pub fn split_qualified_name(name: &str) -> (Option<&str>, &str) {
    match name.rsplit_once('.') {
        Some((schema, proc_name)) if !schema.is_empty() => (Some(schema), proc_name),
        _ => (None, name),
    }
}

/// Build the parameter list for a call from the procedure's metadata.
///
/// Metadata rows are walked in declared order. IN and IN_OUT slots consume
/// the next caller value; OUT slots consume none. Rows describing a return
/// value or a result column do not take part in the parameter list.
pub fn create_sp_params(
    name: &str,
    values: &[Value],
    connection: &mut dyn Connection,
) -> DaoResult<Vec<SpParam>> {
    let (schema, proc_name) = split_qualified_name(name);
    let schema = match schema {
        Some(schema) => Some(schema.to_string()),
        None => connection.current_schema()?,
    };

    let mut columns = connection.procedure_columns(schema.as_deref(), proc_name)?;
    columns.sort_by_key(|c| c.sequence);

    debug!(
        procedure = %name,
        schema = ?schema,
        declared = columns.len(),
        supplied = values.len(),
        "Resolved procedure parameters"
    );

    build_sp_params(name, &columns, values)
}

/// Pair metadata rows with caller values. Rows must already be in declared order.
pub fn build_sp_params(
    name: &str,
    columns: &[ProcedureColumn],
    values: &[Value],
) -> DaoResult<Vec<SpParam>> {
    let declared: Vec<&ProcedureColumn> = columns
        .iter()
        .filter(|c| {
            c.column_type != SpParamType::CODE_RETURN && c.column_type != SpParamType::CODE_RESULT
        })
        .collect();

    if declared.is_empty() && !values.is_empty() {
        return Err(DaoError::configuration(format!(
            "Procedure '{name}' not found or declares no parameters, \
             but {} value(s) were supplied",
            values.len()
        )));
    }

    let mut remaining = values.iter();
    let mut params = Vec::with_capacity(declared.len());
    for column in declared {
        let direction = SpParamType::from_code(column.column_type).ok_or_else(|| {
            DaoError::configuration(format!(
                "Unknown parameter direction {} for '{}' of procedure '{name}'",
                column.column_type,
                column.name.as_deref().unwrap_or("?")
            ))
        })?;

        let value = if direction.is_input() {
            remaining.next().cloned().ok_or_else(|| {
                DaoError::invalid_input(format!(
                    "Procedure '{name}' expects more input values than the {} supplied",
                    values.len()
                ))
            })?
        } else {
            Value::Null
        };

        let mut param = SpParam::new(direction, column.data_type, value)
            .with_type_name(column.type_name.clone());
        if let Some(param_name) = &column.name {
            param = param.named(param_name.clone());
        }
        params.push(param);
    }

    Ok(params)
}

/// Assemble the call for `params`.
pub fn create_callable_statement(
    name: &str,
    params: Vec<SpParam>,
    function: bool,
) -> CallableStatement {
    CallableStatement {
        name: name.to_string(),
        params,
        function,
    }
}
