//! Stored procedure parameter descriptions.

use super::Value;
use serde::Serialize;

/// Direction of one procedure parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SpParamType {
    In,
    Out,
    InOut,
}

impl SpParamType {
    pub const CODE_IN: i32 = 1;
    pub const CODE_IN_OUT: i32 = 2;
    pub const CODE_RESULT: i32 = 3;
    pub const CODE_OUT: i32 = 4;
    pub const CODE_RETURN: i32 = 5;

    /// Map a metadata direction code to a direction.
    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            Self::CODE_IN => Some(Self::In),
            Self::CODE_IN_OUT => Some(Self::InOut),
            Self::CODE_OUT => Some(Self::Out),
            _ => None,
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            Self::In => Self::CODE_IN,
            Self::InOut => Self::CODE_IN_OUT,
            Self::Out => Self::CODE_OUT,
        }
    }

    /// IN and IN_OUT slots take a caller value.
    pub fn is_input(&self) -> bool {
        matches!(self, Self::In | Self::InOut)
    }

    /// OUT and IN_OUT slots produce a value after the call.
    pub fn is_output(&self) -> bool {
        matches!(self, Self::Out | Self::InOut)
    }
}

/// One row of procedure parameter metadata, as reported by the driver.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcedureColumn {
    pub name: Option<String>,
    /// Direction code: 1 IN, 2 IN_OUT, 3 result column, 4 OUT, 5 return value.
    pub column_type: i32,
    /// Driver type code of the parameter.
    pub data_type: i32,
    /// Declared database type name, e.g. `integer` or `varchar`.
    pub type_name: Option<String>,
    /// 1-based declared position.
    pub sequence: i32,
}

/// A bound procedure parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpParam {
    pub name: Option<String>,
    pub direction: SpParamType,
    pub sql_type: i32,
    pub type_name: Option<String>,
    /// Always `Null` for OUT parameters.
    pub value: Value,
}

impl SpParam {
    pub fn new(direction: SpParamType, sql_type: i32, value: Value) -> Self {
        let value = if direction == SpParamType::Out {
            Value::Null
        } else {
            value
        };
        Self {
            name: None,
            direction,
            sql_type,
            type_name: None,
            value,
        }
    }

    pub fn input(value: impl Into<Value>) -> Self {
        Self::new(SpParamType::In, 0, value.into())
    }

    pub fn output(sql_type: i32) -> Self {
        Self::new(SpParamType::Out, sql_type, Value::Null)
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into()).filter(|n: &String| !n.is_empty());
        self
    }

    pub fn with_type_name(mut self, type_name: Option<String>) -> Self {
        self.type_name = type_name;
        self
    }
}
