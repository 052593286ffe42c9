//! Registration-time binding descriptions for typed row mapping.
//!
//! A target type describes once how named columns land in its fields by
//! implementing [`Bindable`]. The description is built on first use and
//! cached by the [`TypeConverter`](crate::db::convert::TypeConverter), so no
//! per-row introspection happens.
//!
//! ```
//! use hydro_dao::db::binding::{Bindable, BindingBuilder};
//!
//! #[derive(Default)]
//! struct User {
//!     id: i64,
//!     user_name: String,
//!     active: bool,
//! }
//!
//! impl Bindable for User {
//!     fn describe(b: &mut BindingBuilder<Self>) {
//!         b.field("id", |u: &mut User, v| u.id = v)
//!             .field("user_name", |u: &mut User, v| u.user_name = v)
//!             .field("active", |u: &mut User, v| u.active = v);
//!     }
//! }
//! ```

use crate::models::Value;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::fmt;

/// How a raw column value is coerced before it reaches a field setter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Numbers are true when nonzero, strings when affirmative.
    Bool,
    /// Numbers are rendered in plain decimal notation.
    String,
    /// Strings are matched against variant names.
    Enum,
    /// Dates and timestamps collapse into one date-time representation.
    Temporal,
    /// Assigned as is.
    Other,
}

/// A field type that can be produced from a database value.
pub trait FromValue: Sized {
    const KIND: FieldKind = FieldKind::Other;

    fn from_value(value: Value) -> Result<Self, String>;
}

/// An enum whose variants are addressed by name.
///
/// Implement it with [`impl_named_enum!`](crate::impl_named_enum).
pub trait NamedEnum: Sized {
    fn from_name(name: &str) -> Option<Self>;
    fn name(&self) -> &'static str;
}

/// Implement [`NamedEnum`] for a fieldless enum.
///
/// ```
/// #[derive(Debug, PartialEq)]
/// enum Status { Active, Disabled }
/// hydro_dao::impl_named_enum!(Status { Active, Disabled });
///
/// use hydro_dao::db::binding::NamedEnum;
/// assert_eq!(Status::from_name("Disabled"), Some(Status::Disabled));
/// ```
#[macro_export]
macro_rules! impl_named_enum {
    ($ty:ty { $($variant:ident),+ $(,)? }) => {
        impl $crate::db::binding::NamedEnum for $ty {
            fn from_name(name: &str) -> Option<Self> {
                match name {
                    $(stringify!($variant) => Some(Self::$variant),)+
                    _ => None,
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    $(Self::$variant => stringify!($variant),)+
                }
            }
        }
    };
}

/// Implement [`Bindable`] for a struct whose fields all share their column names.
///
/// ```
/// #[derive(Default)]
/// struct Item { id: i64, title: String }
/// hydro_dao::bindable!(Item { id, title });
/// ```
///
/// Naming a table binds the type to it for [`Dao::find_by_key`](crate::Dao::find_by_key):
///
/// ```
/// #[derive(Default)]
/// struct Item { id: i64, title: String }
/// hydro_dao::bindable!(Item in "items" { id, title });
///
/// use hydro_dao::db::binding::Bindable;
/// assert_eq!(Item::table_name(), Some("items"));
/// ```
#[macro_export]
macro_rules! bindable {
    ($ty:ident in $table:literal { $($field:ident),* $(,)? }) => {
        impl $crate::db::binding::Bindable for $ty {
            fn describe(b: &mut $crate::db::binding::BindingBuilder<Self>) {
                $( b.field(stringify!($field), |t: &mut Self, v| t.$field = v); )*
            }

            fn table_name() -> Option<&'static str> {
                Some($table)
            }
        }
    };
    ($ty:ty { $($field:ident),* $(,)? }) => {
        impl $crate::db::binding::Bindable for $ty {
            fn describe(b: &mut $crate::db::binding::BindingBuilder<Self>) {
                $( b.field(stringify!($field), |t: &mut Self, v| t.$field = v); )*
            }
        }
    };
}

/// A type that can be built from named columns.
pub trait Bindable: Default + 'static {
    fn describe(binding: &mut BindingBuilder<Self>);

    /// Table the type is stored in, if it is bound to one.
    fn table_name() -> Option<&'static str> {
        None
    }
}

type Setter<T> = Box<dyn Fn(&mut T, Value) -> Result<(), String> + Send + Sync>;

pub struct FieldBinding<T> {
    pub kind: FieldKind,
    setter: Setter<T>,
}

impl<T> FieldBinding<T> {
    pub fn set(&self, target: &mut T, value: Value) -> Result<(), String> {
        (self.setter)(target, value)
    }
}

/// Column-to-field map of one target type.
pub struct Bindings<T> {
    type_name: &'static str,
    own: HashMap<String, FieldBinding<T>>,
    inherited: HashMap<String, FieldBinding<T>>,
}

impl<T: Bindable> Bindings<T> {
    pub fn build() -> Self {
        let mut builder = BindingBuilder {
            bindings: Bindings {
                type_name: short_type_name::<T>(),
                own: HashMap::new(),
                inherited: HashMap::new(),
            },
        };
        T::describe(&mut builder);
        builder.bindings
    }
}

impl<T> Bindings<T> {
    /// Find the binding for a canonical field name. Fields declared on the
    /// type itself shadow inherited ones.
    pub fn lookup(&self, field: &str) -> Option<&FieldBinding<T>> {
        self.own.get(field).or_else(|| self.inherited.get(field))
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn len(&self) -> usize {
        self.own.len() + self.inherited.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> fmt::Debug for Bindings<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bindings")
            .field("type_name", &self.type_name)
            .field("own", &self.own.keys().collect::<Vec<_>>())
            .field("inherited", &self.inherited.keys().collect::<Vec<_>>())
            .finish()
    }
}

pub struct BindingBuilder<T> {
    bindings: Bindings<T>,
}

impl<T: 'static> BindingBuilder<T> {
    /// Bind a column to a field through its setter.
    pub fn field<F>(
        &mut self,
        name: &str,
        setter: impl Fn(&mut T, F) + Send + Sync + 'static,
    ) -> &mut Self
    where
        F: FromValue + 'static,
    {
        self.bindings.own.insert(
            canonical_field_name(name),
            FieldBinding {
                kind: F::KIND,
                setter: Box::new(move |target, value| {
                    setter(target, F::from_value(value)?);
                    Ok(())
                }),
            },
        );
        self
    }

    /// Bind a column holding a variant name to an enum field.
    pub fn enum_field<E>(
        &mut self,
        name: &str,
        setter: impl Fn(&mut T, E) + Send + Sync + 'static,
    ) -> &mut Self
    where
        E: NamedEnum + 'static,
    {
        self.bindings.own.insert(
            canonical_field_name(name),
            FieldBinding {
                kind: FieldKind::Enum,
                setter: Box::new(move |target, value| {
                    let name = match &value {
                        Value::String(s) => s.as_str(),
                        other => return Err(format!("expected a variant name, got {}", other.type_name())),
                    };
                    let variant = E::from_name(name)
                        .ok_or_else(|| format!("no variant named '{name}'"))?;
                    setter(target, variant);
                    Ok(())
                }),
            },
        );
        self
    }

    /// Take over the fields of an embedded parent type, reached through `lens`.
    ///
    /// Lookups try the type's own fields first, then each inherited type in
    /// the order they were added.
    pub fn inherit<P: Bindable>(&mut self, lens: fn(&mut T) -> &mut P) -> &mut Self {
        let parent = Bindings::<P>::build();
        for (name, binding) in parent.own.into_iter().chain(parent.inherited) {
            let kind = binding.kind;
            let setter = binding.setter;
            self.bindings
                .inherited
                .entry(name)
                .or_insert_with(|| FieldBinding {
                    kind,
                    setter: Box::new(move |target, value| setter(lens(target), value)),
                });
        }
        self
    }
}

/// Canonical snake_case form of a column or field name.
///
/// `USER_NAME`, `userName`, `UserName` and `user name` all become `user_name`.
pub fn canonical_field_name(name: &str) -> String {
    let has_lower = name.chars().any(|c| c.is_lowercase());
    let mut out = String::with_capacity(name.len() + 4);
    let mut prev: Option<char> = None;
    for c in name.trim().chars() {
        if c == ' ' || c == '-' || c == '_' {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
        } else if c.is_uppercase() {
            if has_lower && prev.is_some_and(|p| p.is_lowercase() || p.is_ascii_digit()) {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
        prev = Some(c);
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

fn short_type_name<T>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

// =============================================================================
// FromValue implementations
// =============================================================================

impl FromValue for Value {
    fn from_value(value: Value) -> Result<Self, String> {
        Ok(value)
    }
}

impl FromValue for bool {
    const KIND: FieldKind = FieldKind::Bool;

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(format!("cannot read {} as bool", other.type_name())),
        }
    }
}

impl FromValue for String {
    const KIND: FieldKind = FieldKind::String;

    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::String(s) | Value::Decimal(s) => Ok(s),
            Value::Bytes(_) => Err("cannot read bytes as text".to_string()),
            other => Ok(other.to_string()),
        }
    }
}

macro_rules! impl_from_value_int {
    ($($t:ty),+) => {
        $(
            impl FromValue for $t {
                fn from_value(value: Value) -> Result<Self, String> {
                    let wide = match &value {
                        Value::String(s) => s.trim().parse::<i64>().ok(),
                        other => other.as_i64(),
                    }
                    .ok_or_else(|| format!("cannot read {} as {}", value.type_name(), stringify!($t)))?;
                    <$t>::try_from(wide).map_err(|_| format!("{wide} is out of range for {}", stringify!($t)))
                }
            }
        )+
    };
}

impl_from_value_int!(i8, i16, i32, i64, u8, u16, u32, u64, usize);

impl FromValue for f64 {
    fn from_value(value: Value) -> Result<Self, String> {
        match &value {
            Value::String(s) => s.trim().parse().ok(),
            other => other.as_f64(),
        }
        .ok_or_else(|| format!("cannot read {} as f64", value.type_name()))
    }
}

impl FromValue for f32 {
    fn from_value(value: Value) -> Result<Self, String> {
        f64::from_value(value).map(|f| f as f32)
    }
}

const DATE_TIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

fn parse_date_time(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATE_TIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}

impl FromValue for NaiveDateTime {
    const KIND: FieldKind = FieldKind::Temporal;

    fn from_value(value: Value) -> Result<Self, String> {
        match value.normalize_temporal() {
            Value::DateTime(dt) => Ok(dt),
            Value::String(s) => {
                parse_date_time(&s).ok_or_else(|| format!("'{s}' is not a date-time"))
            }
            other => Err(format!("cannot read {} as date-time", other.type_name())),
        }
    }
}

impl FromValue for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Temporal;

    fn from_value(value: Value) -> Result<Self, String> {
        NaiveDateTime::from_value(value).map(|dt| dt.and_utc())
    }
}

impl FromValue for NaiveDate {
    const KIND: FieldKind = FieldKind::Temporal;

    fn from_value(value: Value) -> Result<Self, String> {
        NaiveDateTime::from_value(value).map(|dt| dt.date())
    }
}

impl FromValue for NaiveTime {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Time(t) => Ok(t),
            Value::DateTime(dt) => Ok(dt.time()),
            Value::String(s) => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
                .map_err(|_| format!("'{s}' is not a time")),
            other => Err(format!("cannot read {} as time", other.type_name())),
        }
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Bytes(b) => Ok(b),
            Value::String(s) => Ok(s.into_bytes()),
            other => Err(format!("cannot read {} as bytes", other.type_name())),
        }
    }
}

impl FromValue for JsonValue {
    fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Json(json) => Ok(json),
            Value::String(s) => serde_json::from_str(&s).map_err(|e| e.to_string()),
            other => Ok(other.to_json()),
        }
    }
}

impl<F: FromValue> FromValue for Option<F> {
    const KIND: FieldKind = F::KIND;

    fn from_value(value: Value) -> Result<Self, String> {
        if value.is_null() {
            Ok(None)
        } else {
            F::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_field_name() {
        assert_eq!(canonical_field_name("USER_NAME"), "user_name");
        assert_eq!(canonical_field_name("userName"), "user_name");
        assert_eq!(canonical_field_name("UserName"), "user_name");
        assert_eq!(canonical_field_name("user name"), "user_name");
        assert_eq!(canonical_field_name("id"), "id");
        assert_eq!(canonical_field_name("ID"), "id");
        assert_eq!(canonical_field_name("addressLine2"), "address_line2");
        assert_eq!(canonical_field_name("_row_"), "row");
    }

    #[derive(Default)]
    struct Base {
        id: i64,
        name: String,
    }

    impl Bindable for Base {
        fn describe(b: &mut BindingBuilder<Self>) {
            b.field("id", |t: &mut Base, v| t.id = v)
                .field("name", |t: &mut Base, v| t.name = v);
        }
    }

    #[derive(Default)]
    struct Derived {
        base: Base,
        name: String,
        level: u8,
    }

    impl Bindable for Derived {
        fn describe(b: &mut BindingBuilder<Self>) {
            b.inherit::<Base>(|d| &mut d.base)
                .field("name", |t: &mut Derived, v| t.name = v)
                .field("level", |t: &mut Derived, v| t.level = v);
        }
    }

    #[test]
    fn test_inherited_fields_resolve_through_lens() {
        let bindings = Bindings::<Derived>::build();
        assert_eq!(bindings.type_name(), "Derived");

        let mut target = Derived::default();
        bindings
            .lookup("id")
            .unwrap()
            .set(&mut target, Value::Int(7))
            .unwrap();
        bindings
            .lookup("name")
            .unwrap()
            .set(&mut target, Value::from("own"))
            .unwrap();
        assert_eq!(target.base.id, 7);
        assert_eq!(target.name, "own");
        assert!(target.base.name.is_empty());
    }

    #[test]
    fn test_setter_reports_range_errors() {
        let bindings = Bindings::<Derived>::build();
        let mut target = Derived::default();
        let err = bindings
            .lookup("level")
            .unwrap()
            .set(&mut target, Value::Int(1000))
            .unwrap_err();
        assert!(err.contains("out of range"));
    }

    #[test]
    fn test_from_value_conversions() {
        assert_eq!(i32::from_value(Value::Decimal("12".into())), Ok(12));
        assert_eq!(i64::from_value(Value::from(" 5 ")), Ok(5));
        assert!(bool::from_value(Value::from("x")).is_err());
        assert_eq!(
            NaiveDateTime::from_value(Value::from("2024-01-02 03:04:05")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap()
        );
        assert_eq!(
            NaiveDate::from_value(Value::from("2024-01-02")).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
        );
        assert_eq!(Option::<i64>::from_value(Value::Null), Ok(None));
        assert_eq!(<Option<bool> as FromValue>::KIND, FieldKind::Bool);
    }

    #[derive(Debug, PartialEq)]
    enum Color {
        Red,
        Green,
    }

    crate::impl_named_enum!(Color { Red, Green });

    #[test]
    fn test_named_enum_macro() {
        assert_eq!(Color::from_name("Green"), Some(Color::Green));
        assert_eq!(Color::from_name("green"), None);
        assert_eq!(Color::Red.name(), "Red");
    }
}
