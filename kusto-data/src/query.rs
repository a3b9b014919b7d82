//! Type-safe query building: textual composition with typed parameters and
//! identifier/string escaping against injection.
//!
//! Two surfaces share the same escaping rules: the immutable [Statement],
//! which declares parameters through a `declare query_parameters` preamble
//! and sends the values out of band, and the mutable [KqlBuilder], which
//! inlines escaped values directly into the text.

use crate::error::{Error, ErrorKind, OpKind, Result};
use crate::models::ColumnType;
use crate::types::{
    KustoBool, KustoDateTime, KustoDecimal, KustoDynamic, KustoGuid, KustoInt, KustoLong,
    KustoReal, KustoString, KustoTimespan,
};
use crate::value::KustoValue;
use hashbrown::HashMap;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;
use std::fmt::Write as _;
use std::fmt::{Display, Formatter};
use std::sync::Arc;

static PLAIN_IDENTIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new("^[A-Za-z_][A-Za-z0-9_]*$").expect("static identifier regex is valid"));

/// Whether an identifier must be bracket-quoted to be safe in query text.
///
/// True iff the identifier is empty, begins with a character other than a
/// letter or underscore, or contains a character outside `[A-Za-z0-9_]`.
pub fn requires_quoting(identifier: &str) -> bool {
    !PLAIN_IDENTIFIER.is_match(identifier)
}

fn escape_into(out: &mut String, s: &str) {
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\0' => out.push_str("\\0"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0c' => out.push_str("\\f"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x0b' => out.push_str("\\v"),
            c if (c as u32) > 0xFF || c.is_control() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    write!(out, "\\u{:04x}", unit).expect("writing to a String cannot fail");
                }
            }
            c => out.push(c),
        }
    }
}

/// Quotes and escapes a string literal. `hidden` prefixes the obfuscation
/// marker so the service redacts the value in traces.
pub fn quote_string(s: &str, hidden: bool) -> String {
    let mut out = String::with_capacity(s.len() + 3);
    if hidden {
        out.push('h');
    }
    out.push('"');
    escape_into(&mut out, s);
    out.push('"');
    out
}

/// Escapes an identifier for safe inclusion in query text.
///
/// Plain identifiers pass through unchanged unless `force` is set; anything
/// else is emitted in the bracket-quoted form.
pub fn quote_identifier(identifier: &str, force: bool) -> Cow<'_, str> {
    if !force && !requires_quoting(identifier) {
        return Cow::Borrowed(identifier);
    }
    let mut out = String::with_capacity(identifier.len() + 4);
    out.push_str("[\"");
    escape_into(&mut out, identifier);
    out.push_str("\"]");
    Cow::Owned(out)
}

/// Renders a parameter default the way the preamble spells it: scalar
/// numerics and bools bare, strings quoted, the rest in full literal form.
fn default_literal(value: &KustoValue) -> String {
    match value {
        KustoValue::Bool(KustoBool(Some(b))) => b.to_string(),
        KustoValue::Int(KustoInt(Some(v))) => v.to_string(),
        KustoValue::Long(KustoLong(Some(v))) => v.to_string(),
        KustoValue::Real(KustoReal(Some(v))) => v.to_string(),
        KustoValue::Decimal(KustoDecimal(Some(v))) => v.clone(),
        KustoValue::String(KustoString(Some(v))) => quote_string(v, false),
        other => other.literal(),
    }
}

/// The declared type of a query parameter, with an optional default.
#[derive(Clone, PartialEq, Debug)]
pub struct ParamType {
    column_type: ColumnType,
    default: Option<KustoValue>,
}

impl ParamType {
    /// A parameter of the given type, without a default.
    pub fn new(column_type: ColumnType) -> Self {
        Self {
            column_type,
            default: None,
        }
    }

    /// Sets the default value; its type must match the declared type.
    pub fn with_default(mut self, default: KustoValue) -> Result<Self> {
        if default.column_type() != self.column_type {
            return Err(Error::new(
                OpKind::Unknown,
                ErrorKind::ClientArgs,
                format!(
                    "default value of type {} does not match the declared {} parameter",
                    default.column_type().kql_name(),
                    self.column_type.kql_name()
                ),
            ));
        }
        self.default = Some(default);
        Ok(self)
    }

    /// The declared column type.
    pub fn column_type(&self) -> ColumnType {
        self.column_type
    }

    fn declaration(&self, name: &str) -> String {
        match &self.default {
            Some(default) => format!(
                "{}:{} = {}",
                name,
                self.column_type.kql_name(),
                default_literal(default)
            ),
            None => format!("{}:{}", name, self.column_type.kql_name()),
        }
    }
}

/// An immutable query statement with typed parameter declarations and values.
///
/// Every mutator returns a new statement; the definition and value maps are
/// shared structurally between derivations until one of them changes.
#[derive(Clone, Debug)]
pub struct Statement {
    text: String,
    definitions: Arc<HashMap<String, ParamType>>,
    values: Arc<HashMap<String, KustoValue>>,
    unsafe_allowed: bool,
}

impl Statement {
    /// Creates a statement from a string constant.
    ///
    /// Restricting the seed to `'static` text keeps runtime data out of the
    /// query body unless it goes through an escaped append or a parameter.
    pub fn new(text: &'static str) -> Self {
        Self {
            text: text.to_string(),
            definitions: Arc::new(HashMap::new()),
            values: Arc::new(HashMap::new()),
            unsafe_allowed: false,
        }
    }

    /// Opts this statement into [Statement::unsafe_add].
    #[must_use]
    pub fn allow_unsafe(mut self) -> Self {
        self.unsafe_allowed = true;
        self
    }

    /// Appends a string constant.
    #[must_use]
    pub fn add(mut self, text: &'static str) -> Self {
        self.text.push_str(text);
        self
    }

    /// Appends an identifier, escaping it when required.
    #[must_use]
    pub fn add_identifier(mut self, identifier: &str) -> Self {
        self.text.push_str(&quote_identifier(identifier, false));
        self
    }

    /// Appends a value in its literal form.
    #[must_use]
    pub fn add_value(mut self, value: &KustoValue) -> Self {
        self.text.push_str(&value.literal());
        self
    }

    /// Appends arbitrary text without any escaping.
    ///
    /// # Panics
    /// Calling this on a statement that was not opted in through
    /// [Statement::allow_unsafe] is a programmer bug and panics.
    #[must_use]
    pub fn unsafe_add(mut self, text: &str) -> Self {
        assert!(
            self.unsafe_allowed,
            "unsafe_add on a statement that was not opted into unsafe building"
        );
        self.text.push_str(text);
        self
    }

    /// Declares the statement's parameters.
    ///
    /// Rejects empty maps and parameter names containing whitespace.
    pub fn with_definitions(
        mut self,
        definitions: impl IntoIterator<Item = (impl Into<String>, ParamType)>,
    ) -> Result<Self> {
        let definitions: HashMap<String, ParamType> = definitions
            .into_iter()
            .map(|(name, ty)| (name.into(), ty))
            .collect();
        if definitions.is_empty() {
            return Err(Error::new(
                OpKind::Unknown,
                ErrorKind::ClientArgs,
                "query parameter definitions cannot be empty",
            ));
        }
        if let Some(name) = definitions.keys().find(|n| n.contains(char::is_whitespace)) {
            return Err(Error::new(
                OpKind::Unknown,
                ErrorKind::ClientArgs,
                format!("query parameter name '{name}' contains whitespace"),
            ));
        }
        self.definitions = Arc::new(definitions);
        Ok(self)
    }

    /// Provides values for previously declared parameters.
    ///
    /// Every value must match a declaration, both by name and by type.
    pub fn with_parameters(
        mut self,
        values: impl IntoIterator<Item = (impl Into<String>, KustoValue)>,
    ) -> Result<Self> {
        if self.definitions.is_empty() {
            return Err(Error::new(
                OpKind::Unknown,
                ErrorKind::ClientArgs,
                "parameter values require prior definitions",
            ));
        }
        let values: HashMap<String, KustoValue> = values
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();
        for (name, value) in &values {
            let Some(declared) = self.definitions.get(name) else {
                return Err(Error::new(
                    OpKind::Unknown,
                    ErrorKind::ClientArgs,
                    format!("parameter '{name}' was not declared"),
                ));
            };
            if value.column_type() != declared.column_type {
                return Err(Error::new(
                    OpKind::Unknown,
                    ErrorKind::ClientArgs,
                    format!(
                        "parameter '{}' is declared {} but the value is {}",
                        name,
                        declared.column_type.kql_name(),
                        value.column_type().kql_name()
                    ),
                ));
            }
        }
        self.values = Arc::new(values);
        Ok(self)
    }

    /// The statement text without the parameter preamble.
    pub fn query_text(&self) -> &str {
        &self.text
    }

    /// Whether the statement declares parameters.
    pub fn has_definitions(&self) -> bool {
        !self.definitions.is_empty()
    }

    /// The `declare query_parameters(...)` preamble, when definitions exist.
    /// Names are sorted ascending.
    pub fn preamble(&self) -> Option<String> {
        if self.definitions.is_empty() {
            return None;
        }
        let mut names: Vec<&String> = self.definitions.keys().collect();
        names.sort();
        let declarations = names
            .into_iter()
            .map(|name| self.definitions[name].declaration(name))
            .collect::<Vec<_>>()
            .join(", ");
        Some(format!("declare query_parameters({declarations});"))
    }

    /// The JSON envelope of provided parameter values: name mapped to the
    /// literal form used in the preamble. Parameters without a provided
    /// value are omitted.
    pub fn values_json(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        if self.values.is_empty() {
            return None;
        }
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        let mut map = serde_json::Map::with_capacity(names.len());
        for name in names {
            map.insert(
                name.clone(),
                serde_json::Value::String(self.values[name].literal()),
            );
        }
        Some(map)
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.preamble() {
            Some(preamble) => write!(f, "{}\n{}", preamble, self.text),
            None => write!(f, "{}", self.text),
        }
    }
}

/// Anything the request engine can send as a query: raw text, a
/// [Statement], or a [KqlBuilder].
///
/// The engine only needs the final wire text and, for statements that do not
/// inline their parameters, the out-of-band value envelope.
pub trait KustoQuery {
    /// The csl text as it goes on the wire, including the declare preamble
    /// when the query carries non-inline parameter declarations.
    fn query_text(&self) -> Cow<'_, str>;

    /// The parameter value envelope, name mapped to literal form; `None`
    /// when the query inlines its parameters or has none.
    fn parameter_values(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        None
    }
}

impl KustoQuery for str {
    fn query_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.trim())
    }
}

impl KustoQuery for String {
    fn query_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(self.trim())
    }
}

impl KustoQuery for Statement {
    fn query_text(&self) -> Cow<'_, str> {
        match self.preamble() {
            Some(preamble) => Cow::Owned(format!("{}\n{}", preamble, self.text)),
            None => Cow::Borrowed(&self.text),
        }
    }

    fn parameter_values(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        self.values_json()
    }
}

impl KustoQuery for KqlBuilder {
    // Values are already inlined in the text; nothing travels out of band.
    fn query_text(&self) -> Cow<'_, str> {
        Cow::Borrowed(&self.kql)
    }
}

impl<T: KustoQuery + ?Sized> KustoQuery for &T {
    fn query_text(&self) -> Cow<'_, str> {
        (*self).query_text()
    }

    fn parameter_values(&self) -> Option<serde_json::Map<String, serde_json::Value>> {
        (*self).parameter_values()
    }
}

/// A mutable KQL text builder that inlines escaped values.
///
/// Shares the escaping rules of [Statement]; since values are embedded in
/// the text, no parameter envelope travels with the request.
#[derive(Clone, Debug, Default)]
pub struct KqlBuilder {
    kql: String,
}

impl KqlBuilder {
    /// Creates a builder seeded with a string constant.
    pub fn new(text: &'static str) -> Self {
        Self {
            kql: text.to_string(),
        }
    }

    /// Appends a string constant.
    pub fn add_literal(&mut self, text: &'static str) -> &mut Self {
        self.kql.push_str(text);
        self
    }

    /// Appends an identifier, escaping it when required. `force` quotes it
    /// even when plain.
    pub fn add_identifier(&mut self, identifier: &str, force: bool) -> &mut Self {
        self.kql.push_str(&quote_identifier(identifier, force));
        self
    }

    /// Appends a table name.
    pub fn add_table(&mut self, name: &str) -> &mut Self {
        self.add_identifier(name, false)
    }

    /// Appends a database name.
    pub fn add_database(&mut self, name: &str) -> &mut Self {
        self.add_identifier(name, false)
    }

    /// Appends a column name.
    pub fn add_column(&mut self, name: &str) -> &mut Self {
        self.add_identifier(name, false)
    }

    /// Appends a quoted, escaped string literal. `hidden` marks it for
    /// redaction in traces.
    pub fn add_quoted_string(&mut self, value: &str, hidden: bool) -> &mut Self {
        self.kql.push_str(&quote_string(value, hidden));
        self
    }

    /// Appends a `bool(...)` literal.
    pub fn add_bool(&mut self, value: bool) -> &mut Self {
        self.add_value(&KustoValue::Bool(KustoBool::new(value)))
    }

    /// Appends an `int(...)` literal.
    pub fn add_int(&mut self, value: i32) -> &mut Self {
        self.add_value(&KustoValue::Int(KustoInt::new(value)))
    }

    /// Appends a `long(...)` literal.
    pub fn add_long(&mut self, value: i64) -> &mut Self {
        self.add_value(&KustoValue::Long(KustoLong::new(value)))
    }

    /// Appends a `real(...)` literal.
    pub fn add_real(&mut self, value: f64) -> &mut Self {
        self.add_value(&KustoValue::Real(KustoReal::new(value)))
    }

    /// Appends a `decimal(...)` literal.
    pub fn add_decimal(&mut self, value: &KustoDecimal) -> &mut Self {
        self.add_value(&KustoValue::Decimal(value.clone()))
    }

    /// Appends a `datetime(...)` literal in RFC-3339 form.
    pub fn add_datetime(&mut self, value: time::OffsetDateTime) -> &mut Self {
        self.add_value(&KustoValue::DateTime(KustoDateTime::new(value)))
    }

    /// Appends a `timespan(...)` literal.
    pub fn add_timespan(&mut self, value: time::Duration) -> &mut Self {
        self.add_value(&KustoValue::Timespan(KustoTimespan::new(value)))
    }

    /// Appends a `guid(...)` literal.
    pub fn add_guid(&mut self, value: uuid::Uuid) -> &mut Self {
        self.add_value(&KustoValue::Guid(KustoGuid::new(value)))
    }

    /// Appends a `dynamic(...)` literal carrying the raw JSON payload.
    pub fn add_dynamic(&mut self, value: &KustoDynamic) -> &mut Self {
        self.add_value(&KustoValue::Dynamic(value.clone()))
    }

    /// Appends any value in its literal form.
    pub fn add_value(&mut self, value: &KustoValue) -> &mut Self {
        self.kql.push_str(&value.literal());
        self
    }

    /// The built query text.
    pub fn build(&self) -> &str {
        &self.kql
    }
}

impl Display for KqlBuilder {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kql)
    }
}
