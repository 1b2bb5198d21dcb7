//! Function resolution and keyword-argument binding.
//!
//! A loaded script exposes an explicit export table: every function it passed
//! to `scriptrun.register` plus, optionally, the parameter contract declared
//! alongside it. Resolution is a lookup in that table; binding turns the
//! request's `params` mapping into the argument list the function expects.
//!
//! # Parameter contracts
//!
//! A signature is a list of parameter specs, in call order:
//!
//! | spec | meaning |
//! |------|---------|
//! | `"name"` | required, any JSON value |
//! | `"name?"` | optional, passed as `undefined` when absent |
//! | `"name:type"` | required, checked against `type` |
//! | `"name?:type"` | optional and type-checked when present |
//!
//! Types are `any`, `string`, `number`, `integer`, `boolean`, `object` and
//! `array`. Functions registered without a signature receive the whole
//! `params` object as their single argument.

use scriptrun_common::{MethodReference, Result, ScriptrunError};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

use crate::loader::ScriptModule;

/// Entry of a module's export table.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedFunction {
    name: String,
    signature: Option<Signature>,
}

impl ExportedFunction {
    pub fn new(name: impl Into<String>, signature: Option<Signature>) -> Self {
        Self { name: name.into(), signature }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> Option<&Signature> {
        self.signature.as_ref()
    }
}

/// Value type a parameter accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Any,
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "any" => Some(ParamType::Any),
            "string" => Some(ParamType::String),
            "number" => Some(ParamType::Number),
            "integer" => Some(ParamType::Integer),
            "boolean" => Some(ParamType::Boolean),
            "object" => Some(ParamType::Object),
            "array" => Some(ParamType::Array),
            _ => None,
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            ParamType::Any => true,
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ParamType::Any => "any",
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub required: bool,
    pub kind: ParamType,
}

impl Parameter {
    /// Parses `name`, `name?`, `name:type` or `name?:type`.
    pub fn parse(spec: &str) -> std::result::Result<Self, String> {
        let (head, kind) = match spec.split_once(':') {
            Some((head, ty)) => {
                let kind = ParamType::parse(ty.trim())
                    .ok_or_else(|| format!("unknown parameter type '{}' in '{}'", ty.trim(), spec))?;
                (head.trim(), kind)
            }
            None => (spec.trim(), ParamType::Any),
        };

        let (name, required) = match head.strip_suffix('?') {
            Some(name) => (name, false),
            None => (head, true),
        };

        if !is_identifier(name) {
            return Err(format!("invalid parameter name '{}'", name));
        }

        Ok(Parameter { name: name.to_string(), required, kind })
    }
}

/// Declared parameter contract of an exported function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    params: Vec<Parameter>,
}

impl Signature {
    /// Parses a list of parameter specs.
    ///
    /// Required parameters may follow optional ones (JavaScript allows it),
    /// but names must be unique.
    pub fn parse<S: AsRef<str>>(specs: &[S]) -> std::result::Result<Self, String> {
        let mut seen = HashSet::new();
        let mut params = Vec::with_capacity(specs.len());

        for spec in specs {
            let param = Parameter::parse(spec.as_ref())?;
            if !seen.insert(param.name.clone()) {
                return Err(format!("duplicate parameter '{}'", param.name));
            }
            params.push(param);
        }

        Ok(Signature { params })
    }

    pub fn params(&self) -> &[Parameter] {
        &self.params
    }

    /// Binds a keyword mapping to positional arguments in declared order.
    ///
    /// `None` marks an omitted optional parameter.
    pub fn bind(&self, method: &str, mut kwargs: Map<String, Value>) -> Result<Vec<Option<Value>>> {
        if let Some(unexpected) = kwargs
            .keys()
            .find(|key| !self.params.iter().any(|p| &p.name == *key))
        {
            return Err(ScriptrunError::invocation(
                method,
                format!("unexpected argument '{}'", unexpected),
            ));
        }

        let mut bound = Vec::with_capacity(self.params.len());
        for param in &self.params {
            match kwargs.remove(&param.name) {
                Some(value) => {
                    if !param.kind.accepts(&value) {
                        return Err(ScriptrunError::invocation(
                            method,
                            format!(
                                "argument '{}' must be of type {}, got {}",
                                param.name,
                                param.kind,
                                json_type_name(&value)
                            ),
                        ));
                    }
                    bound.push(Some(value));
                }
                None if param.required => {
                    return Err(ScriptrunError::invocation(
                        method,
                        format!("missing required argument '{}'", param.name),
                    ));
                }
                None => bound.push(None),
            }
        }

        Ok(bound)
    }
}

/// Arguments ready to be handed to the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum CallArgs {
    /// Bound against a signature, in declared order
    Positional(Vec<Option<Value>>),
    /// No signature: the whole mapping is the single argument
    Mapping(Map<String, Value>),
}

/// A resolved function together with its bound arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundCall {
    pub function: String,
    pub args: CallArgs,
}

/// Looks up the referenced function in the module's export table.
pub fn resolve<'m>(
    reference: &MethodReference,
    module: &'m ScriptModule,
) -> Result<&'m ExportedFunction> {
    module.function(reference.function()).ok_or_else(|| ScriptrunError::MethodNotFound {
        script: reference.script().to_string(),
        method: reference.function().to_string(),
    })
}

/// Binds `params` for `export`, reporting mismatches as `InvocationError`.
pub fn bind(
    reference: &MethodReference,
    export: &ExportedFunction,
    params: Map<String, Value>,
) -> Result<BoundCall> {
    let args = match export.signature() {
        Some(signature) => CallArgs::Positional(signature.bind(&reference.to_string(), params)?),
        None => CallArgs::Mapping(params),
    };

    Ok(BoundCall { function: export.name().to_string(), args })
}

/// JavaScript identifier check used for registered function and parameter
/// names (ASCII subset).
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
