//! Constant values loadable by `LoadConst` and embeddable in object
//! initializers.
//!
//! These are the producer-side value representations: plain owned data with
//! no sharing. How the VM aliases arrays and objects at run time is a
//! consumer concern.

/// A constant value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// IEEE-754 double
    Number(f64),
    /// Boolean
    Boolean(bool),
    /// Interned symbolic constant, e.g. `completed`
    Atom(String),
    /// UTF-8 string
    String(String),
    /// The unit value
    Unit,
    /// Absent value
    Undefined,
    /// Fixed-length ordered values
    Tuple(Vec<Value>),
    /// Growable ordered values
    Array(Vec<Value>),
    /// Property list with per-property descriptor flags
    Object(Vec<(String, PropertyDescriptor)>),
    /// Reference to a function by name, resolved by the VM at load time
    FunctionRef(String),
}

impl Value {
    /// Atom from anything string-like.
    pub fn atom(name: impl Into<String>) -> Self {
        Value::Atom(name.into())
    }

    /// String from anything string-like.
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    /// Function reference from anything string-like.
    pub fn function_ref(name: impl Into<String>) -> Self {
        Value::FunctionRef(name.into())
    }
}

/// A property value plus its descriptor flags.
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    /// The property's value
    pub value: Value,
    /// Whether the property can be reassigned
    pub writable: bool,
    /// Whether the property shows up in enumeration
    pub enumerable: bool,
    /// Whether the descriptor itself can be changed
    pub configurable: bool,
}

impl PropertyDescriptor {
    /// Descriptor with all flags set, the common case.
    pub fn new(value: Value) -> Self {
        Self {
            value,
            writable: true,
            enumerable: true,
            configurable: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atom_constructor() {
        assert_eq!(Value::atom("ok"), Value::Atom("ok".to_string()));
    }

    #[test]
    fn descriptor_defaults_to_all_flags() {
        let prop = PropertyDescriptor::new(Value::Number(1.0));
        assert!(prop.writable && prop.enumerable && prop.configurable);
    }
}
