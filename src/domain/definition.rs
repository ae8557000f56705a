//! Static description of an actor's inputs and outputs
//!
//! A `Definition` is built once (usually through the structure registry, which fills in
//! identifiers, scopes and widgets) and then shared read-only across every assignment
//! the actor processes.

use std::fmt::Display;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether a structure's value must travel by value or may be resolved by reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    /// Must travel by value
    Local,
    /// Resolvable by reference on the far side
    Global
}

impl Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scope::Local => write!(f, "LOCAL"),
            Scope::Global => write!(f, "GLOBAL")
        }
    }
}

/// Wire-level kind of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PortKind {
    Int,
    String,
    Structure,
    Bool,
    Float,
    Date,
    Dict
}

/// One selectable option of a choices widget
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub label: String,
    pub value: Value
}

/// UI hint attached to a port
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Widget {
    /// Free-form search against a backend query
    Search { query: String },
    /// Fixed set of options
    Choices { choices: Vec<Choice> },
    /// Plain text entry
    String { placeholder: Option<String>, as_paragraph: bool },
    /// Render the value with a custom component
    Custom { hook: String }
}

/// One argument or return value of a definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Port {
    /// Argument name
    pub key:           String,
    /// Wire-level kind
    pub kind:          PortKind,
    /// Structure identifier the value is expanded/shrunk with
    pub identifier:    String,
    /// Whether the value travels by value or by reference
    pub scope:         Scope,
    /// Whether `null` is an accepted value
    pub nullable:      bool,
    /// Wire-form default used when the argument is missing
    pub default:       Option<Value>,
    pub label:         Option<String>,
    pub description:   Option<String>,
    pub assign_widget: Option<Widget>,
    pub return_widget: Option<Widget>
}

impl Port {
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Whether the actor returns once or streams values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DefinitionKind {
    Function,
    Generator
}

/// Ordered description of an actor's ports
///
/// Port count and order are fixed for the lifetime of the definition and are the arity
/// the expander/shrinker pair is invoked with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Definition {
    pub name:        String,
    pub description: Option<String>,
    pub kind:        DefinitionKind,
    pub args:        Vec<Port>,
    pub returns:     Vec<Port>
}

impl Definition {
    pub fn function(name: impl Into<String>, args: Vec<Port>, returns: Vec<Port>) -> Self {
        Self { name: name.into(), description: None, kind: DefinitionKind::Function, args, returns }
    }

    pub fn generator(name: impl Into<String>, args: Vec<Port>, returns: Vec<Port>) -> Self {
        Self { name: name.into(), description: None, kind: DefinitionKind::Generator, args, returns }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_generator(&self) -> bool {
        self.kind == DefinitionKind::Generator
    }

    pub fn arg(&self, key: &str) -> Option<&Port> {
        self.args.iter().find(|port| port.key == key)
    }
}

impl Display for Definition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn int_port(key: &str) -> Port {
        Port {
            key:           key.to_string(),
            kind:          PortKind::Int,
            identifier:    "int".to_string(),
            scope:         Scope::Local,
            nullable:      false,
            default:       None,
            label:         None,
            description:   None,
            assign_widget: None,
            return_widget: None
        }
    }

    #[test]
    fn test_definition_serializes_with_wire_names() {
        let definition = Definition::function("square", vec![int_port("x")], vec![int_port("return0")]);

        let wire = serde_json::to_value(&definition).unwrap();
        assert_eq!(wire["kind"], json!("FUNCTION"));
        assert_eq!(wire["args"][0]["scope"], json!("LOCAL"));
        assert_eq!(wire["args"][0]["kind"], json!("INT"));

        let back: Definition = serde_json::from_value(wire).unwrap();
        assert_eq!(back, definition);
    }

    #[test]
    fn test_widget_is_tagged_by_kind() {
        let widget = Widget::Search { query: "images".to_string() };
        assert_eq!(serde_json::to_value(&widget).unwrap(), json!({"kind": "SEARCH", "query": "images"}));
    }

    #[test]
    fn test_arg_lookup_by_key() {
        let definition = Definition::generator("count", vec![int_port("start"), int_port("stop")], vec![]);
        assert!(definition.is_generator());
        assert_eq!(definition.arg("stop").map(|p| p.key.as_str()), Some("stop"));
        assert!(definition.arg("step").is_none());
    }
}
