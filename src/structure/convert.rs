//! Expanding assignment arguments and shrinking actor returns against a definition's ports

use std::{
    any::{Any, type_name},
    fmt
};

use futures::future::try_join_all;
use serde_json::Value;

use crate::{
    domain::{
        definition::{Definition, Port, Scope},
        error::{ActorError, SerializationError}
    },
    port::collector::{Collectable, Native},
    structure::registry::StructureRegistry
};

/// Expanded arguments handed to an actor body, in port order
///
/// `None` marks a nullable port that received `null`.
#[derive(Clone, Default)]
pub struct Args {
    values: Vec<Option<Native>>
}

impl Args {
    pub fn new(values: Vec<Option<Native>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Typed access to a required argument
    pub fn get<T: Any>(&self, index: usize) -> Result<&T, ActorError> {
        self.opt::<T>(index)?
            .ok_or_else(|| ActorError::assertion(format!("argument {} is missing", index)))
    }

    /// Typed access to a nullable argument
    pub fn opt<T: Any>(&self, index: usize) -> Result<Option<&T>, ActorError> {
        match self.values.get(index) {
            None => Err(ActorError::assertion(format!("argument {} is out of range", index))),
            Some(None) => Ok(None),
            Some(Some(native)) => native
                .downcast_ref::<T>()
                .map(Some)
                .ok_or_else(|| ActorError::assertion(format!("argument {} is not a {}", index, type_name::<T>())))
        }
    }

    pub fn native(&self, index: usize) -> Option<&Native> {
        self.values.get(index).and_then(Option::as_ref)
    }

    pub fn into_natives(self) -> Vec<Option<Native>> {
        self.values
    }
}

impl fmt::Debug for Args {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Args").field("present", &presence(&self.values)).finish()
    }
}

/// Native values an actor body returns or yields, in return-port order
#[derive(Clone, Default)]
pub struct Returns {
    values: Vec<Option<Native>>
}

impl Returns {
    /// Nothing; matches a definition without return ports
    pub fn none() -> Self {
        Self::default()
    }

    pub fn one<T: Any + Send + Sync>(value: T) -> Self {
        Self::none().with(value)
    }

    pub fn with<T: Any + Send + Sync>(mut self, value: T) -> Self {
        self.values.push(Some(std::sync::Arc::new(value)));
        self
    }

    /// `null` for a nullable return port
    pub fn with_null(mut self) -> Self {
        self.values.push(None);
        self
    }

    pub fn from_natives(values: Vec<Option<Native>>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_natives(self) -> Vec<Option<Native>> {
        self.values
    }
}

impl fmt::Debug for Returns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Returns").field("present", &presence(&self.values)).finish()
    }
}

fn presence(values: &[Option<Native>]) -> Vec<bool> {
    values.iter().map(Option::is_some).collect()
}

/// Wire payload of one shrunk result plus what the collector must track for it
#[derive(Debug, Default)]
pub struct Shrunk {
    pub values:       Vec<Value>,
    pub collectables: Vec<Collectable>
}

fn check_arity(what: &str, definition: &Definition, expected: usize, got: usize) -> Result<(), SerializationError> {
    if expected != got {
        return Err(SerializationError::new(format!(
            "{} expects {} {}, got {}",
            definition.name, expected, what, got
        )));
    }
    Ok(())
}

async fn expand_port(port: &Port, value: Value, registry: &StructureRegistry) -> Result<Option<Native>, SerializationError> {
    let value = match (value, &port.default) {
        (Value::Null, Some(default)) => default.clone(),
        (Value::Null, None) if port.nullable => return Ok(None),
        (Value::Null, None) => {
            return Err(SerializationError::new(format!("{} is not nullable and has no default", port.key)));
        }
        (value, _) => value
    };

    let expand = registry
        .get_expander_for_identifier(&port.identifier)
        .map_err(|e| SerializationError::new(format!("cannot expand {}: {}", port.key, e)))?;

    let native = expand(value)
        .await
        .map_err(|e| SerializationError::new(format!("cannot expand {}: {}", port.key, e)))?;

    Ok(Some(native))
}

async fn shrink_port(
    port: &Port,
    native: Option<Native>,
    registry: &StructureRegistry
) -> Result<(Value, Option<Collectable>), SerializationError> {
    let Some(native) = native else {
        if port.nullable {
            return Ok((Value::Null, None));
        }
        return Err(SerializationError::new(format!("{} is not nullable but no value was returned", port.key)));
    };

    let registration = registry
        .get_registration_for_identifier(&port.identifier)
        .map_err(|e| SerializationError::new(format!("cannot shrink {}: {}", port.key, e)))?;

    if !(registration.predicate)(&native) {
        return Err(SerializationError::new(format!(
            "cannot shrink {}: value is not a {}",
            port.key, registration.identifier
        )));
    }

    let value = (registration.shrink)(native.clone())
        .await
        .map_err(|e| SerializationError::new(format!("cannot shrink {}: {}", port.key, e)))?;

    let collectable = registration
        .collect
        .as_ref()
        .map(|_| Collectable { identifier: registration.identifier.clone(), value: native });

    Ok((value, collectable))
}

/// Expand every wire argument against its port, concurrently but in port order
pub async fn expand_inputs(
    definition: &Definition,
    args: &[Value],
    registry: &StructureRegistry
) -> Result<Args, SerializationError> {
    check_arity("arguments", definition, definition.args.len(), args.len())?;

    let values = try_join_all(
        definition.args.iter().zip(args).map(|(port, value)| expand_port(port, value.clone(), registry))
    )
    .await?;

    Ok(Args::new(values))
}

/// Expand wire return values (as produced by a worker process) against the return ports
pub async fn expand_outputs(
    definition: &Definition,
    values: Vec<Value>,
    registry: &StructureRegistry
) -> Result<Returns, SerializationError> {
    check_arity("return values", definition, definition.returns.len(), values.len())?;

    let values = try_join_all(
        definition.returns.iter().zip(values).map(|(port, value)| expand_port(port, value, registry))
    )
    .await?;

    Ok(Returns::from_natives(values))
}

/// Shrink native return values against the return ports
pub async fn shrink_outputs(
    definition: &Definition,
    returns: Returns,
    registry: &StructureRegistry
) -> Result<Shrunk, SerializationError> {
    check_arity("return values", definition, definition.returns.len(), returns.len())?;

    let shrunk = try_join_all(
        definition
            .returns
            .iter()
            .zip(returns.into_natives())
            .map(|(port, native)| shrink_port(port, native, registry))
    )
    .await?;

    let mut result = Shrunk::default();
    for (value, collectable) in shrunk {
        result.values.push(value);
        result.collectables.extend(collectable);
    }
    Ok(result)
}

/// Arguments as they cross into another process
///
/// GLOBAL ports keep their wire reference; LOCAL ports are re-shrunk from the expanded value.
pub async fn boundary_args(
    definition: &Definition,
    wire: &[Value],
    args: &Args,
    registry: &StructureRegistry
) -> Result<Vec<Value>, SerializationError> {
    check_arity("arguments", definition, definition.args.len(), wire.len())?;

    let mut values = Vec::with_capacity(wire.len());
    for (index, (port, raw)) in definition.args.iter().zip(wire).enumerate() {
        let value = match (port.scope, args.native(index)) {
            (_, None) => Value::Null,
            (Scope::Global, Some(_)) if !raw.is_null() => raw.clone(),
            (Scope::Global, Some(_)) => port.default.clone().unwrap_or(Value::Null),
            (Scope::Local, Some(native)) => shrink_port(port, Some(native.clone()), registry).await?.0
        };
        values.push(value);
    }
    Ok(values)
}
