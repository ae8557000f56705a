//! Registration records and the capability descriptors hooks build them from

use std::{
    any::{Any, TypeId, type_name},
    fmt,
    future::Future,
    sync::Arc
};

use async_trait::async_trait;
use futures::{FutureExt, future::BoxFuture};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;

use crate::{
    domain::{
        definition::{Choice, PortKind, Scope, Widget},
        error::SerializationError
    },
    port::collector::Native
};

/// Wire value → native object
pub type Expander = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Native, SerializationError>> + Send + Sync>;
/// Native object → wire value
pub type Shrinker = Arc<dyn Fn(Native) -> BoxFuture<'static, Result<Value, SerializationError>> + Send + Sync>;
/// Releases resources held by a native object
pub type CollectFn = Arc<dyn Fn(Native) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;
/// Does this native object belong to the structure?
pub type Predicate = Arc<dyn Fn(&Native) -> bool + Send + Sync>;
/// Native default → wire default
pub type DefaultConverter = Arc<dyn Fn(&Native) -> Result<Value, SerializationError> + Send + Sync>;

/// A native type registered with the registry
#[derive(Clone)]
pub struct StructureRegistration {
    pub type_id:               TypeId,
    pub type_name:             &'static str,
    /// Identifier used on the wire
    pub identifier:            String,
    pub kind:                  PortKind,
    pub scope:                 Scope,
    pub expand:                Expander,
    pub shrink:                Shrinker,
    pub collect:               Option<CollectFn>,
    pub predicate:             Predicate,
    pub convert_default:       Option<DefaultConverter>,
    pub default_widget:        Option<Widget>,
    pub default_return_widget: Option<Widget>
}

impl fmt::Debug for StructureRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StructureRegistration")
            .field("type_name", &self.type_name)
            .field("identifier", &self.identifier)
            .field("kind", &self.kind)
            .field("scope", &self.scope)
            .field("collects", &self.collect.is_some())
            .finish_non_exhaustive()
    }
}

/// Caller-supplied overrides for `register_as_structure`
#[derive(Clone, Default)]
pub struct RegisterOptions {
    pub identifier:            Option<String>,
    pub scope:                 Option<Scope>,
    pub kind:                  Option<PortKind>,
    pub expand:                Option<Expander>,
    pub shrink:                Option<Shrinker>,
    pub collect:               Option<CollectFn>,
    pub predicate:             Option<Predicate>,
    pub convert_default:       Option<DefaultConverter>,
    pub default_widget:        Option<Widget>,
    pub default_return_widget: Option<Widget>
}

impl RegisterOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn kind(mut self, kind: PortKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn expand<F, Fut>(mut self, expand: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Native, SerializationError>> + Send + 'static
    {
        self.expand = Some(Arc::new(move |value| expand(value).boxed()));
        self
    }

    pub fn shrink<F, Fut>(mut self, shrink: F) -> Self
    where
        F: Fn(Native) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, SerializationError>> + Send + 'static
    {
        self.shrink = Some(Arc::new(move |native| shrink(native).boxed()));
        self
    }

    pub fn collect<F, Fut>(mut self, collect: F) -> Self
    where
        F: Fn(Native) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static
    {
        self.collect = Some(Arc::new(move |native| collect(native).boxed()));
        self
    }

    pub fn predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Native) -> bool + Send + Sync + 'static
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn convert_default<F>(mut self, convert: F) -> Self
    where
        F: Fn(&Native) -> Result<Value, SerializationError> + Send + Sync + 'static
    {
        self.convert_default = Some(Arc::new(convert));
        self
    }

    pub fn default_widget(mut self, widget: Widget) -> Self {
        self.default_widget = Some(widget);
        self
    }

    pub fn default_return_widget(mut self, widget: Widget) -> Self {
        self.default_return_widget = Some(widget);
        self
    }
}

/// By-value conversion for serde types
#[derive(Clone)]
pub struct Codec {
    pub expand:          Expander,
    pub shrink:          Shrinker,
    pub predicate:       Predicate,
    pub convert_default: DefaultConverter
}

/// By-reference conversion for `GlobalStructure` types
#[derive(Clone)]
pub struct GlobalCodec {
    pub identifier:   &'static str,
    pub expand:       Expander,
    pub shrink:       Shrinker,
    pub collect:      CollectFn,
    pub predicate:    Predicate,
    pub search_query: Option<String>
}

/// Runtime description of a native type offered to the hook chain
///
/// Carries the type's identity plus whichever conversion capabilities the type was
/// able to provide when the candidate was built.
#[derive(Clone)]
pub struct StructureCandidate {
    pub type_id:    TypeId,
    pub type_name:  &'static str,
    pub kind:       PortKind,
    pub scope:      Option<Scope>,
    pub identifier: Option<String>,
    pub codec:      Option<Codec>,
    pub global:     Option<GlobalCodec>,
    pub choices:    Option<Vec<Choice>>
}

impl StructureCandidate {
    /// A type with no conversion capabilities; only explicit functions can register it
    pub fn of<T: Any + Send + Sync>() -> Self {
        Self {
            type_id:    TypeId::of::<T>(),
            type_name:  type_name::<T>(),
            kind:       PortKind::Structure,
            scope:      None,
            identifier: None,
            codec:      None,
            global:     None,
            choices:    None
        }
    }

    /// A type that travels by value through serde
    pub fn serde<T>() -> Self
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static
    {
        Self { codec: Some(serde_codec::<T>()), ..Self::of::<T>() }
    }

    /// A type resolved by reference on the far side
    pub fn global<T: GlobalStructure>() -> Self {
        Self { global: Some(global_codec::<T>()), ..Self::of::<T>() }
    }

    /// A serde enum restricted to a fixed set of wire values
    pub fn choices<T: ChoiceStructure>() -> Self {
        Self { choices: Some(T::choices()), ..Self::serde::<T>() }
    }

    pub fn identified_as(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn with_kind(mut self, kind: PortKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = Some(scope);
        self
    }

    /// Identifier derived from the Rust type path, e.g. `my_app.image.Image` → `my_app.image.image`
    pub fn default_identifier(&self) -> String {
        self.identifier.clone().unwrap_or_else(|| self.type_name.replace("::", ".").to_lowercase())
    }
}

/// Native types that know how to describe themselves to the registry
pub trait Structure: Send + Sync + 'static {
    fn candidate() -> StructureCandidate;
}

/// Types that live on a server and travel as references
#[async_trait]
pub trait GlobalStructure: Sized + Send + Sync + 'static {
    /// Wire identifier of the structure
    const IDENTIFIER: &'static str;

    /// Resolve a reference into the full object
    async fn expand(reference: String) -> anyhow::Result<Self>;

    /// Produce the reference the far side resolves this object by
    async fn shrink(&self) -> anyhow::Result<String>;

    /// Release server-side resources held by this object
    async fn collect(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Query the search widget should run to offer references
    fn search_query() -> Option<String> {
        None
    }
}

/// Serde enums whose wire values form a fixed list
pub trait ChoiceStructure: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn choices() -> Vec<Choice>;
}

fn mismatch<T>() -> SerializationError {
    SerializationError::new(format!("value is not a {}", type_name::<T>()))
}

async fn expand_serde<T>(value: Value) -> Result<Native, SerializationError>
where
    T: DeserializeOwned + Send + Sync + 'static
{
    let native: T = serde_json::from_value(value)
        .map_err(|e| SerializationError::new(format!("cannot expand {}: {}", type_name::<T>(), e)))?;
    Ok(Arc::new(native))
}

async fn shrink_serde<T>(native: Native) -> Result<Value, SerializationError>
where
    T: Serialize + 'static
{
    let value = native.downcast_ref::<T>().ok_or_else(mismatch::<T>)?;
    serde_json::to_value(value).map_err(|e| SerializationError::new(format!("cannot shrink {}: {}", type_name::<T>(), e)))
}

fn convert_serde_default<T>(native: &Native) -> Result<Value, SerializationError>
where
    T: Serialize + 'static
{
    let value = native.downcast_ref::<T>().ok_or_else(mismatch::<T>)?;
    Ok(serde_json::to_value(value)?)
}

fn serde_codec<T>() -> Codec
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static
{
    Codec {
        expand:          Arc::new(|value| expand_serde::<T>(value).boxed()),
        shrink:          Arc::new(|native| shrink_serde::<T>(native).boxed()),
        predicate:       Arc::new(|native: &Native| native.is::<T>()),
        convert_default: Arc::new(convert_serde_default::<T>)
    }
}

fn reference_from_wire(value: Value) -> Result<String, SerializationError> {
    match value {
        Value::String(reference) => Ok(reference),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(SerializationError::new(format!("expected a reference, got {}", other)))
    }
}

async fn expand_global<T: GlobalStructure>(value: Value) -> Result<Native, SerializationError> {
    let reference = reference_from_wire(value)?;
    let object = T::expand(reference.clone())
        .await
        .map_err(|e| SerializationError::new(format!("cannot expand {} {}: {:#}", T::IDENTIFIER, reference, e)))?;
    Ok(Arc::new(object))
}

async fn shrink_global<T: GlobalStructure>(native: Native) -> Result<Value, SerializationError> {
    let object = native.downcast_ref::<T>().ok_or_else(mismatch::<T>)?;
    let reference = object
        .shrink()
        .await
        .map_err(|e| SerializationError::new(format!("cannot shrink {}: {:#}", T::IDENTIFIER, e)))?;
    Ok(Value::String(reference))
}

async fn collect_global<T: GlobalStructure>(native: Native) -> anyhow::Result<()> {
    match native.downcast_ref::<T>() {
        Some(object) => object.collect().await,
        None => Err(anyhow::anyhow!("value is not a {}", type_name::<T>()))
    }
}

fn global_codec<T: GlobalStructure>() -> GlobalCodec {
    GlobalCodec {
        identifier:   T::IDENTIFIER,
        expand:       Arc::new(|value| expand_global::<T>(value).boxed()),
        shrink:       Arc::new(|native| shrink_global::<T>(native).boxed()),
        collect:      Arc::new(|native| collect_global::<T>(native).boxed()),
        predicate:    Arc::new(|native: &Native| native.is::<T>()),
        search_query: T::search_query()
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Roi {
        label:  String,
        points: Vec<(f64, f64)>
    }

    #[tokio::test]
    async fn test_serde_codec_round_trip() {
        let candidate = StructureCandidate::serde::<Roi>();
        let codec = candidate.codec.clone().unwrap();

        let roi = Roi { label: "cell".to_string(), points: vec![(0.0, 1.0), (2.5, 3.0)] };
        let wire = (codec.shrink)(Arc::new(roi.clone())).await.unwrap();
        let back = (codec.expand)(wire).await.unwrap();

        assert_eq!(back.downcast_ref::<Roi>(), Some(&roi));
        assert!((codec.predicate)(&back));
        assert!(!(codec.predicate)(&(Arc::new(3i64) as Native)));
    }

    #[tokio::test]
    async fn test_serde_codec_rejects_wrong_shape() {
        let codec = StructureCandidate::serde::<Roi>().codec.unwrap();

        let err = (codec.expand)(json!({"label": 3})).await.unwrap_err();
        assert!(err.message.contains("cannot expand"));

        let err = (codec.shrink)(Arc::new("not a roi".to_string())).await.unwrap_err();
        assert!(err.message.contains("value is not a"));
    }

    #[test]
    fn test_default_identifier_from_type_path() {
        let candidate = StructureCandidate::of::<Roi>();
        assert!(candidate.default_identifier().ends_with(".roi"));
        assert!(!candidate.default_identifier().contains("::"));

        let named = candidate.identified_as("@mikro/roi");
        assert_eq!(named.default_identifier(), "@mikro/roi");
    }

    #[test]
    fn test_reference_accepts_strings_and_numbers() {
        assert_eq!(reference_from_wire(json!("42")).unwrap(), "42");
        assert_eq!(reference_from_wire(json!(42)).unwrap(), "42");
        assert!(reference_from_wire(json!({"id": 42})).is_err());
    }
}
