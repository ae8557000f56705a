//! Registration hooks
//!
//! `register_as_structure` offers a type to each hook in declaration order; the first hook
//! that claims it builds the registration. General-purpose hooks go last so more specific
//! ones shadow them.

use std::{
    any::{Any, TypeId},
    sync::Arc
};

use crate::{
    domain::{
        definition::{Scope, Widget},
        error::StructureError
    },
    port::collector::Native,
    structure::registration::{
        Codec, CollectFn, DefaultConverter, Expander, Predicate, RegisterOptions, Shrinker, StructureCandidate,
        StructureRegistration
    }
};

/// One step of the registration chain
pub trait StructureHook: Send + Sync {
    /// Name used in logs and error messages
    fn name(&self) -> &'static str;

    /// Does this hook know how to register the candidate?
    fn is_applicable(&self, candidate: &StructureCandidate, options: &RegisterOptions) -> bool;

    /// Build the registration; only called when `is_applicable` returned true
    fn apply(
        &self,
        candidate: &StructureCandidate,
        options: RegisterOptions
    ) -> Result<StructureRegistration, StructureError>;
}

/// The hooks every registry starts with, most specific first
pub fn default_hooks() -> Vec<Arc<dyn StructureHook>> {
    vec![Arc::new(FunctionsHook), Arc::new(GlobalStructureHook), Arc::new(ChoicesHook), Arc::new(SerdeHook)]
}

/// Conversion functions a hook settled on before options are layered over them
pub(crate) struct Base {
    pub scope:                 Scope,
    pub expand:                Expander,
    pub shrink:                Shrinker,
    pub predicate:             Predicate,
    pub collect:               Option<CollectFn>,
    pub convert_default:       Option<DefaultConverter>,
    pub default_widget:        Option<Widget>,
    pub default_return_widget: Option<Widget>
}

impl Base {
    pub(crate) fn from_codec(codec: &Codec, scope: Scope) -> Self {
        Self {
            scope,
            expand: codec.expand.clone(),
            shrink: codec.shrink.clone(),
            predicate: codec.predicate.clone(),
            collect: None,
            convert_default: Some(codec.convert_default.clone()),
            default_widget: None,
            default_return_widget: None
        }
    }
}

/// Layer caller options over what a hook derived
pub(crate) fn finish(
    candidate: &StructureCandidate,
    options: RegisterOptions,
    identifier: String,
    base: Base
) -> StructureRegistration {
    StructureRegistration {
        type_id: candidate.type_id,
        type_name: candidate.type_name,
        identifier: options.identifier.unwrap_or(identifier),
        kind: options.kind.unwrap_or(candidate.kind),
        scope: options.scope.or(candidate.scope).unwrap_or(base.scope),
        expand: options.expand.unwrap_or(base.expand),
        shrink: options.shrink.unwrap_or(base.shrink),
        collect: options.collect.or(base.collect),
        predicate: options.predicate.unwrap_or(base.predicate),
        convert_default: options.convert_default.or(base.convert_default),
        default_widget: options.default_widget.or(base.default_widget),
        default_return_widget: options.default_return_widget.or(base.default_return_widget)
    }
}

/// Caller supplied both `expand` and `shrink`
pub struct FunctionsHook;

impl StructureHook for FunctionsHook {
    fn name(&self) -> &'static str {
        "functions"
    }

    fn is_applicable(&self, _candidate: &StructureCandidate, options: &RegisterOptions) -> bool {
        options.expand.is_some() && options.shrink.is_some()
    }

    fn apply(
        &self,
        candidate: &StructureCandidate,
        mut options: RegisterOptions
    ) -> Result<StructureRegistration, StructureError> {
        let (Some(expand), Some(shrink)) = (options.expand.take(), options.shrink.take()) else {
            return Err(StructureError::Definition(format!(
                "{} needs both an expander and a shrinker",
                candidate.type_name
            )));
        };

        let type_id = candidate.type_id;
        let predicate: Predicate = Arc::new(move |native: &Native| is_instance_of(native, type_id));

        let base = Base {
            scope: Scope::Local,
            expand,
            shrink,
            predicate,
            collect: None,
            convert_default: candidate.codec.as_ref().map(|codec| codec.convert_default.clone()),
            default_widget: None,
            default_return_widget: None
        };

        Ok(finish(candidate, options, candidate.default_identifier(), base))
    }
}

/// Types implementing `GlobalStructure`; travel by reference
pub struct GlobalStructureHook;

impl StructureHook for GlobalStructureHook {
    fn name(&self) -> &'static str {
        "global"
    }

    fn is_applicable(&self, candidate: &StructureCandidate, _options: &RegisterOptions) -> bool {
        candidate.global.is_some()
    }

    fn apply(
        &self,
        candidate: &StructureCandidate,
        options: RegisterOptions
    ) -> Result<StructureRegistration, StructureError> {
        let global = candidate.global.as_ref().ok_or_else(|| {
            StructureError::Definition(format!("{} is not a global structure", candidate.type_name))
        })?;

        let search = global.search_query.clone().map(|query| Widget::Search { query });

        let base = Base {
            scope: Scope::Global,
            expand: global.expand.clone(),
            shrink: global.shrink.clone(),
            predicate: global.predicate.clone(),
            collect: Some(global.collect.clone()),
            convert_default: None,
            default_widget: search,
            default_return_widget: None
        };

        let identifier = candidate.identifier.clone().unwrap_or_else(|| global.identifier.to_string());
        Ok(finish(candidate, options, identifier, base))
    }
}

/// Serde enums with a fixed list of wire values
pub struct ChoicesHook;

impl StructureHook for ChoicesHook {
    fn name(&self) -> &'static str {
        "choices"
    }

    fn is_applicable(&self, candidate: &StructureCandidate, _options: &RegisterOptions) -> bool {
        candidate.choices.is_some() && candidate.codec.is_some()
    }

    fn apply(
        &self,
        candidate: &StructureCandidate,
        options: RegisterOptions
    ) -> Result<StructureRegistration, StructureError> {
        let (Some(codec), Some(choices)) = (candidate.codec.as_ref(), candidate.choices.as_ref()) else {
            return Err(StructureError::Definition(format!("{} offers no choices", candidate.type_name)));
        };

        if choices.is_empty() {
            return Err(StructureError::Definition(format!("{} declares an empty choice list", candidate.type_name)));
        }

        let mut base = Base::from_codec(codec, Scope::Global);
        base.default_widget = Some(Widget::Choices { choices: choices.clone() });

        Ok(finish(candidate, options, candidate.default_identifier(), base))
    }
}

/// Any serde type, by value; the general fallback
pub struct SerdeHook;

impl StructureHook for SerdeHook {
    fn name(&self) -> &'static str {
        "serde"
    }

    fn is_applicable(&self, candidate: &StructureCandidate, _options: &RegisterOptions) -> bool {
        candidate.codec.is_some()
    }

    fn apply(
        &self,
        candidate: &StructureCandidate,
        options: RegisterOptions
    ) -> Result<StructureRegistration, StructureError> {
        let codec = candidate
            .codec
            .as_ref()
            .ok_or_else(|| StructureError::Definition(format!("{} is not serializable", candidate.type_name)))?;

        Ok(finish(candidate, options, candidate.default_identifier(), Base::from_codec(codec, Scope::Local)))
    }
}

/// Used by predicates that only know a `TypeId`
pub(crate) fn is_instance_of(native: &Native, expected: TypeId) -> bool {
    let inner: &dyn Any = &**native;
    inner.type_id() == expected
}
