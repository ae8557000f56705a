//! Structures every registry knows without being told

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    domain::definition::{PortKind, Scope},
    structure::{
        hooks::{Base, finish},
        registration::{RegisterOptions, Structure, StructureCandidate, StructureRegistration}
    }
};

impl Structure for i64 {
    fn candidate() -> StructureCandidate {
        StructureCandidate::serde::<i64>().identified_as("int").with_kind(PortKind::Int).with_scope(Scope::Global)
    }
}

impl Structure for f64 {
    fn candidate() -> StructureCandidate {
        StructureCandidate::serde::<f64>().identified_as("float").with_kind(PortKind::Float).with_scope(Scope::Global)
    }
}

impl Structure for bool {
    fn candidate() -> StructureCandidate {
        StructureCandidate::serde::<bool>().identified_as("bool").with_kind(PortKind::Bool).with_scope(Scope::Global)
    }
}

impl Structure for String {
    fn candidate() -> StructureCandidate {
        StructureCandidate::serde::<String>().identified_as("str").with_kind(PortKind::String).with_scope(Scope::Global)
    }
}

impl Structure for DateTime<Utc> {
    fn candidate() -> StructureCandidate {
        StructureCandidate::serde::<DateTime<Utc>>()
            .identified_as("date")
            .with_kind(PortKind::Date)
            .with_scope(Scope::Global)
    }
}

impl Structure for Value {
    fn candidate() -> StructureCandidate {
        StructureCandidate::serde::<Value>().identified_as("json").with_kind(PortKind::Dict).with_scope(Scope::Local)
    }
}

fn by_value(candidate: StructureCandidate) -> Option<StructureRegistration> {
    let codec = candidate.codec.as_ref()?;
    let base = Base::from_codec(codec, Scope::Local);
    Some(finish(&candidate, RegisterOptions::default(), candidate.default_identifier(), base))
}

/// Registrations seeded into every new registry
pub(crate) fn registrations() -> Vec<StructureRegistration> {
    [
        i64::candidate(),
        f64::candidate(),
        bool::candidate(),
        String::candidate(),
        <DateTime<Utc>>::candidate(),
        Value::candidate()
    ]
    .into_iter()
    .filter_map(by_value)
    .collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::TimeZone;
    use serde_json::json;

    use super::*;
    use crate::port::collector::Native;

    fn registration(identifier: &str) -> StructureRegistration {
        registrations().into_iter().find(|r| r.identifier == identifier).unwrap()
    }

    #[test]
    fn test_builtin_identifiers() {
        let identifiers: Vec<_> = registrations().into_iter().map(|r| r.identifier).collect();
        assert_eq!(identifiers, vec!["int", "float", "bool", "str", "date", "json"]);
    }

    #[tokio::test]
    async fn test_builtins_round_trip() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 12, 30, 0).unwrap();
        let samples: Vec<(&str, Native)> = vec![
            ("int", Arc::new(42i64) as Native),
            ("float", Arc::new(0.25f64) as Native),
            ("bool", Arc::new(true) as Native),
            ("str", Arc::new("hello".to_string()) as Native),
            ("date", Arc::new(at) as Native),
            ("json", Arc::new(json!({"nested": [1, 2, 3]})) as Native),
        ];

        for (identifier, native) in samples {
            let registration = registration(identifier);
            let wire = (registration.shrink)(native.clone()).await.unwrap();
            let expanded = (registration.expand)(wire.clone()).await.unwrap();
            let again = (registration.shrink)(expanded).await.unwrap();
            assert_eq!(wire, again, "{} did not survive a round trip", identifier);
        }
    }

    #[tokio::test]
    async fn test_int_rejects_strings() {
        let err = (registration("int").expand)(json!("4")).await.unwrap_err();
        assert!(err.message.contains("cannot expand"));
    }

    #[test]
    fn test_primitive_scopes() {
        assert_eq!(registration("int").scope, Scope::Global);
        assert_eq!(registration("json").scope, Scope::Local);
        assert_eq!(registration("date").kind, PortKind::Date);
    }
}
