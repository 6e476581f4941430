use attrguard_core::{
    AccessError, Args, AttributePolicy, AttributeRole, AttributeSpec, ClassPolicy,
    ConfigurationError, DomainClass, ManagedAttribute, PolicyMode, PolicyRegistry, StorageMode,
    ValidationError, Value, Violation,
};
use std::rc::Rc;

const CARDHOLDER_POLICY: &str = r#"{
  "classes": {
    "CardHolder": {
      "access": { "mode": "deny", "names": ["addr"] },
      "attributes": {
        "acct": {
          "storage": "per_instance",
          "validators": [
            { "rule": "normalize", "steps": [{ "op": "replace", "from": "-", "to": "" }] },
            { "rule": "exact_length_of", "key": "acctlen" },
            { "rule": "pattern", "pattern": "[0-9]+" }
          ],
          "view": { "kind": "mask", "hidden": 3 }
        },
        "name": {
          "validators": [
            { "rule": "kind", "kind": "str" },
            { "rule": "normalize", "steps": [{ "op": "lowercase" }, { "op": "replace", "from": " ", "to": "_" }] }
          ]
        },
        "age": {
          "storage": "per_instance",
          "validators": [{ "rule": "range", "min": 0, "max": 150 }]
        },
        "remain": {
          "role": "derived",
          "compute": { "op": "difference", "minuend": "retireage", "subtrahend": "age" }
        }
      }
    },
    "Client": {
      "attributes": {
        "x": { "storage": "shared", "view": { "kind": "square" } }
      }
    }
  }
}"#;

fn cardholder() -> Rc<DomainClass> {
    DomainClass::builder("CardHolder")
        .field("acct")
        .field("name")
        .field("age")
        .field("addr")
        .class_data("acctlen", 8)
        .class_data("retireage", 59.5)
        .build()
}

#[test]
fn loads_declarations_from_json() {
    let registry = PolicyRegistry::from_json_str(CARDHOLDER_POLICY).unwrap();
    assert_eq!(registry.class_names(), vec!["CardHolder", "Client"]);

    let policy = registry.class_policy("CardHolder").unwrap();
    let access = policy.access.as_ref().unwrap();
    assert_eq!(access.mode(), PolicyMode::Deny);
    assert!(access.names().contains("addr"));
    assert_eq!(policy.attributes.len(), 4);
    assert_eq!(policy.attributes["remain"].role, AttributeRole::Derived);
    assert_eq!(policy.attributes["name"].storage, StorageMode::PerInstance);
    assert_eq!(
        registry.class_policy("Client").unwrap().attributes["x"].storage,
        StorageMode::Shared
    );
}

#[test]
fn applied_registry_governs_plain_and_guarded_instances() {
    let registry = PolicyRegistry::from_json_str(CARDHOLDER_POLICY).unwrap();
    let class = cardholder();
    assert_eq!(registry.apply(&class).unwrap(), 4);

    let guarded = registry.guard(&class).unwrap();
    let mut bob = guarded
        .instantiate(Args::positional([
            Value::from("1234-5678"),
            Value::from("Bob Smith"),
            Value::Int(40),
            Value::from("123 main st"),
        ]))
        .unwrap();

    assert_eq!(bob.get("acct").unwrap(), Value::from("12345***"));
    assert_eq!(bob.get("name").unwrap(), Value::from("bob_smith"));
    assert!(bob.get("addr").expect_err("addr is private").is_policy_violation());

    assert!(bob.set("age", Value::Int(151)).unwrap_err().is_validation_error());
    assert!(bob
        .set("acct", Value::from("1234-567x"))
        .unwrap_err()
        .is_validation_error());
    assert!(bob.set("name", Value::Int(7)).unwrap_err().is_validation_error());
    assert_eq!(bob.get("age").unwrap(), Value::Int(40));
}

#[test]
fn declared_derived_attribute_tracks_state_and_is_read_only() {
    let registry = PolicyRegistry::from_json_str(CARDHOLDER_POLICY).unwrap();
    let class = cardholder();
    registry.apply(&class).unwrap();
    let mut bob = registry
        .guard(&class)
        .unwrap()
        .instantiate(Args::positional([
            Value::from("1234-5678"),
            Value::from("Bob Smith"),
            Value::Int(40),
            Value::from("123 main st"),
        ]))
        .unwrap();

    assert_eq!(bob.get("remain").unwrap(), Value::Float(19.5));
    bob.set("age", Value::Int(50)).unwrap();
    assert_eq!(bob.get("remain").unwrap(), Value::Float(9.5));

    let err = bob
        .set("remain", Value::Int(1))
        .expect_err("remain is read-only");
    assert!(matches!(
        err,
        AccessError::Validation(ValidationError {
            violation: Violation::ReadOnly,
            ..
        })
    ));
    assert!(bob.delete("remain").unwrap_err().is_validation_error());
}

#[test]
fn shadowing_slot_key_is_rejected_before_anything_binds() {
    let raw = r#"{"classes": {"Pair": {"attributes": {"a": {}, "b": {"slot_key": "b"}}}}}"#;
    assert_eq!(
        PolicyRegistry::from_json_str(raw).unwrap_err(),
        ConfigurationError::SlotKeyShadowsName("b".to_string())
    );

    let registry = PolicyRegistry::new().with_class(
        "Pair",
        ClassPolicy::new()
            .attribute("a", AttributeSpec::new(StorageMode::PerInstance))
            .attribute(
                "b",
                AttributeSpec::new(StorageMode::PerInstance).slot_key("b"),
            ),
    );
    let class = DomainClass::builder("Pair").build();
    assert!(registry.apply(&class).is_err());
    assert!(class.managed_names().is_empty());
}

#[test]
fn failed_apply_leaves_class_untouched_and_can_be_retried() {
    let registry = PolicyRegistry::new().with_class(
        "Pair",
        ClassPolicy::new()
            .attribute("a", AttributeSpec::new(StorageMode::PerInstance))
            .attribute("b", AttributeSpec::new(StorageMode::Shared)),
    );
    let class = DomainClass::builder("Pair").build();
    class.bind(ManagedAttribute::per_instance("b")).unwrap();

    let err = registry.apply(&class).expect_err("b is already bound");
    assert_eq!(
        err,
        ConfigurationError::DuplicateBinding {
            class: "Pair".to_string(),
            attribute: "b".to_string(),
        }
    );
    assert_eq!(class.managed_names(), vec!["b".to_string()]);

    let fresh = DomainClass::builder("Pair").build();
    assert_eq!(registry.apply(&fresh).unwrap(), 2);
    assert_eq!(
        fresh.managed_names(),
        vec!["a".to_string(), "b".to_string()]
    );
}

#[test]
fn shared_declaration_squares_across_instances() {
    let registry = PolicyRegistry::from_json_str(CARDHOLDER_POLICY).unwrap();
    let client = DomainClass::builder("Client").build();
    registry.apply(&client).unwrap();

    let mut a = client.instantiate(Args::new()).unwrap();
    let b = client.instantiate(Args::new()).unwrap();
    a.set("x", Value::Int(5)).unwrap();
    assert_eq!(b.get("x").unwrap(), Value::Int(25));

    let err = registry.guard(&client).expect_err("no access section");
    assert!(matches!(err, ConfigurationError::MissingAccessPolicy(_)));
}

#[test]
fn applying_after_instantiation_is_a_configuration_error() {
    let registry = PolicyRegistry::from_json_str(CARDHOLDER_POLICY).unwrap();
    let class = cardholder();
    let _early = class
        .instantiate(Args::positional(["a", "b", "c", "d"]))
        .unwrap();

    let err = registry.apply(&class).expect_err("late apply");
    assert!(matches!(err, ConfigurationError::LateBinding { .. }));
    assert!(class.managed_names().is_empty());
}

#[test]
fn invalid_documents_are_rejected_at_load() {
    let inverted = r#"{"classes": {"P": {"attributes": {"age": {"validators": [{"rule": "range", "min": 10, "max": 1}]}}}}}"#;
    assert!(matches!(
        PolicyRegistry::from_json_str(inverted),
        Err(ConfigurationError::InvalidRange { .. })
    ));

    let bad_name = r#"{"classes": {"P": {"attributes": {"1age": {}}}}}"#;
    assert_eq!(
        PolicyRegistry::from_json_str(bad_name).unwrap_err(),
        ConfigurationError::InvalidName("1age".to_string())
    );

    let bad_rule = r#"{"classes": {"P": {"attributes": {"age": {"validators": [{"rule": "between"}]}}}}}"#;
    assert!(matches!(
        PolicyRegistry::from_json_str(bad_rule),
        Err(ConfigurationError::Parse(_))
    ));
}

#[test]
fn empty_allow_list_is_accepted() {
    let registry = PolicyRegistry::new().with_class(
        "Sealed",
        ClassPolicy::new().access(AttributePolicy::public(Vec::<String>::new())),
    );
    let class = DomainClass::builder("Sealed").field("secret").build();
    let guarded = registry.guard(&class).unwrap();
    let sealed = guarded.instantiate(Args::positional([1])).unwrap();

    assert!(sealed.get("secret").is_err());
    assert!(guarded.policy().is_degenerate());
}
