use rand::Rng;

use clusterop_model::selector::{Fields, default_fields};
use clusterop_model::validation::{ValidateNameFn, name_is_dns_subdomain};
use clusterop_model::{FieldErrorList, FieldSelector, LabelSelector, ObjectMeta, ResourceObject, Spec};

/// generated names are at most 63 chars: truncated prefix plus random suffix
pub const MAX_GENERATED_PREFIX_LENGTH: usize = 58;
pub const RANDOM_SUFFIX_LENGTH: usize = 5;
/// attempts at a fresh generated name before giving up with AlreadyExists
pub const MAX_NAME_GENERATION_ATTEMPTS: usize = 7;

/// no vowels so generated names never spell words
const SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// type specific behavior plugged into the generic store
pub trait Strategy<S: Spec>: Send + Sync + 'static {
    fn namespace_scoped(&self) -> bool;

    /// fresh empty object of this type
    fn new_object(&self) -> ResourceObject<S> {
        ResourceObject::new(ObjectMeta::default(), S::default())
    }

    /// defaulting before validation on create
    fn prepare_for_create(&self, obj: &mut ResourceObject<S>);

    /// defaulting before validation on update, `old` is the stored object
    fn prepare_for_update(&self, obj: &mut ResourceObject<S>, old: &ResourceObject<S>);

    fn validate_create(&self, obj: &ResourceObject<S>) -> FieldErrorList;

    fn validate_update(&self, obj: &ResourceObject<S>, old: &ResourceObject<S>) -> FieldErrorList;

    fn validate_name(&self) -> ValidateNameFn {
        name_is_dns_subdomain
    }

    fn generate_name(&self, base: &str) -> String {
        SimpleNameGenerator.generate_name(base)
    }

    fn allow_create_on_update(&self) -> bool {
        false
    }

    /// updates without a resource version overwrite the latest stored object
    fn allow_unconditional_update(&self) -> bool {
        true
    }

    /// none disables graceful deletion for the type
    fn default_grace_period_seconds(&self, _obj: &ResourceObject<S>) -> Option<i64> {
        None
    }

    /// fields visible to field selectors
    fn fields(&self, obj: &ResourceObject<S>) -> Fields {
        default_fields(obj, self.namespace_scoped())
    }
}

/// derives names from a prefix plus 5 random chars
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNameGenerator;

impl SimpleNameGenerator {
    pub fn generate_name(&self, base: &str) -> String {
        let prefix: String = base.chars().take(MAX_GENERATED_PREFIX_LENGTH).collect();
        let mut rng = rand::thread_rng();
        let suffix: String = (0..RANDOM_SUFFIX_LENGTH)
            .map(|_| SUFFIX_ALPHABET[rng.gen_range(0..SUFFIX_ALPHABET.len())] as char)
            .collect();
        format!("{prefix}{suffix}")
    }
}

/// label and field filter applied to objects returned by list and watch
#[derive(Debug, Clone, Default)]
pub struct SelectionPredicate {
    pub label: LabelSelector,
    pub field: FieldSelector,
}

impl SelectionPredicate {
    pub fn new(label: LabelSelector, field: FieldSelector) -> Self {
        Self { label, field }
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_empty() && self.field.is_empty()
    }

    pub fn matches<S: Spec>(&self, obj: &ResourceObject<S>, strategy: &dyn Strategy<S>) -> bool {
        if !self.label.matches(&obj.metadata.labels) {
            return false;
        }
        self.field.is_empty() || self.field.matches(&strategy.fields(obj))
    }
}

#[cfg(test)]
mod test {
    use clusterop_model::fixture::{TestObject, TestSpec};
    use clusterop_model::{FieldErrorList, FieldSelector, LabelSelector, ObjectMeta};

    use super::{SelectionPredicate, SimpleNameGenerator, Strategy};

    struct Plain;

    impl Strategy<TestSpec> for Plain {
        fn namespace_scoped(&self) -> bool {
            true
        }

        fn prepare_for_create(&self, _obj: &mut TestObject) {}

        fn prepare_for_update(&self, _obj: &mut TestObject, _old: &TestObject) {}

        fn validate_create(&self, _obj: &TestObject) -> FieldErrorList {
            FieldErrorList::new()
        }

        fn validate_update(&self, _obj: &TestObject, _old: &TestObject) -> FieldErrorList {
            FieldErrorList::new()
        }
    }

    #[test]
    fn test_generated_name() {
        let name = SimpleNameGenerator.generate_name("foo");

        assert_eq!(name.len(), 8);
        assert!(name.starts_with("foo"));
        assert!(name[3..].chars().all(|c| "bcdfghjklmnpqrstvwxz2456789".contains(c)));
    }

    #[test]
    fn test_generated_name_truncates_prefix() {
        let base = "a".repeat(100);

        let name = SimpleNameGenerator.generate_name(&base);

        assert_eq!(name.len(), 63);
        assert!(name.starts_with(&"a".repeat(58)));
    }

    #[test]
    fn test_predicate() {
        let obj = TestObject::new(
            ObjectMeta::new("foo", "ns1").set_labels(vec![("app", "web")]),
            TestSpec::default(),
        );

        let by_label = SelectionPredicate::new(
            "app=web".parse::<LabelSelector>().expect("parse"),
            FieldSelector::everything(),
        );
        assert!(by_label.matches(&obj, &Plain));

        let by_field = SelectionPredicate::new(
            LabelSelector::everything(),
            "metadata.namespace=ns2".parse::<FieldSelector>().expect("parse"),
        );
        assert!(!by_field.matches(&obj, &Plain));

        assert!(SelectionPredicate::default().is_empty());
        assert!(SelectionPredicate::default().matches(&obj, &Plain));
    }
}
