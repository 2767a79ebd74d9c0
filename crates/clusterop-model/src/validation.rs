use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::meta::ObjectMeta;

pub const DNS1123_LABEL_MAX_LENGTH: usize = 63;
pub const DNS1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
pub const QUALIFIED_NAME_MAX_LENGTH: usize = 63;
pub const LABEL_VALUE_MAX_LENGTH: usize = 63;

const DNS1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const QUALIFIED_NAME_FMT: &str = "([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]";

static DNS1123_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{DNS1123_LABEL_FMT}$")).expect("label regex"));

static DNS1123_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!("^{DNS1123_LABEL_FMT}(\\.{DNS1123_LABEL_FMT})*$")).expect("subdomain regex")
});

static QUALIFIED_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!("^{QUALIFIED_NAME_FMT}$")).expect("qualified name regex"));

/// validates a name, `prefix` is true when checking a generateName prefix
pub type ValidateNameFn = fn(&str, bool) -> Vec<String>;

/// path to a field inside an object, rendered as `spec.machineSets[0].name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath(String);

impl FieldPath {
    pub fn new(root: impl Into<String>) -> Self {
        Self(root.into())
    }

    pub fn child(&self, name: &str) -> Self {
        Self(format!("{}.{}", self.0, name))
    }

    pub fn index(&self, index: usize) -> Self {
        Self(format!("{}[{}]", self.0, index))
    }

    pub fn key(&self, key: &str) -> Self {
        Self(format!("{}[{}]", self.0, key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldErrorType {
    Required,
    Invalid,
    Duplicate,
    Forbidden,
    TooLong,
    NotSupported,
}

impl fmt::Display for FieldErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Required => "Required value",
            Self::Invalid => "Invalid value",
            Self::Duplicate => "Duplicate value",
            Self::Forbidden => "Forbidden",
            Self::TooLong => "Too long",
            Self::NotSupported => "Unsupported value",
        };
        write!(f, "{label}")
    }
}

/// single violation found while validating an object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub error_type: FieldErrorType,
    pub field: String,
    pub bad_value: Option<String>,
    pub detail: String,
}

impl FieldError {
    fn new(
        error_type: FieldErrorType,
        path: &FieldPath,
        bad_value: Option<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            error_type,
            field: path.to_string(),
            bad_value,
            detail: detail.into(),
        }
    }

    pub fn required(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorType::Required, path, None, detail)
    }

    pub fn invalid(path: &FieldPath, value: impl fmt::Display, detail: impl Into<String>) -> Self {
        Self::new(
            FieldErrorType::Invalid,
            path,
            Some(value.to_string()),
            detail,
        )
    }

    pub fn duplicate(path: &FieldPath, value: impl fmt::Display) -> Self {
        Self::new(
            FieldErrorType::Duplicate,
            path,
            Some(value.to_string()),
            "",
        )
    }

    pub fn forbidden(path: &FieldPath, detail: impl Into<String>) -> Self {
        Self::new(FieldErrorType::Forbidden, path, None, detail)
    }

    pub fn too_long(path: &FieldPath, max: usize) -> Self {
        Self::new(
            FieldErrorType::TooLong,
            path,
            None,
            format!("must have at most {max} bytes"),
        )
    }

    pub fn not_supported(path: &FieldPath, value: impl fmt::Display, valid: &[&str]) -> Self {
        Self::new(
            FieldErrorType::NotSupported,
            path,
            Some(value.to_string()),
            format!("supported values: {}", valid.join(", ")),
        )
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.error_type)?;
        if let Some(value) = &self.bad_value {
            write!(f, ": {value:?}")?;
        }
        if !self.detail.is_empty() {
            write!(f, ": {}", self.detail)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrorList(Vec<FieldError>);

impl FieldErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: FieldError) {
        self.0.push(error);
    }

    pub fn into_inner(self) -> Vec<FieldError> {
        self.0
    }
}

impl Deref for FieldErrorList {
    type Target = Vec<FieldError>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for FieldErrorList {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl From<Vec<FieldError>> for FieldErrorList {
    fn from(errors: Vec<FieldError>) -> Self {
        Self(errors)
    }
}

impl FromIterator<FieldError> for FieldErrorList {
    fn from_iter<T: IntoIterator<Item = FieldError>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for FieldErrorList {
    type Item = FieldError;
    type IntoIter = std::vec::IntoIter<FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl fmt::Display for FieldErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => Ok(()),
            [single] => write!(f, "{single}"),
            many => {
                let rendered: Vec<String> = many.iter().map(|e| e.to_string()).collect();
                write!(f, "[{}]", rendered.join(", "))
            }
        }
    }
}

fn max_len_error(length: usize) -> String {
    format!("must be no more than {length} characters")
}

pub fn is_dns1123_label(value: &str) -> Vec<String> {
    let mut errors = vec![];
    if value.len() > DNS1123_LABEL_MAX_LENGTH {
        errors.push(max_len_error(DNS1123_LABEL_MAX_LENGTH));
    }
    if !DNS1123_LABEL.is_match(value) {
        errors.push(format!(
            "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', \
             and must start and end with an alphanumeric character \
             (e.g. 'my-name', or '123-abc', regex used for validation is '{DNS1123_LABEL_FMT}')"
        ));
    }
    errors
}

pub fn is_dns1123_subdomain(value: &str) -> Vec<String> {
    let mut errors = vec![];
    if value.len() > DNS1123_SUBDOMAIN_MAX_LENGTH {
        errors.push(max_len_error(DNS1123_SUBDOMAIN_MAX_LENGTH));
    }
    if !DNS1123_SUBDOMAIN.is_match(value) {
        errors.push(format!(
            "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, \
             '-' or '.', and must start and end with an alphanumeric character \
             (e.g. 'example.com', regex used for validation is \
             '{DNS1123_LABEL_FMT}(\\.{DNS1123_LABEL_FMT})*')"
        ));
    }
    errors
}

/// `prefix/name` where prefix is optional dns subdomain
pub fn is_qualified_name(value: &str) -> Vec<String> {
    let mut errors = vec![];
    let name = match value.split_once('/') {
        Some((prefix, name)) => {
            if prefix.is_empty() {
                errors.push("prefix part must be non-empty".to_owned());
            } else {
                errors.extend(
                    is_dns1123_subdomain(prefix)
                        .into_iter()
                        .map(|msg| format!("prefix part {msg}")),
                );
            }
            name
        }
        None => value,
    };

    if name.is_empty() {
        errors.push("name part must be non-empty".to_owned());
    } else if name.len() > QUALIFIED_NAME_MAX_LENGTH {
        errors.push(format!(
            "name part {}",
            max_len_error(QUALIFIED_NAME_MAX_LENGTH)
        ));
    }
    if !name.is_empty() && !QUALIFIED_NAME.is_match(name) {
        errors.push(format!(
            "name part must consist of alphanumeric characters, '-', '_' or '.', \
             and must start and end with an alphanumeric character \
             (regex used for validation is '{QUALIFIED_NAME_FMT}')"
        ));
    }
    errors
}

pub fn is_valid_label_value(value: &str) -> Vec<String> {
    let mut errors = vec![];
    if value.len() > LABEL_VALUE_MAX_LENGTH {
        errors.push(max_len_error(LABEL_VALUE_MAX_LENGTH));
    }
    if !value.is_empty() && !QUALIFIED_NAME.is_match(value) {
        errors.push(format!(
            "a valid label must be an empty string or consist of alphanumeric characters, \
             '-', '_' or '.', and must start and end with an alphanumeric character \
             (regex used for validation is '{QUALIFIED_NAME_FMT}')"
        ));
    }
    errors
}

/// generated names get a random suffix, so a trailing dash is fine in a prefix
fn mask_trailing_dash(name: &str) -> String {
    if name.len() > 1 && name.ends_with('-') {
        format!("{}a", &name[..name.len() - 1])
    } else {
        name.to_owned()
    }
}

pub fn name_is_dns_subdomain(name: &str, prefix: bool) -> Vec<String> {
    if prefix {
        is_dns1123_subdomain(&mask_trailing_dash(name))
    } else {
        is_dns1123_subdomain(name)
    }
}

pub fn name_is_dns_label(name: &str, prefix: bool) -> Vec<String> {
    if prefix {
        is_dns1123_label(&mask_trailing_dash(name))
    } else {
        is_dns1123_label(name)
    }
}

pub fn validate_labels(labels: &BTreeMap<String, String>, path: &FieldPath) -> FieldErrorList {
    let mut errors = FieldErrorList::new();
    for (key, value) in labels {
        for msg in is_qualified_name(key) {
            errors.push(FieldError::invalid(path, key, msg));
        }
        for msg in is_valid_label_value(value) {
            errors.push(FieldError::invalid(path, value, msg));
        }
    }
    errors
}

/// checks identity and labels of an object about to be created
pub fn validate_object_meta(
    meta: &ObjectMeta,
    requires_namespace: bool,
    name_fn: ValidateNameFn,
    path: &FieldPath,
) -> FieldErrorList {
    let mut errors = FieldErrorList::new();

    if !meta.generate_name.is_empty() {
        for msg in name_fn(&meta.generate_name, true) {
            errors.push(FieldError::invalid(
                &path.child("generateName"),
                &meta.generate_name,
                msg,
            ));
        }
    }

    if meta.name.is_empty() {
        errors.push(FieldError::required(
            &path.child("name"),
            "name or generateName is required",
        ));
    } else {
        for msg in name_fn(&meta.name, false) {
            errors.push(FieldError::invalid(&path.child("name"), &meta.name, msg));
        }
    }

    if requires_namespace {
        if meta.namespace.is_empty() {
            errors.push(FieldError::required(&path.child("namespace"), ""));
        } else {
            for msg in is_dns1123_label(&meta.namespace) {
                errors.push(FieldError::invalid(
                    &path.child("namespace"),
                    &meta.namespace,
                    msg,
                ));
            }
        }
    } else if !meta.namespace.is_empty() {
        errors.push(FieldError::forbidden(
            &path.child("namespace"),
            "not allowed on this type",
        ));
    }

    errors.extend(validate_labels(&meta.labels, &path.child("labels")));
    errors
}

/// checks immutable identity fields did not change between old and new
pub fn validate_object_meta_update(
    new: &ObjectMeta,
    old: &ObjectMeta,
    path: &FieldPath,
) -> FieldErrorList {
    const IMMUTABLE: &str = "field is immutable";
    let mut errors = FieldErrorList::new();

    if new.name != old.name {
        errors.push(FieldError::invalid(&path.child("name"), &new.name, IMMUTABLE));
    }
    if new.namespace != old.namespace {
        errors.push(FieldError::invalid(
            &path.child("namespace"),
            &new.namespace,
            IMMUTABLE,
        ));
    }
    if new.uid != old.uid {
        errors.push(FieldError::invalid(&path.child("uid"), &new.uid, IMMUTABLE));
    }
    if new.creation_timestamp != old.creation_timestamp {
        errors.push(FieldError::invalid(
            &path.child("creationTimestamp"),
            format!("{:?}", new.creation_timestamp),
            IMMUTABLE,
        ));
    }
    if new.deletion_timestamp != old.deletion_timestamp {
        errors.push(FieldError::invalid(
            &path.child("deletionTimestamp"),
            format!("{:?}", new.deletion_timestamp),
            "field is immutable; may only be changed via deletion",
        ));
    }
    if new.deletion_grace_period_seconds != old.deletion_grace_period_seconds {
        errors.push(FieldError::invalid(
            &path.child("deletionGracePeriodSeconds"),
            format!("{:?}", new.deletion_grace_period_seconds),
            "field is immutable; may only be changed via deletion",
        ));
    }
    if new.generation < old.generation {
        errors.push(FieldError::invalid(
            &path.child("generation"),
            new.generation,
            "must not be decremented",
        ));
    }

    errors.extend(validate_labels(&new.labels, &path.child("labels")));
    errors
}

#[cfg(test)]
mod test {
    use super::*;

    fn meta_path() -> FieldPath {
        FieldPath::new("metadata")
    }

    #[test]
    fn test_dns_label() {
        assert!(is_dns1123_label("master").is_empty());
        assert!(is_dns1123_label("a-1").is_empty());
        assert!(!is_dns1123_label("-a").is_empty());
        assert!(!is_dns1123_label("Upper").is_empty());
        assert!(!is_dns1123_label("a.b").is_empty());
        assert!(!is_dns1123_label(&"a".repeat(64)).is_empty());
    }

    #[test]
    fn test_dns_subdomain() {
        assert!(is_dns1123_subdomain("foo").is_empty());
        assert!(is_dns1123_subdomain("foo.example.com").is_empty());
        assert!(!is_dns1123_subdomain("*BadName!").is_empty());
        assert!(!is_dns1123_subdomain("foo..bar").is_empty());
        assert!(!is_dns1123_subdomain(&"a".repeat(254)).is_empty());
    }

    #[test]
    fn test_generate_name_prefix() {
        assert!(name_is_dns_subdomain("foo-", true).is_empty());
        assert!(!name_is_dns_subdomain("foo-", false).is_empty());
        assert!(name_is_dns_label("foo", true).is_empty());
    }

    #[test]
    fn test_qualified_name() {
        assert!(is_qualified_name("app").is_empty());
        assert!(is_qualified_name("example.com/app").is_empty());
        assert!(!is_qualified_name("/app").is_empty());
        assert!(!is_qualified_name("example.com/").is_empty());
        assert!(!is_qualified_name("-app").is_empty());
        assert!(is_valid_label_value("").is_empty());
        assert!(!is_valid_label_value("bad value").is_empty());
    }

    #[test]
    fn test_object_meta_bad_name() {
        let meta = ObjectMeta::new("*BadName!", "default");

        let errors = validate_object_meta(&meta, true, name_is_dns_subdomain, &meta_path());

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, FieldErrorType::Invalid);
        assert_eq!(errors[0].field, "metadata.name");
        assert!(errors.to_string().starts_with("metadata.name: Invalid value: \"*BadName!\""));
    }

    #[test]
    fn test_object_meta_name_required() {
        let meta = ObjectMeta::default();

        let errors = validate_object_meta(&meta, false, name_is_dns_subdomain, &meta_path());

        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].error_type, FieldErrorType::Required);
    }

    #[test]
    fn test_object_meta_namespace_scope() {
        let cluster_scoped = ObjectMeta::new("foo", "default");
        let errors =
            validate_object_meta(&cluster_scoped, false, name_is_dns_subdomain, &meta_path());
        assert_eq!(errors[0].error_type, FieldErrorType::Forbidden);

        let missing = ObjectMeta::named("foo");
        let errors = validate_object_meta(&missing, true, name_is_dns_subdomain, &meta_path());
        assert_eq!(errors[0].field, "metadata.namespace");
    }

    #[test]
    fn test_object_meta_update_immutable() {
        let old = ObjectMeta {
            uid: "u1".to_owned(),
            ..ObjectMeta::new("foo", "default")
        };
        let mut new = old.clone();
        new.name = "bar".to_owned();
        new.uid = "u2".to_owned();

        let errors = validate_object_meta_update(&new, &old, &meta_path());

        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["metadata.name", "metadata.uid"]);
    }

    #[test]
    fn test_field_path() {
        let path = FieldPath::new("spec").child("machineSets").index(1).child("name");
        assert_eq!(path.as_str(), "spec.machineSets[1].name");
    }
}
