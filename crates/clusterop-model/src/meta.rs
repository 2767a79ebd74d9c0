use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::Spec;

fn is_zero(value: &i64) -> bool {
    *value == 0
}

/// metadata every persisted resource carries.
/// maps are ordered so encoding is deterministic
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub generate_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub uid: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub generation: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_grace_period_seconds: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new<S>(name: S, namespace: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn generated(prefix: impl Into<String>) -> Self {
        Self {
            generate_name: prefix.into(),
            ..Default::default()
        }
    }

    pub fn set_labels<T: Into<String>>(mut self, labels: Vec<(T, T)>) -> Self {
        for (key, value) in labels {
            self.labels.insert(key.into(), value.into());
        }
        self
    }

    /// resource version parsed as backend revision, 0 if not set
    pub fn revision(&self) -> Option<i64> {
        if self.resource_version.is_empty() {
            None
        } else {
            self.resource_version.parse().ok()
        }
    }

    pub fn is_being_deleted(&self) -> bool {
        self.deletion_timestamp.is_some()
    }
}

/// typed resource: type meta, object meta, spec and status
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "S: DeserializeOwned"))]
pub struct ResourceObject<S>
where
    S: Spec,
{
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    pub spec: S,
    #[serde(default)]
    pub status: S::Status,
}

impl<S> ResourceObject<S>
where
    S: Spec,
{
    pub fn new(metadata: ObjectMeta, spec: S) -> Self {
        Self {
            api_version: S::api_version(),
            kind: S::kind(),
            metadata,
            spec,
            status: S::Status::default(),
        }
    }

    pub fn with_status(mut self, status: S::Status) -> Self {
        self.status = status;
        self
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn resource_version(&self) -> &str {
        &self.metadata.resource_version
    }

    pub fn spec(&self) -> &S {
        &self.spec
    }

    pub fn status(&self) -> &S::Status {
        &self.status
    }

    /// stamp type meta from spec
    pub fn set_type_meta(&mut self) {
        self.api_version = S::api_version();
        self.kind = S::kind();
    }
}

impl<S> fmt::Display for ResourceObject<S>
where
    S: Spec,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.metadata.namespace.is_empty() {
            write!(f, "{} {}", S::kind(), self.metadata.name)
        } else {
            write!(
                f,
                "{} {}/{}",
                S::kind(),
                self.metadata.namespace,
                self.metadata.name
            )
        }
    }
}

/// scope of list and watch
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum NameSpace {
    #[default]
    All,
    Named(String),
}

impl NameSpace {
    pub fn is_all(&self) -> bool {
        matches!(self, Self::All)
    }

    pub fn named(&self) -> &str {
        match self {
            Self::All => "",
            Self::Named(name) => name,
        }
    }
}

impl From<String> for NameSpace {
    fn from(namespace: String) -> Self {
        if namespace.is_empty() {
            NameSpace::All
        } else {
            NameSpace::Named(namespace)
        }
    }
}

impl From<&str> for NameSpace {
    fn from(namespace: &str) -> Self {
        namespace.to_owned().into()
    }
}

impl fmt::Display for NameSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "*"),
            Self::Named(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListMeta {
    /// backend revision the list was taken at
    #[serde(default)]
    pub resource_version: String,
    #[serde(default, rename = "continue", skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remaining_item_count: Option<i64>,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(bound(deserialize = "S: DeserializeOwned"))]
pub struct ResourceList<S>
where
    S: Spec,
{
    #[serde(default)]
    pub metadata: ListMeta,
    pub items: Vec<ResourceObject<S>>,
}

impl<S> ResourceList<S>
where
    S: Spec,
{
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.name()).collect()
    }
}

#[cfg(test)]
mod test {
    use crate::fixture::{TestObject, TestSpec};

    use super::{NameSpace, ObjectMeta};

    #[test]
    fn test_meta_empty_fields_skipped() {
        let obj = TestObject::new(ObjectMeta::new("t1", "default"), TestSpec { replica: 2 });

        let json = serde_json::to_string(&obj).expect("serialized");

        assert_eq!(
            json,
            r#"{"apiVersion":"test.clusterop/v1","kind":"Test","metadata":{"name":"t1","namespace":"default"},"spec":{"replica":2},"status":{"up":false}}"#
        );
    }

    #[test]
    fn test_meta_labels_ordered() {
        let meta = ObjectMeta::named("t1").set_labels(vec![("b", "2"), ("a", "1")]);

        let yaml = serde_yaml::to_string(&meta).expect("serialized");

        assert_eq!(
            yaml,
            r#"name: t1
labels:
  a: '1'
  b: '2'
"#
        );
    }

    #[test]
    fn test_revision() {
        let mut meta = ObjectMeta::named("t1");
        assert_eq!(meta.revision(), None);
        meta.resource_version = "42".to_owned();
        assert_eq!(meta.revision(), Some(42));
    }

    #[test]
    fn test_namespace_from_str() {
        assert_eq!(NameSpace::from(""), NameSpace::All);
        assert_eq!(NameSpace::from("ns1"), NameSpace::Named("ns1".to_owned()));
        assert_eq!(NameSpace::from("ns1").named(), "ns1");
    }
}
