use clusterop_model::NameSpace;

use crate::error::ApiError;

/// maps objects to backend keys: `/<storage prefix>/<resource prefix>/<namespace>/<name>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyLayout {
    root: String,
    namespace_scoped: bool,
}

impl KeyLayout {
    pub fn new(storage_prefix: &str, resource_prefix: &str, namespace_scoped: bool) -> Self {
        let segments: Vec<&str> = storage_prefix
            .split('/')
            .chain(resource_prefix.split('/'))
            .filter(|segment| !segment.is_empty())
            .collect();
        Self {
            root: format!("/{}", segments.join("/")),
            namespace_scoped,
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn object_key(&self, namespace: &str, name: &str) -> Result<String, ApiError> {
        if name.is_empty() {
            return Err(ApiError::BadRequest("name parameter required".to_owned()));
        }
        check_segment(name)?;
        if !self.namespace_scoped {
            return Ok(format!("{}/{}", self.root, name));
        }
        if namespace.is_empty() {
            return Err(ApiError::BadRequest(
                "namespace parameter required".to_owned(),
            ));
        }
        check_segment(namespace)?;
        Ok(format!("{}/{}/{}", self.root, namespace, name))
    }

    /// prefix covering every key in scope, always terminated by `/`
    pub fn scope_prefix(&self, namespace: &NameSpace) -> Result<String, ApiError> {
        match namespace {
            NameSpace::Named(ns) if self.namespace_scoped => {
                check_segment(ns)?;
                Ok(format!("{}/{}/", self.root, ns))
            }
            _ => Ok(format!("{}/", self.root)),
        }
    }
}

fn check_segment(segment: &str) -> Result<(), ApiError> {
    if segment == "." || segment == ".." {
        return Err(ApiError::BadRequest(format!(
            "{segment:?} is not a valid path segment"
        )));
    }
    if segment.contains('/') || segment.contains('%') {
        return Err(ApiError::BadRequest(format!(
            "{segment:?} may not contain '/' or '%'"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use clusterop_model::NameSpace;

    use super::KeyLayout;

    #[test]
    fn test_namespaced_keys() {
        let layout = KeyLayout::new("", "clusters", true);

        assert_eq!(
            layout.object_key("default", "foo").expect("key"),
            "/clusters/default/foo"
        );
        assert_eq!(
            layout.scope_prefix(&NameSpace::All).expect("prefix"),
            "/clusters/"
        );
        assert_eq!(
            layout.scope_prefix(&"test".into()).expect("prefix"),
            "/clusters/test/"
        );
        assert!(layout.object_key("", "foo").unwrap_err().is_bad_request());
    }

    #[test]
    fn test_cluster_scoped_keys() {
        let layout = KeyLayout::new("/registry/", "/nodes", false);

        assert_eq!(layout.root(), "/registry/nodes");
        assert_eq!(
            layout.object_key("ignored", "n1").expect("key"),
            "/registry/nodes/n1"
        );
        assert_eq!(
            layout.scope_prefix(&"ignored".into()).expect("prefix"),
            "/registry/nodes/"
        );
    }

    #[test]
    fn test_reject_bad_segments() {
        let layout = KeyLayout::new("", "clusters", true);

        assert!(layout.object_key("default", "a/b").is_err());
        assert!(layout.object_key("..", "foo").is_err());
        assert!(layout.object_key("default", "").is_err());
    }
}
