use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// A fully-qualified name: the path of an object in the controller's naming
/// hierarchy, e.g. `default-domain:k8s-default:k8s-pod-network`.
///
/// Provisioned resources are always addressed by fq-name, so the same logical
/// resource maps to the same identity however many times it is provisioned.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FqName(Vec<String>);

impl FqName {
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(parts.into_iter().map(Into::into).collect())
    }

    /// Returns the fq-name of a child object named `name`.
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut parts = self.0.clone();
        parts.push(name.into());
        Self(parts)
    }

    /// The last element of the path.
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }

    pub fn parent(&self) -> Option<Self> {
        match self.0.split_last() {
            Some((_, rest)) if !rest.is_empty() => Some(Self(rest.to_vec())),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for FqName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join(":"))
    }
}

impl FromStr for FqName {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s.split(':').filter(|p| !p.is_empty())))
    }
}

impl<S: Into<String>> FromIterator<S> for FqName {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        Self::new(iter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_and_displays_colon_paths() {
        let fq = "default-domain:default-project:ip-fabric"
            .parse::<FqName>()
            .unwrap();
        assert_eq!(fq.as_slice().len(), 3);
        assert_eq!(fq.name(), "ip-fabric");
        assert_eq!(fq.to_string(), "default-domain:default-project:ip-fabric");
        assert_eq!(
            fq.parent(),
            Some(FqName::new(["default-domain", "default-project"]))
        );
    }

    #[test]
    fn children_extend_the_path() {
        let project = FqName::new(["default-domain", "k8s-default"]);
        let vn = project.child("k8s-default-pod-network");
        assert_eq!(vn.parent(), Some(project));
        assert_eq!(FqName::new(["only"]).parent(), None);
    }
}
