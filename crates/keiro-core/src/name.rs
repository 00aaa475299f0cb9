//! String newtypes used as identifiers.

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier.
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self::new(s)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type!(
    /// Name of a node, unique within its graph.
    ///
    /// # Examples
    ///
    /// ```
    /// use keiro_core::NodeName;
    ///
    /// let name = NodeName::new("extract");
    /// assert_eq!(name.as_str(), "extract");
    ///
    /// let name: NodeName = "detect".into();
    /// assert_eq!(name.to_string(), "detect");
    /// ```
    NodeName
);

name_type!(
    /// Identifier of a stored graph definition.
    GraphId
);

name_type!(
    /// Identifier of a single run.
    RunId
);

impl GraphId {
    /// Generates a fresh random graph id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl RunId {
    /// Generates a fresh random run id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}
