pub use uri::{InvalidUriError, Uri};

mod uri {
    use std::fmt::Display;
    use std::str::FromStr;

    use axum::http;
    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    #[derive(Debug, Error)]
    pub struct InvalidUriError(String);

    impl Display for InvalidUriError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl From<http::uri::InvalidUri> for InvalidUriError {
        fn from(value: http::uri::InvalidUri) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    impl From<http::uri::InvalidUriParts> for InvalidUriError {
        fn from(value: http::uri::InvalidUriParts) -> Self {
            InvalidUriError(value.to_string())
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Hash)]
    pub struct Uri(http::Uri);

    impl Uri {
        pub fn new(uri: http::Uri) -> Self {
            Self(uri)
        }

        pub fn from_static(src: &'static str) -> Self {
            Self(http::Uri::from_static(src))
        }

        /// Host part of the URI, if any
        pub fn host(&self) -> Option<&str> {
            self.0.host()
        }

        /// Explicit port, or the default port for the URI scheme
        pub fn port_or_default(&self) -> Option<u16> {
            self.0.port_u16().or_else(|| match self.0.scheme_str() {
                Some("http") => Some(80),
                Some("https") => Some(443),
                Some("mqtt") => Some(1883),
                Some("mqtts") => Some(8883),
                _ => None,
            })
        }

        /// Whether the URI includes a scheme and an authority
        pub fn is_absolute(&self) -> bool {
            self.0.scheme().is_some() && self.0.authority().is_some()
        }

        pub fn from_parts(
            base_uri: Uri,
            path: &str,
            query: Option<&str>,
        ) -> Result<Self, InvalidUriError> {
            let path_and_query = if let Some(qs) = query {
                http::uri::PathAndQuery::from_maybe_shared(format!("{path}?{qs}",))?
            } else {
                http::uri::PathAndQuery::from_str(path)?
            };
            let mut parts = base_uri.0.into_parts();
            parts.path_and_query = Some(path_and_query);

            Ok(http::Uri::from_parts(parts).map(Self::new)?)
        }

        /// Resolve `target` against this URI
        ///
        /// Absolute targets are returned as is, anything else is taken as a
        /// path (and optional query) on this URI's authority.
        pub fn resolve(&self, target: &str) -> Result<Self, InvalidUriError> {
            if let Ok(uri) = target.parse::<Uri>()
                && uri.is_absolute()
            {
                return Ok(uri);
            }

            let target = if target.starts_with('/') {
                target.to_owned()
            } else {
                format!("/{target}")
            };
            let (path, query) = match target.split_once('?') {
                Some((path, query)) => (path, Some(query)),
                None => (target.as_str(), None),
            };
            Self::from_parts(self.clone(), path, query)
        }
    }

    impl Display for Uri {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            self.0.fmt(f)
        }
    }

    impl FromStr for Uri {
        type Err = InvalidUriError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Ok(http::Uri::from_str(s).map(Self::new)?)
        }
    }

    impl TryFrom<String> for Uri {
        type Error = InvalidUriError;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            Ok(Self(http::Uri::from_maybe_shared(value)?))
        }
    }

    impl From<http::Uri> for Uri {
        fn from(value: http::Uri) -> Self {
            Self(value)
        }
    }

    impl From<Uri> for http::Uri {
        fn from(value: Uri) -> Self {
            value.0
        }
    }

    impl Serialize for Uri {
        fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: serde::Serializer,
        {
            serializer.serialize_str(&self.to_string())
        }
    }

    impl<'de> Deserialize<'de> for Uri {
        fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
        where
            D: serde::Deserializer<'de>,
        {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(serde::de::Error::custom)
        }
    }

}
