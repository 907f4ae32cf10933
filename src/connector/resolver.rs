use std::collections::HashMap;

use url::Url;

use crate::connector::auth::Credentials;
use crate::connector::config::CredentialsFile;
use crate::connector::error::ResolveError;

/// Resolution result: service base URL, credentials and static headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub url: String,
    pub credentials: Option<Credentials>,
    pub headers: Vec<(String, String)>,
}

impl Destination {
    pub fn new<U: Into<String>>(url: U) -> Self {
        Self {
            url: url.into(),
            credentials: None,
            headers: Vec::new(),
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

pub trait Resolver: Send + Sync {
    fn resolve(&self, service_id: &str) -> Result<Destination, ResolveError>;
}

impl<F> Resolver for F
where
    F: Fn(&str) -> Result<Destination, ResolveError> + Send + Sync,
{
    fn resolve(&self, service_id: &str) -> Result<Destination, ResolveError> {
        self(service_id)
    }
}

/// Fixed in-memory mapping.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    destinations: HashMap<String, Destination>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<S: Into<String>>(mut self, service_id: S, destination: Destination) -> Self {
        self.insert(service_id, destination);
        self
    }

    pub fn insert<S: Into<String>>(&mut self, service_id: S, destination: Destination) {
        self.destinations.insert(service_id.into(), destination);
    }
}

impl Resolver for StaticResolver {
    fn resolve(&self, service_id: &str) -> Result<Destination, ResolveError> {
        let destination = self
            .destinations
            .get(service_id)
            .cloned()
            .ok_or_else(|| ResolveError::UnknownService(service_id.to_string()))?;
        check_url(service_id, &destination.url)?;
        Ok(destination)
    }
}

/// Resolves services from a credentials file.
#[derive(Debug, Clone)]
pub struct ConfigResolver {
    file: CredentialsFile,
}

impl ConfigResolver {
    pub fn new(file: CredentialsFile) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &CredentialsFile {
        &self.file
    }
}

impl Resolver for ConfigResolver {
    fn resolve(&self, service_id: &str) -> Result<Destination, ResolveError> {
        let service = self
            .file
            .find(service_id)
            .ok_or_else(|| ResolveError::UnknownService(service_id.to_string()))?;
        check_url(service_id, &service.url)?;

        Ok(Destination {
            url: service.url.clone(),
            credentials: service.credentials(),
            headers: service
                .headers
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        })
    }
}

fn check_url(service_id: &str, url: &str) -> Result<(), ResolveError> {
    let invalid = |reason: String| ResolveError::InvalidUrl {
        service_id: service_id.to_string(),
        url: url.to_string(),
        reason,
    };

    let parsed = Url::parse(url).map_err(|err| invalid(err.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme `{}`", parsed.scheme())));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file() -> CredentialsFile {
        CredentialsFile::parse(
            r#"{ "services": [
                { "service_id": "tts", "url": "https://tts.example.com/api", "token": "t",
                  "headers": { "X-Watson-Learning-Opt-Out": "1" } },
                { "service_id": "broken", "url": "ftp://files.example.com" }
            ] }"#,
        )
        .expect("config parses")
    }

    #[test]
    fn config_resolver_builds_destination() {
        let resolver = ConfigResolver::new(file());
        let destination = resolver.resolve("tts").expect("tts resolves");
        assert_eq!(destination.url, "https://tts.example.com/api");
        assert_eq!(destination.credentials, Some(Credentials::token("t")));
        assert_eq!(
            destination.headers,
            vec![("X-Watson-Learning-Opt-Out".to_string(), "1".to_string())]
        );
    }

    #[test]
    fn unknown_service_is_rejected() {
        let resolver = ConfigResolver::new(file());
        assert_eq!(
            resolver.resolve("missing"),
            Err(ResolveError::UnknownService("missing".into()))
        );
    }

    #[test]
    fn non_http_scheme_is_rejected() {
        let resolver = ConfigResolver::new(file());
        assert!(matches!(
            resolver.resolve("broken"),
            Err(ResolveError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn closures_act_as_resolvers() {
        let resolver = |service_id: &str| {
            if service_id == "stt" {
                Ok(Destination::new("https://stt.example.com"))
            } else {
                Err(ResolveError::UnknownService(service_id.to_string()))
            }
        };
        assert!(resolver.resolve("stt").is_ok());
        assert!(resolver.resolve("tts").is_err());
    }

    #[test]
    fn static_resolver_validates_urls() {
        let resolver = StaticResolver::new().with("bad", Destination::new("not a url"));
        assert!(matches!(
            resolver.resolve("bad"),
            Err(ResolveError::InvalidUrl { .. })
        ));
    }
}
