//! Server identity and the per-request decision whether to disclose it

use crate::config::disclosure_enabled;
use http::HeaderMap;
use std::io;

/// Request header that overrides the process-wide disclosure default
pub const SEND_SERVER_HOSTNAME_HEADER: &str = "x-send-server-hostname";

/// Outcome of looking up the host name at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Hostname {
    Known(String),
    /// Lookup failed; holds the error text
    Unknown(String),
}

impl Hostname {
    /// Looks up the host name of this machine
    pub fn lookup() -> Self {
        match system_hostname() {
            Ok(name) => Hostname::Known(name),
            Err(e) => Hostname::Unknown(e.to_string()),
        }
    }

    pub fn known(&self) -> Option<&str> {
        match self {
            Hostname::Known(name) => Some(name),
            Hostname::Unknown(_) => None,
        }
    }
}

fn system_hostname() -> io::Result<String> {
    hostname::get()?.into_string().map_err(|name| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("host name is not valid UTF-8: {name:?}"),
        )
    })
}

/// Supplies the server identity and resolves disclosure per request
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    hostname: Hostname,
    disclose_by_default: bool,
}

impl IdentityProvider {
    pub fn new(hostname: Hostname, disclose_by_default: bool) -> Self {
        Self {
            hostname,
            disclose_by_default,
        }
    }

    /// Uses the machine's host name
    pub fn from_system(disclose_by_default: bool) -> Self {
        Self::new(Hostname::lookup(), disclose_by_default)
    }

    /// Resolves the identity for one request.
    ///
    /// A non-empty `X-Send-Server-Hostname` header replaces the default;
    /// only the value `false` (any case) disables disclosure.
    pub fn resolve(&self, headers: &HeaderMap) -> ServerIdentity<'_> {
        let disclose = match headers
            .get(SEND_SERVER_HOSTNAME_HEADER)
            .map(|v| String::from_utf8_lossy(v.as_bytes()))
        {
            Some(value) if !value.is_empty() => disclosure_enabled(&value),
            _ => self.disclose_by_default,
        };

        ServerIdentity {
            hostname: &self.hostname,
            disclose,
        }
    }
}

/// Identity as resolved for a single request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerIdentity<'a> {
    hostname: &'a Hostname,
    disclose: bool,
}

impl ServerIdentity<'_> {
    pub fn discloses(&self) -> bool {
        self.disclose
    }

    /// Host name to announce on a push stream, if any
    pub fn disclosed_hostname(&self) -> Option<&str> {
        if self.disclose {
            self.hostname.known()
        } else {
            None
        }
    }

    /// Introductory message for a duplex channel.
    ///
    /// Empty when disclosure is off.
    pub fn greeting(&self) -> String {
        if !self.disclose {
            return String::new();
        }
        match self.hostname {
            Hostname::Known(name) => format!("Request served by {name}"),
            Hostname::Unknown(err) => format!("Server hostname unknown: {err}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn headers_with_override(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            SEND_SERVER_HOSTNAME_HEADER,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn test_default_disclosure_applies_without_header() {
        let provider = IdentityProvider::new(Hostname::Known("node-a".into()), true);
        let identity = provider.resolve(&HeaderMap::new());

        assert!(identity.discloses());
        assert_eq!(identity.disclosed_hostname(), Some("node-a"));
        assert_eq!(identity.greeting(), "Request served by node-a");
    }

    #[test]
    fn test_header_disables_disclosure_case_insensitively() {
        let provider = IdentityProvider::new(Hostname::Known("node-a".into()), true);
        let identity = provider.resolve(&headers_with_override("FALSE"));

        assert!(!identity.discloses());
        assert_eq!(identity.disclosed_hostname(), None);
        assert_eq!(identity.greeting(), "");
    }

    #[test]
    fn test_header_enables_disclosure_over_default() {
        let provider = IdentityProvider::new(Hostname::Known("node-a".into()), false);

        assert!(!provider.resolve(&HeaderMap::new()).discloses());
        assert!(provider.resolve(&headers_with_override("true")).discloses());
        assert!(provider.resolve(&headers_with_override("anything")).discloses());
    }

    #[test]
    fn test_empty_header_keeps_default() {
        let provider = IdentityProvider::new(Hostname::Known("node-a".into()), false);
        assert!(!provider.resolve(&headers_with_override("")).discloses());
    }

    #[test]
    fn test_unknown_hostname_greeting() {
        let provider = IdentityProvider::new(Hostname::Unknown("no such host".into()), true);
        let identity = provider.resolve(&HeaderMap::new());

        assert_eq!(identity.disclosed_hostname(), None);
        assert_eq!(identity.greeting(), "Server hostname unknown: no such host");
    }

    #[test]
    fn test_system_lookup_returns_name() {
        if let Hostname::Known(name) = Hostname::lookup() {
            assert!(!name.is_empty());
        }
    }
}
