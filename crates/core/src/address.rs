//! Resource addressing
//!
//! Builds request URLs from the server endpoint, a container (`sessions`,
//! `objects`, `files`, ...), an optional resource id and optional query items.

use crate::error::{Error, Result};
use crate::value::Params;

/// Base path of the automation API on the server
pub const DEFAULT_BASE_PATH: &str = "stcapi";

/// Query items appended to a resource URL
#[derive(Debug, Clone, PartialEq)]
pub enum Query {
    /// Structured `key=value&...` items
    Pairs(Params),
    /// Bare tokens, encoded as `?a&b&c` with no `=`; the server reads them as flags
    Flags(Vec<String>),
}

impl Query {
    pub fn flags<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Flags(items.into_iter().map(Into::into).collect())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Query::Pairs(p) => p.is_empty(),
            Query::Flags(f) => f.is_empty(),
        }
    }

    /// Query string including the leading `?`, or empty when there are no items
    pub fn to_query_string(&self) -> String {
        if self.is_empty() {
            return String::new();
        }
        match self {
            Query::Pairs(p) => format!("?{}", p.to_form()),
            Query::Flags(f) => {
                let tokens: Vec<String> = f.iter().map(|t| quote(t)).collect();
                format!("?{}", tokens.join("&"))
            }
        }
    }
}

/// Percent-encode a path, leaving `/` separators intact
pub fn quote(s: &str) -> String {
    s.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

fn unquote(s: &str) -> String {
    urlencoding::decode(s)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| s.to_string())
}

/// Server endpoint: scheme, host, port and base path. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    base: String,
}

impl Endpoint {
    /// Build an endpoint of the form `scheme://host:port/base_path`
    pub fn new(scheme: &str, host: &str, port: u16, base_path: &str) -> Result<Self> {
        if host.trim().is_empty() {
            return Err(Error::Config("server address is empty".to_string()));
        }
        if port == 0 {
            return Err(Error::Config("invalid port value".to_string()));
        }
        let base_path = base_path.trim_matches('/');
        let base = if base_path.is_empty() {
            format!("{scheme}://{host}:{port}")
        } else {
            format!("{scheme}://{host}:{port}/{base_path}")
        };
        Ok(Self {
            host: host.to_string(),
            port,
            base,
        })
    }

    /// Parse a full base URL such as `http://host/stcapi`
    pub fn parse(base_url: &str) -> Result<Self> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| Error::Config(format!("invalid server URL '{base_url}': {e}")))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| Error::Config(format!("server URL has no host: {base_url}")))?
            .to_string();
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| Error::Config(format!("server URL has no port: {base_url}")))?;
        Ok(Self {
            host,
            port,
            base: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    /// Join base URL, container and encoded resource with single slashes.
    ///
    /// A missing container is skipped; a missing resource leaves a trailing
    /// slash, e.g. `make_url(Some("objects"), None, None)` is `<base>/objects/`.
    pub fn make_url(
        &self,
        container: Option<&str>,
        resource: Option<&str>,
        query: Option<&Query>,
    ) -> String {
        let mut parts = vec![self.base.clone()];
        if let Some(c) = container.filter(|c| !c.is_empty()) {
            parts.push(c.to_string());
        }
        let mut last = resource.map(quote).unwrap_or_default();
        if let Some(q) = query {
            last.push_str(&q.to_query_string());
        }
        parts.push(last);
        parts.join("/")
    }

    pub fn resource_to_url(&self, resource: &str) -> String {
        format!("{}/{}", self.base, quote(resource))
    }

    /// Recover the resource id from a URL produced by `make_url`
    pub fn url_to_resource(&self, url: &str) -> String {
        let tail = match url.split_once(self.base.as_str()) {
            Some((_, rest)) => rest,
            None => url,
        };
        let tail = tail.trim_matches('/');
        let resource = tail.split_once('/').map(|(_, r)| r).unwrap_or(tail);
        unquote(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Endpoint {
        Endpoint::parse("http://host/stcapi").unwrap()
    }

    #[test]
    fn test_make_url_with_resource() {
        assert_eq!(
            endpoint().make_url(Some("objects"), Some("port1"), None),
            "http://host/stcapi/objects/port1"
        );
    }

    #[test]
    fn test_make_url_flag_query_has_no_equals() {
        let q = Query::flags(["name", "routerid"]);
        let url = endpoint().make_url(Some("objects"), None, Some(&q));
        assert_eq!(url, "http://host/stcapi/objects/?name&routerid");
        assert!(!url.contains('='));
    }

    #[test]
    fn test_make_url_pair_query() {
        let q = Query::Pairs(Params::new().with("a", 1).with("b", "x y"));
        assert_eq!(
            endpoint().make_url(Some("help"), Some("list"), Some(&q)),
            "http://host/stcapi/help/list?a=1&b=x+y"
        );
    }

    #[test]
    fn test_make_url_missing_parts_degrade_to_slash() {
        let ep = endpoint();
        assert_eq!(ep.make_url(Some("sessions"), None, None), "http://host/stcapi/sessions/");
        assert_eq!(ep.make_url(None, Some("apply"), None), "http://host/stcapi/apply");
        assert_eq!(ep.make_url(Some(""), None, None), "http://host/stcapi/");
    }

    #[test]
    fn test_resource_is_percent_encoded() {
        assert_eq!(
            endpoint().make_url(Some("sessions"), Some("my test - bob"), None),
            "http://host/stcapi/sessions/my%20test%20-%20bob"
        );
        assert_eq!(
            endpoint().make_url(Some("files"), Some("logs/a b.log"), None),
            "http://host/stcapi/files/logs/a%20b.log"
        );
    }

    #[test]
    fn test_empty_query_adds_nothing() {
        let q = Query::Flags(vec![]);
        assert_eq!(
            endpoint().make_url(Some("objects"), Some("system1"), Some(&q)),
            "http://host/stcapi/objects/system1"
        );
    }

    #[test]
    fn test_url_to_resource_round_trip() {
        let ep = endpoint();
        let url = ep.make_url(Some("sessions"), Some("s1 - u1"), None);
        assert_eq!(ep.url_to_resource(&url), "s1 - u1");
    }

    #[test]
    fn test_endpoint_new() {
        let ep = Endpoint::new("http", "10.0.0.1", 8888, "stcapi").unwrap();
        assert_eq!(ep.base_url(), "http://10.0.0.1:8888/stcapi");
        assert_eq!(ep.port(), 8888);
        assert!(Endpoint::new("http", "10.0.0.1", 0, "stcapi").is_err());
        assert!(Endpoint::new("http", " ", 80, "stcapi").is_err());
    }
}
