//! Request header set supplied with a task.

use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, REFERER, USER_AGENT};

use crate::config::NetworkConfig;
use crate::error::{Error, Result};

/// Headers sent with every manifest and segment request of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders {
    pub user_agent: Option<String>,
    pub referer: Option<String>,
    pub extra: Vec<(String, String)>,
}

impl RequestHeaders {
    /// Start from the configured user agent and referer.
    pub fn from_config(network: &NetworkConfig) -> Self {
        Self {
            user_agent: Some(network.user_agent.clone()),
            referer: network.referer.clone(),
            extra: Vec::new(),
        }
    }

    pub fn with_referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((name.into(), value.into()));
        self
    }

    /// Build the reqwest header map, rejecting values that are not valid HTTP.
    pub fn to_header_map(&self) -> Result<HeaderMap> {
        let mut map = HeaderMap::new();

        if let Some(ua) = &self.user_agent {
            map.insert(USER_AGENT, header_value("user-agent", ua)?);
        }
        if let Some(referer) = &self.referer {
            map.insert(REFERER, header_value("referer", referer)?);
        }
        for (name, value) in &self.extra {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|_| Error::ConfigValidation {
                    field: "header".to_string(),
                    message: format!("'{}' is not a valid header name", name),
                })?;
            map.insert(header_name, header_value(name, value)?);
        }

        Ok(map)
    }
}

fn header_value(field: &str, value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| Error::ConfigValidation {
        field: field.to_string(),
        message: format!("Invalid header value: {:?}", value),
    })
}

/// Parse a `Name: value` pair given on the command line.
pub fn parse_header_arg(input: &str) -> Result<(String, String)> {
    let pattern = Regex::new(r"^\s*([A-Za-z0-9!#$%&'*+.^_`|~-]+)\s*:\s*(.*?)\s*$")
        .map_err(|e| Error::Config(format!("Invalid header pattern: {}", e)))?;

    let captures = pattern.captures(input).ok_or_else(|| Error::ConfigValidation {
        field: "header".to_string(),
        message: format!("Expected 'Name: value', got '{}'", input),
    })?;

    let name = captures.get(1).map(|m| m.as_str()).unwrap_or_default();
    let value = captures.get(2).map(|m| m.as_str()).unwrap_or_default();
    Ok((name.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map() {
        let headers = RequestHeaders::default()
            .with_referer("https://site.example/")
            .with_header("X-Token", "abc");
        let map = headers.to_header_map().unwrap();

        assert_eq!(map.get(REFERER).unwrap(), "https://site.example/");
        assert_eq!(map.get("x-token").unwrap(), "abc");
        assert!(map.get(USER_AGENT).is_none());
    }

    #[test]
    fn test_invalid_header_name() {
        let headers = RequestHeaders::default().with_header("bad name", "x");
        assert!(headers.to_header_map().is_err());
    }

    #[test]
    fn test_parse_header_arg() {
        assert_eq!(
            parse_header_arg("Origin: https://site.example").unwrap(),
            ("Origin".to_string(), "https://site.example".to_string())
        );
        assert_eq!(
            parse_header_arg("X-Empty:").unwrap(),
            ("X-Empty".to_string(), String::new())
        );
        assert!(parse_header_arg("no colon here").is_err());
    }
}
