//! Transport endpoints
//!
//! Endpoints use the familiar option syntax `tcp -h <host> -p <port> [-t <ms>]`.
//! Lists of endpoints are separated by `:`; hosts containing `:` or spaces
//! (IPv6 literals, for instance) are written in double quotes.

use crate::error::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A transport endpoint an adapter listens on or publishes in proxies
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Transport name, e.g. `tcp`
    pub transport: String,
    /// Host name or address; empty or `*` means all interfaces
    #[serde(default)]
    pub host: String,
    /// Port; 0 lets the transport pick one
    #[serde(default)]
    pub port: u16,
    /// Connection timeout in milliseconds
    #[serde(default)]
    pub timeout: Option<u32>,
}

impl Endpoint {
    /// Create an endpoint without a timeout
    pub fn new(transport: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            transport: transport.into(),
            host: host.into(),
            port,
            timeout: None,
        }
    }

    /// Create a TCP endpoint
    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::new("tcp", host, port)
    }

    /// Set the connection timeout
    pub fn with_timeout(mut self, timeout_ms: u32) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    /// Copy of this endpoint bound to another host
    pub fn with_host(&self, host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..self.clone()
        }
    }

    /// Check whether the host designates every local interface
    pub fn is_wildcard(&self) -> bool {
        matches!(self.host.as_str(), "" | "*" | "0.0.0.0" | "::")
    }

    /// Compare transport, host and port, ignoring the timeout
    pub fn same_address(&self, other: &Endpoint) -> bool {
        self.transport == other.transport && self.host == other.host && self.port == other.port
    }

    /// Parse a single endpoint
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let mut tokens = tokenize(input)?.into_iter();

        let transport = tokens
            .next()
            .ok_or_else(|| ParseError::EmptyEndpoint(input.to_string()))?;
        if transport.is_empty() || !transport.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(ParseError::InvalidTransport {
                endpoint: input.to_string(),
                transport,
            });
        }

        let mut endpoint = Endpoint::new(transport.to_ascii_lowercase(), "", 0);

        while let Some(option) = tokens.next() {
            let argument = tokens.next().ok_or_else(|| ParseError::MissingArgument {
                endpoint: input.to_string(),
                option: option.clone(),
            });

            match option.as_str() {
                "-h" => endpoint.host = argument?,
                "-p" => {
                    let value = argument?;
                    endpoint.port = value.parse().map_err(|_| ParseError::InvalidPort {
                        endpoint: input.to_string(),
                        value,
                    })?;
                }
                "-t" => {
                    let value = argument?;
                    endpoint.timeout = if value == "infinite" {
                        None
                    } else {
                        Some(value.parse().map_err(|_| ParseError::InvalidTimeout {
                            endpoint: input.to_string(),
                            value,
                        })?)
                    };
                }
                _ => {
                    return Err(ParseError::UnknownOption {
                        endpoint: input.to_string(),
                        option,
                    })
                }
            }
        }

        Ok(endpoint)
    }
}

fn needs_quotes(host: &str) -> bool {
    host.chars().any(|c| c == ':' || c.is_whitespace())
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.transport)?;
        if !self.host.is_empty() {
            if needs_quotes(&self.host) {
                write!(f, " -h \"{}\"", self.host)?;
            } else {
                write!(f, " -h {}", self.host)?;
            }
        }
        if self.port != 0 {
            write!(f, " -p {}", self.port)?;
        }
        if let Some(timeout) = self.timeout {
            write!(f, " -t {}", timeout)?;
        }
        Ok(())
    }
}

impl FromStr for Endpoint {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Split on whitespace, keeping double-quoted sections together
fn tokenize(input: &str) -> Result<Vec<String>, ParseError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quoted = false;

    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                in_token = true;
            }
            c if c.is_whitespace() && !quoted => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            c => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quoted {
        return Err(ParseError::UnterminatedQuote(input.to_string()));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Parse a `:`-separated endpoint list
///
/// A blank string yields an empty list.
pub fn parse_endpoint_list(input: &str) -> Result<Vec<Endpoint>, ParseError> {
    if input.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut segments = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in input.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            ':' if !quoted => segments.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    segments.push(current);

    segments
        .iter()
        .map(|segment| {
            if segment.trim().is_empty() {
                Err(ParseError::EmptyEndpoint(input.to_string()))
            } else {
                Endpoint::parse(segment)
            }
        })
        .collect()
}

/// Format endpoints in the `:`-separated list form
pub fn format_endpoint_list(endpoints: &[Endpoint]) -> String {
    endpoints
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(":")
}
