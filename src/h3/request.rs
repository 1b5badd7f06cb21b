use std::net::SocketAddr;
use std::str;

use http::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use http::Method;
use thiserror::Error;
use url::Url;

use super::qpack::HeaderField;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error(":path, :authority and :method must not be empty")]
    PathAuthorityMethodEmpty,

    #[error("malformed content-length header")]
    MalformedContentLength,

    #[error("invalid request url")]
    InvalidUrl(#[from] url::ParseError),

    #[error("invalid header field")]
    InvalidHeader,

    #[error("invalid request method")]
    InvalidMethod,
}

/// A request decoded from the QPACK header block of an HTTP/3 request
/// stream.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: Url,
    /// Always `"HTTP/3"`.
    pub proto: &'static str,
    /// Non-pseudo headers in arrival order, names lower-cased.
    pub headers: HeaderMap,
    /// Parsed `content-length`, `0` when absent.
    pub content_length: i64,
    /// The `:authority` value.
    pub host: String,
    /// The `:path` value as sent.
    pub request_uri: String,
    /// The `:protocol` value, `"h3"` when absent.
    pub protocol: String,
    /// The `:scheme` value, empty when absent.
    pub scheme: String,
    /// The QUIC peer address; stamped after decoding.
    pub remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Build a request from a decoded header list.
    ///
    /// A CONNECT request derives its URL from `https://{authority}{path}`;
    /// any other method requires `:path`, `:authority` and `:method` to all
    /// be non-empty.
    pub fn from_header_fields(fields: &[HeaderField]) -> Result<Self, RequestError> {
        let mut path = String::new();
        let mut authority = String::new();
        let mut method = String::new();
        let mut protocol = String::new();
        let mut scheme = String::new();
        let mut content_length = None;
        let mut headers = HeaderMap::new();

        for field in fields {
            let value = str::from_utf8(&field.value).map_err(|_| RequestError::InvalidHeader)?;
            match field.name.as_slice() {
                b":path" => path = value.to_owned(),
                b":method" => method = value.to_owned(),
                b":authority" => authority = value.to_owned(),
                b":protocol" => protocol = value.to_owned(),
                b":scheme" => scheme = value.to_owned(),
                b"content-length" => content_length = Some(value.to_owned()),
                _ if field.is_pseudo() => {}
                name => {
                    let name =
                        HeaderName::from_bytes(name).map_err(|_| RequestError::InvalidHeader)?;
                    let value = HeaderValue::from_str(value)
                        .map_err(|_| RequestError::InvalidHeader)?;
                    headers.append(name, value);
                }
            }
        }

        collapse_cookies(&mut headers)?;

        let (url, request_uri) = if method == Method::CONNECT.as_str() {
            let url = Url::parse(&format!("https://{authority}{path}"))?;
            (url, path.clone())
        } else {
            if path.is_empty() || authority.is_empty() || method.is_empty() {
                return Err(RequestError::PathAuthorityMethodEmpty);
            }
            let url = Url::parse(&format!("https://{authority}{path}"))?;
            (url, path.clone())
        };

        let content_length = match content_length {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| RequestError::MalformedContentLength)?,
            None => 0,
        };

        if protocol.is_empty() {
            protocol = "h3".to_owned();
        }

        Ok(Self {
            method: Method::from_bytes(method.as_bytes())
                .map_err(|_| RequestError::InvalidMethod)?,
            url,
            proto: "HTTP/3",
            headers,
            content_length,
            host: authority,
            request_uri,
            protocol,
            scheme,
            remote_addr: None,
        })
    }
}

// Multiple Cookie headers travel as separate field lines; RFC 6265 wants
// them rejoined with "; " before anything interprets them.
fn collapse_cookies(headers: &mut HeaderMap) -> Result<(), RequestError> {
    let cookies: Vec<&HeaderValue> = headers.get_all(COOKIE).iter().collect();
    if cookies.len() < 2 {
        return Ok(());
    }
    let joined = cookies
        .iter()
        .map(|value| value.to_str().map_err(|_| RequestError::InvalidHeader))
        .collect::<Result<Vec<_>, _>>()?
        .join("; ");
    let joined = HeaderValue::from_str(&joined).map_err(|_| RequestError::InvalidHeader)?;
    headers.insert(COOKIE, joined);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connect_fields() -> Vec<HeaderField> {
        vec![
            HeaderField::new(":method", "CONNECT"),
            HeaderField::new(":scheme", "https"),
            HeaderField::new(":authority", "example.com"),
            HeaderField::new(":path", "/chat"),
            HeaderField::new(":protocol", "webtransport"),
            HeaderField::new("origin", "https://example.com"),
        ]
    }

    #[test]
    fn connect_request() {
        let request = Request::from_header_fields(&connect_fields()).unwrap();
        assert_eq!(request.method, Method::CONNECT);
        assert_eq!(request.url.as_str(), "https://example.com/chat");
        assert_eq!(request.request_uri, "/chat");
        assert_eq!(request.host, "example.com");
        assert_eq!(request.protocol, "webtransport");
        assert_eq!(request.scheme, "https");
        assert_eq!(request.proto, "HTTP/3");
        assert_eq!(
            request.headers.get("origin").unwrap(),
            "https://example.com"
        );
    }

    #[test]
    fn ordinary_request_requires_core_pseudo_headers() {
        let fields = vec![
            HeaderField::new(":method", "GET"),
            HeaderField::new(":authority", "example.com"),
        ];
        assert!(matches!(
            Request::from_header_fields(&fields),
            Err(RequestError::PathAuthorityMethodEmpty)
        ));
    }

    #[test]
    fn header_names_are_lowercased() {
        let mut fields = connect_fields();
        fields.push(HeaderField::new("X-Custom", "yes"));
        let request = Request::from_header_fields(&fields).unwrap();
        assert_eq!(request.headers.get("x-custom").unwrap(), "yes");
    }

    #[test]
    fn cookies_collapse_into_one_line() {
        let mut fields = connect_fields();
        fields.push(HeaderField::new("cookie", "a=1"));
        fields.push(HeaderField::new("cookie", "b=2"));
        let request = Request::from_header_fields(&fields).unwrap();
        let cookies: Vec<_> = request.headers.get_all(COOKIE).iter().collect();
        assert_eq!(cookies.len(), 1);
        assert_eq!(cookies[0], "a=1; b=2");
    }

    #[test]
    fn content_length_parsing() {
        let mut fields = connect_fields();
        fields.push(HeaderField::new("content-length", "42"));
        let request = Request::from_header_fields(&fields).unwrap();
        assert_eq!(request.content_length, 42);

        let request = Request::from_header_fields(&connect_fields()).unwrap();
        assert_eq!(request.content_length, 0);

        let mut fields = connect_fields();
        fields.push(HeaderField::new("content-length", "many"));
        assert!(matches!(
            Request::from_header_fields(&fields),
            Err(RequestError::MalformedContentLength)
        ));
    }

    #[test]
    fn protocol_defaults_to_h3() {
        let fields = vec![
            HeaderField::new(":method", "GET"),
            HeaderField::new(":scheme", "https"),
            HeaderField::new(":authority", "example.com"),
            HeaderField::new(":path", "/index.html"),
        ];
        let request = Request::from_header_fields(&fields).unwrap();
        assert_eq!(request.protocol, "h3");
        assert_eq!(request.url.as_str(), "https://example.com/index.html");
    }
}
