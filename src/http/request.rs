use bytes::Bytes;

/// Maximum number of headers retained per request. Additional headers are
/// dropped silently while the typed mirror fields keep updating.
pub const MAX_HEADERS: usize = 50;

/// HTTP request methods.
///
/// Methods outside this set parse as `UNKNOWN` rather than failing the
/// request; routing simply never matches them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Method {
    GET,
    POST,
    PUT,
    DELETE,
    OPTIONS,
    HEAD,
    PATCH,
    #[default]
    UNKNOWN,
}

impl Method {
    /// Classifies a raw method token from the request line.
    ///
    /// # Example
    ///
    /// ```
    /// # use nvrd::http::request::Method;
    /// assert_eq!(Method::from_bytes(b"GET"), Method::GET);
    /// assert_eq!(Method::from_bytes(b"BREW"), Method::UNKNOWN);
    /// ```
    pub fn from_bytes(s: &[u8]) -> Self {
        match s {
            b"GET" => Method::GET,
            b"POST" => Method::POST,
            b"PUT" => Method::PUT,
            b"DELETE" => Method::DELETE,
            b"OPTIONS" => Method::OPTIONS,
            b"HEAD" => Method::HEAD,
            b"PATCH" => Method::PATCH,
            _ => Method::UNKNOWN,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::OPTIONS => "OPTIONS",
            Method::HEAD => "HEAD",
            Method::PATCH => "PATCH",
            Method::UNKNOWN => "UNKNOWN",
        }
    }
}

/// HTTP protocol version on the request line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HttpVersion {
    Http10,
    #[default]
    Http11,
}

/// A parsed HTTP request.
///
/// Populated incrementally by the parser as elements complete. The body is a
/// zero-copy view into the frozen receive bytes of this message; it stays
/// valid for as long as any holder keeps the handle, independent of the
/// connection's buffer reuse.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub method: Method,
    /// Full request target as received, before the path/query split.
    pub uri: String,
    pub path: String,
    pub query: Option<String>,
    pub version: HttpVersion,
    /// Headers in arrival order, capped at [`MAX_HEADERS`].
    pub headers: Vec<(String, String)>,
    // Typed mirrors of frequently consulted headers.
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub user_agent: Option<String>,
    pub connection: Option<String>,
    pub body: Bytes,
    /// Opaque back-reference to the connection serving this request;
    /// resolvable through the session registry. `None` only for requests
    /// built outside the engine.
    pub session: Option<crate::server::sessions::SessionToken>,
}

impl Request {
    /// Retrieves a header value by name, case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Determines whether the connection should remain open after the
    /// response. An explicit `Connection` header wins; otherwise HTTP/1.1
    /// defaults to keep-alive and HTTP/1.0 to close.
    pub fn keep_alive(&self) -> bool {
        match self.connection.as_deref() {
            Some(v) if v.eq_ignore_ascii_case("close") => false,
            Some(v) if v.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == HttpVersion::Http11,
        }
    }
}

/// Builder for constructing requests outside the parser (proxy capture, tests).
pub struct RequestBuilder {
    method: Method,
    path: String,
    query: Option<String>,
    version: HttpVersion,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: Method::GET,
            path: "/".to_string(),
            query: None,
            version: HttpVersion::Http11,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn version(mut self, version: HttpVersion) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        if self.headers.len() < MAX_HEADERS {
            self.headers.push((name.into(), value.into()));
        }
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Request {
        let uri = match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        };
        let content_type = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Content-Type"))
            .map(|(_, v)| v.clone());
        let user_agent = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("User-Agent"))
            .map(|(_, v)| v.clone());
        let connection = self
            .headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case("Connection"))
            .map(|(_, v)| v.clone());
        Request {
            method: self.method,
            uri,
            path: self.path,
            query: self.query,
            version: self.version,
            headers: self.headers,
            content_type,
            content_length: Some(self.body.len() as u64),
            user_agent,
            connection,
            body: self.body,
            session: None,
        }
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}
