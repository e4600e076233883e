#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Head,
    Post,
}

impl Method {
    /// Case-insensitive match against the three supported methods.
    pub fn from_token(token: &str) -> Option<Method> {
        if token.eq_ignore_ascii_case("GET") {
            Some(Method::Get)
        } else if token.eq_ignore_ascii_case("HEAD") {
            Some(Method::Head)
        } else if token.eq_ignore_ascii_case("POST") {
            Some(Method::Post)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One parsed request. Created when the request line of a new request is
/// read, dropped once the request has been fully serviced.
#[derive(Debug)]
pub struct Request {
    pub method: Method,
    pub uri: String,
    pub query: String,
    pub is_cgi: bool,
    pub script_name: String,
    pub path_info: String,
    pub content_length: usize,
    pub body: Vec<u8>,
    pub headers: Vec<(String, String)>,
    /// Status the request was already rejected with (unknown method,
    /// unsupported version). The header section is still drained so the
    /// connection can survive the rejection.
    pub reject: Option<u16>,
}

impl Request {
    pub fn new(method: Method) -> Self {
        Request {
            method,
            uri: String::new(),
            query: String::new(),
            is_cgi: false,
            script_name: String::new(),
            path_info: String::new(),
            content_length: 0,
            body: Vec::new(),
            headers: Vec::new(),
            reject: None,
        }
    }

    /// Case-insensitive header lookup.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// True iff the request carried `Connection: close`.
    pub fn wants_close(&self) -> bool {
        self.header("Connection")
            .map(|v| v.eq_ignore_ascii_case("close"))
            .unwrap_or(false)
    }
}
