use axum::http::HeaderMap;

/// Metadata observed by the server for one request. These values take
/// precedence over whatever the client put in `meta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerMeta {
    pub ip: String,
    pub country: String,
    pub city: String,
    pub user_agent: String,
    pub referrer: String,
    pub referrer_host: String,
    pub site_host: String,
    pub site_origin: String,
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
}

/// First of a list of headers that is present and non-empty.
fn first_header(headers: &HeaderMap, names: &[&str]) -> String {
    names
        .iter()
        .find_map(|name| header(headers, name))
        .unwrap_or("")
        .to_string()
}

/// Lowercased hostname of an absolute URL, or empty when it does not parse.
pub fn parse_host(value: &str) -> String {
    if value.is_empty() {
        return String::new();
    }
    url::Url::parse(value)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()))
        .unwrap_or_default()
}

/// Client IP from proxy headers, in priority order.
pub fn client_ip(headers: &HeaderMap) -> String {
    let forwarded = first_header(headers, &["x-forwarded-for", "x-vercel-forwarded-for"]);
    if let Some(first) = forwarded
        .split(',')
        .map(str::trim)
        .find(|part| !part.is_empty())
    {
        return first.to_string();
    }

    first_header(
        headers,
        &["x-real-ip", "cf-connecting-ip", "x-client-ip", "fastly-client-ip"],
    )
}

impl ServerMeta {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let referrer = first_header(headers, &["referer"]);
        let site_host = first_header(headers, &["x-forwarded-host", "host"]);
        let proto = header(headers, "x-forwarded-proto").unwrap_or("https");
        let site_origin = if site_host.is_empty() {
            String::new()
        } else {
            format!("{proto}://{site_host}")
        };

        Self {
            ip: client_ip(headers),
            country: first_header(
                headers,
                &["x-vercel-ip-country", "cf-ipcountry", "x-country-code"],
            ),
            city: first_header(headers, &["x-vercel-ip-city", "x-city"]),
            user_agent: first_header(headers, &["user-agent"]),
            referrer_host: parse_host(&referrer),
            referrer,
            site_host,
            site_origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    #[test]
    fn test_client_ip_prefers_forwarded_for() {
        let h = headers(&[
            ("x-forwarded-for", " , 203.0.113.7, 10.0.0.1"),
            ("x-real-ip", "198.51.100.2"),
        ]);
        assert_eq!(client_ip(&h), "203.0.113.7");

        let h = headers(&[("cf-connecting-ip", "198.51.100.9")]);
        assert_eq!(client_ip(&h), "198.51.100.9");

        assert_eq!(client_ip(&HeaderMap::new()), "");
    }

    #[test]
    fn test_from_headers() {
        let h = headers(&[
            ("user-agent", "Mozilla/5.0 (Windows NT 10.0)"),
            ("referer", "https://News.Example.com/story?id=1"),
            ("x-forwarded-host", "studio.example"),
            ("x-forwarded-proto", "http"),
            ("cf-ipcountry", "DE"),
        ]);
        let meta = ServerMeta::from_headers(&h);
        assert_eq!(meta.referrer_host, "news.example.com");
        assert_eq!(meta.site_origin, "http://studio.example");
        assert_eq!(meta.country, "DE");
        assert_eq!(meta.city, "");
    }

    #[test]
    fn test_parse_host_rejects_relative() {
        assert_eq!(parse_host("/just/a/path"), "");
        assert_eq!(parse_host(""), "");
    }
}
