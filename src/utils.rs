use url::Url;
use log::{info, debug, error, warn};
use regex::Regex;
use reqwest::{header::LOCATION, redirect::Policy, Client};
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::google_places::PlaceRef;

pub const USER_AGENT: &str = concat!("dinewise/", env!("CARGO_PKG_VERSION"));
const MAX_URL_LENGTH: usize = 2000;
const EXPAND_TIMEOUT: Duration = Duration::from_secs(10);
const ALLOWED_PARAMS: [&str; 7] = ["g_st", "q", "place_id", "ftid", "cid", "query", "query_place_id"];

lazy_static::lazy_static! {
    static ref LINK_RE: Regex = Regex::new(r#"https?://[^\s<>"'()\[\]]+"#).unwrap();
    static ref META_REFRESH_RE: Regex = Regex::new(r"URL='([^']+)'").unwrap();
    static ref GOOGLE_HOST_RE: Regex = Regex::new(r"^(www\.|maps\.)?google\.(?:[a-z]{2,3}|co\.[a-z]{2}|com\.[a-z]{2})$").unwrap();
}

pub fn is_trusted_host(host: &str) -> bool {
    matches!(host, "maps.app.goo.gl" | "goo.gl") || GOOGLE_HOST_RE.is_match(host)
}

pub fn is_google_maps_url(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(is_trusted_host))
        .unwrap_or(false)
}

pub fn validate_and_sanitize_url(url: &str) -> std::result::Result<String, String> {
    debug!("Validating and sanitizing URL: {}", url);

    if url.len() > MAX_URL_LENGTH {
        error!("URL exceeds maximum length");
        return Err("URL exceeds maximum length".to_string());
    }

    let parsed_url = Url::parse(url).map_err(|e| {
        error!("Invalid URL format: {}", e);
        "Invalid URL format".to_string()
    })?;

    if !matches!(parsed_url.scheme(), "http" | "https") {
        error!("Unsupported URL scheme: {}", parsed_url.scheme());
        return Err("Unsupported URL scheme".to_string());
    }

    let host = match parsed_url.host_str() {
        Some(host) if is_trusted_host(host) => host,
        _ => {
            error!("URL is not from a trusted domain");
            return Err("URL is not from a trusted domain".to_string());
        }
    };

    if !parsed_url.path().starts_with('/') || parsed_url.path().len() < 2 {
        error!("Invalid URL path");
        return Err("Invalid URL path".to_string());
    }

    let sanitized_query: Vec<(String, String)> = parsed_url
        .query_pairs()
        .filter(|(key, _)| ALLOWED_PARAMS.contains(&key.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut sanitized_url = format!("https://{}{}", host, parsed_url.path());
    if !sanitized_query.is_empty() {
        sanitized_url.push('?');
        sanitized_url.push_str(&url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(sanitized_query)
            .finish());
    }

    debug!("Sanitized URL: {}", sanitized_url);
    Ok(sanitized_url)
}

pub fn mask_api_key(key: &str) -> String {
    let visible: String = key.chars().take(5).collect();
    let hidden = key.chars().count().saturating_sub(5);
    format!("{}{}", visible, "*".repeat(hidden))
}

/// Every http(s) link in `text`, in order of appearance.
pub fn extract_links(text: &str) -> Vec<String> {
    LINK_RE
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(|c: char| matches!(c, '.' | ',' | ';' | ':' | '!' | '?')).to_string())
        .filter(|link| link.len() > "https://".len())
        .collect()
}

/// Follows one hop of a short link by hand, without letting reqwest chase redirects.
pub async fn expand_short_url(short_url: &str) -> Result<String> {
    expand_short_url_within(short_url, EXPAND_TIMEOUT).await
}

async fn expand_short_url_within(short_url: &str, timeout: Duration) -> Result<String> {
    debug!("Expanding short URL: {}", short_url);
    let client = Client::builder()
        .redirect(Policy::none())
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    let response = client.get(short_url).send().await?;
    let status = response.status();

    if status.is_redirection() {
        if let Some(location) = response.headers().get(LOCATION).and_then(|v| v.to_str().ok()) {
            let expanded_url = Url::parse(short_url)?.join(location)?.to_string();
            info!("Expanded URL: {}", expanded_url);
            return Ok(expanded_url);
        }
    } else if !status.is_success() {
        error!("Short URL {} answered with status {}", short_url, status);
        return Err(AppError::upstream("URL expansion", format!("unexpected status {}", status)));
    }

    let body = response.text().await?;
    if let Some(captures) = META_REFRESH_RE.captures(&body) {
        let expanded_url = captures[1].to_string();
        info!("Expanded URL from page content: {}", expanded_url);
        return Ok(expanded_url);
    }

    debug!("No redirect found for {}", short_url);
    Ok(short_url.to_string())
}

/// Body of an http(s) page as text, cut off after `max_bytes`.
pub async fn fetch_url_content(client: &Client, url: &str, max_bytes: usize) -> Result<String> {
    let parsed_url = Url::parse(url)?;
    if !matches!(parsed_url.scheme(), "http" | "https") {
        return Err(AppError::InvalidInput("Only http and https URLs can be fetched".to_string()));
    }

    debug!("Fetching page content from {}", parsed_url);
    let mut response = client.get(parsed_url).send().await?;
    let status = response.status();
    if !status.is_success() {
        error!("Fetching {} failed with status {}", url, status);
        return Err(AppError::upstream("Page fetch", format!("unexpected status {}", status)));
    }

    let mut body: Vec<u8> = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        let remaining = max_bytes - body.len();
        if chunk.len() > remaining {
            body.extend_from_slice(&chunk[..remaining]);
            warn!("Content of {} truncated at {} bytes", url, max_bytes);
            break;
        }
        body.extend_from_slice(&chunk);
    }

    info!("Fetched {} bytes from {}", body.len(), url);
    Ok(String::from_utf8_lossy(&body).into_owned())
}

pub fn extract_place_info(url: &str) -> Result<PlaceRef> {
    let parsed_url = Url::parse(url)?;
    let query_params: std::collections::HashMap<_, _> = parsed_url.query_pairs().into_owned().collect();

    if let Some(id) = query_params.get("place_id").or_else(|| query_params.get("query_place_id")) {
        return Ok(PlaceRef::PlaceId(id.clone()));
    }
    if let Some(ftid) = query_params.get("ftid") {
        return Ok(PlaceRef::Ftid(ftid.clone()));
    }
    if let Some(query) = query_params.get("q").or_else(|| query_params.get("query")) {
        return Ok(PlaceRef::Query(query.clone()));
    }

    if let Some(segments) = parsed_url.path_segments() {
        let segments: Vec<&str> = segments.collect();
        if let Some(pos) = segments.iter().position(|s| *s == "place") {
            if let Some(name) = segments.get(pos + 1).filter(|s| !s.is_empty()) {
                let decoded = decode_path_segment(name);
                debug!("Extracted place name from path: {}", decoded);
                return Ok(PlaceRef::Query(decoded));
            }
        }
    }

    debug!("No place information in {}, using the URL as query", url);
    Ok(PlaceRef::Query(url.to_string()))
}

fn decode_path_segment(segment: &str) -> String {
    url::form_urlencoded::parse(segment.as_bytes())
        .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{}={}", k, v) })
        .collect::<Vec<_>>()
        .join("&")
}

/// "https://www.restaurant-rodeo.nl/" becomes "restaurant rodeo".
pub fn website_search_term(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.trim_start_matches("www.");
    let stem = host.split('.').next()?;
    let term = stem.replace(['-', '_'], " ");
    if term.trim().is_empty() { None } else { Some(term) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    #[test]
    fn sanitize_keeps_only_known_params() {
        let url = "https://maps.app.goo.gl/AbCdEf?g_st=ic&utm_source=share";
        assert_eq!(validate_and_sanitize_url(url).unwrap(), "https://maps.app.goo.gl/AbCdEf?g_st=ic");

        let url = "http://www.google.com/maps/place/Takumi?q=Takumi+Eindhoven&entry=ttu";
        assert_eq!(
            validate_and_sanitize_url(url).unwrap(),
            "https://www.google.com/maps/place/Takumi?q=Takumi+Eindhoven"
        );
    }

    #[test]
    fn sanitize_rejects_untrusted_and_malformed() {
        assert!(validate_and_sanitize_url("https://evil.example.com/maps").is_err());
        assert!(validate_and_sanitize_url("not a url").is_err());
        assert!(validate_and_sanitize_url("https://maps.app.goo.gl/").is_err());
        assert!(validate_and_sanitize_url("ftp://maps.app.goo.gl/abc").is_err());
        let long = format!("https://maps.app.goo.gl/{}", "a".repeat(2001));
        assert_eq!(validate_and_sanitize_url(&long).unwrap_err(), "URL exceeds maximum length");
    }

    #[test]
    fn trusted_hosts_include_country_domains() {
        assert!(is_trusted_host("www.google.nl"));
        assert!(is_trusted_host("google.co.uk"));
        assert!(is_trusted_host("maps.google.com"));
        assert!(is_trusted_host("www.google.com.au"));
        assert!(!is_trusted_host("google.com.evil.io"));
        assert!(!is_trusted_host("maps.google.abc.io"));
        assert!(!is_trusted_host("www.google.xyz.nl"));
        assert!(!is_trusted_host("notgoogle.com"));
    }

    #[test]
    fn lookalike_google_domains_are_rejected() {
        assert_eq!(
            validate_and_sanitize_url("https://maps.google.abc.io/maps/place/x").unwrap_err(),
            "URL is not from a trusted domain"
        );
        assert!(!is_google_maps_url("https://maps.google.xyz.io/p"));
        assert!(is_google_maps_url("https://www.google.co.jp/maps/place/x"));
    }

    #[test]
    fn mask_keeps_prefix() {
        assert_eq!(mask_api_key("abcdefgh"), "abcde***");
        assert_eq!(mask_api_key("abc"), "abc");
    }

    #[test]
    fn links_are_found_in_free_text() {
        let text = "Takumi in Eindhoven, https://maps.app.goo.gl/xyz, and (https://www.restaurant-rodeo.nl/).";
        assert_eq!(
            extract_links(text),
            vec!["https://maps.app.goo.gl/xyz", "https://www.restaurant-rodeo.nl/"]
        );
        assert!(extract_links("no links here").is_empty());
    }

    #[test]
    fn place_info_prefers_ids_over_queries() {
        let url = "https://www.google.com/maps/search/?api=1&query=Takumi&query_place_id=ChIJ123";
        assert_eq!(extract_place_info(url).unwrap(), PlaceRef::PlaceId("ChIJ123".into()));

        let url = "https://maps.google.com/?ftid=0x47c6d9:0x1a2b&q=Dadawan";
        assert_eq!(extract_place_info(url).unwrap(), PlaceRef::Ftid("0x47c6d9:0x1a2b".into()));

        let url = "https://maps.google.com/?q=Dadawan+Eindhoven";
        assert_eq!(extract_place_info(url).unwrap(), PlaceRef::Query("Dadawan Eindhoven".into()));
    }

    #[test]
    fn place_info_reads_place_path() {
        let url = "https://www.google.com/maps/place/Caf%C3%A9+Tony/@51.43,5.47,17z/data=!3m1";
        assert_eq!(extract_place_info(url).unwrap(), PlaceRef::Query("Café Tony".into()));

        let url = "https://www.google.com/maps/@51.43,5.47,15z";
        assert_eq!(extract_place_info(url).unwrap(), PlaceRef::Query(url.into()));
    }

    #[test]
    fn website_term_uses_domain_stem() {
        assert_eq!(website_search_term("https://www.restaurant-rodeo.nl/").as_deref(), Some("restaurant rodeo"));
        assert_eq!(website_search_term("nope"), None);
    }

    #[tokio::test]
    async fn fetch_caps_body_and_rejects_other_schemes() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/menu");
                then.status(200).body("<h1>Menu</h1>");
            })
            .await;

        let client = Client::new();
        let content = fetch_url_content(&client, &server.url("/menu"), 1024).await.unwrap();
        assert_eq!(content, "<h1>Menu</h1>");
        let content = fetch_url_content(&client, &server.url("/menu"), 4).await.unwrap();
        assert_eq!(content, "<h1>");

        let err = fetch_url_content(&client, "file:///etc/passwd", 1024).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn hanging_short_link_times_out() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/slow").header("user-agent", USER_AGENT);
                then.status(302)
                    .header("location", "/maps/place/Takumi")
                    .delay(Duration::from_secs(5));
            })
            .await;

        let err = expand_short_url_within(&server.url("/slow"), Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Http(ref e) if e.is_timeout()), "{:?}", err);
    }

    #[tokio::test]
    async fn expands_location_header() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/short");
                then.status(302).header("location", "/maps/place/Takumi");
            })
            .await;

        let expanded = expand_short_url(&server.url("/short")).await.unwrap();
        assert_eq!(expanded, server.url("/maps/place/Takumi"));
    }

    #[tokio::test]
    async fn expands_meta_refresh_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/short");
                then.status(200)
                    .body("<meta http-equiv=\"refresh\" content=\"0; URL='https://maps.google.com/?q=Tony'\">");
            })
            .await;

        let expanded = expand_short_url(&server.url("/short")).await.unwrap();
        assert_eq!(expanded, "https://maps.google.com/?q=Tony");
    }

    #[tokio::test]
    async fn unchanged_without_redirect_and_error_on_failure() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/plain");
                then.status(200).body("hello");
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/missing");
                then.status(404);
            })
            .await;

        let plain = server.url("/plain");
        assert_eq!(expand_short_url(&plain).await.unwrap(), plain);
        assert!(expand_short_url(&server.url("/missing")).await.is_err());
    }
}
