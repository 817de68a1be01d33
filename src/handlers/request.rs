use axum::http::{HeaderMap, header};

/// The scheme, host and trailing slash the request was addressed to, e.g.
/// `http://10.0.0.1:5000/`. Same-origin default URLs are built from this.
pub fn url_root(headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost");
    format!("{}://{}/", scheme, host)
}

/// Quality the client assigns to `mime`. The most specific matching range
/// decides: an exact type beats `type/*`, which beats `*/*`. 0 when nothing
/// in the header matches.
fn quality(accept: &str, mime: &str) -> f32 {
    let (kind, _) = mime.split_once('/').unwrap_or((mime, ""));

    accept
        .split(',')
        .filter_map(|item| {
            let mut parts = item.split(';').map(str::trim);
            let range = parts.next()?.to_ascii_lowercase();
            let q = parts
                .filter_map(|p| p.strip_prefix("q="))
                .find_map(|q| q.parse::<f32>().ok())
                .unwrap_or(1.0)
                .clamp(0.0, 1.0);

            let specificity = if range == mime {
                3
            } else if range.strip_suffix("/*").is_some_and(|t| t == kind) {
                2
            } else if range == "*/*" {
                1
            } else {
                return None;
            };
            Some((specificity, q))
        })
        .fold(None, |best: Option<(u8, f32)>, (specificity, q)| match best {
            Some((s, _)) if s >= specificity => best,
            _ => Some((specificity, q)),
        })
        .map_or(0.0, |(_, q)| q)
}

/// Whether the client prefers a JSON response over HTML.
///
/// JSON wins only when it is strictly preferred; a missing header, `*/*` or
/// a tie gets the browser treatment.
pub fn wants_json(headers: &HeaderMap) -> bool {
    let Some(accept) = headers.get(header::ACCEPT).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    quality(accept, "application/json") > quality(accept, "text/html")
}
