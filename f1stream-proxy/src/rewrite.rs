//! HTML/CSS/JS body rewriting for the reverse proxy.
//!
//! Regex-based rather than a full DOM parse: the proxy only needs to
//! rewrite a handful of well-known attribute/URL shapes and strip a
//! short denylist of anti-debug snippets, not round-trip arbitrary
//! markup. `url()` and attribute matching is intentionally permissive
//! (single or double quotes, optional whitespace) to match the wide
//! variety of third-party markup this proxy has to embed.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::b64::{encode_origin, origin_of};
use crate::shim::runtime_shim;

const REWRITE_ATTRS: &[&str] = &["src", "href", "action", "poster", "data"];

static ATTR_URL_RE: Lazy<Regex> = Lazy::new(|| {
    let attrs = REWRITE_ATTRS.join("|");
    Regex::new(&format!(
        r#"(?i)\b({attrs})(\s*=\s*)(["'])(/[^/][^"']*)\3"#
    ))
    .unwrap()
});

static CSS_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r#"(?i)url\(\s*(["']?)(/[^/][^"')]*)\1\s*\)"#).unwrap());

static IFRAME_SRC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)(<iframe\b[^>]*\bsrc\s*=\s*["'])(https?://[^"']+)(["'][^>]*>)"#).unwrap());

static ABS_ANY_RE_TEMPLATE: &str = r#"(?i)https?://{host}(/[^\s"'()<>]*)?"#;

static SCRIPT_TAG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script\s*>").unwrap());

static ANTI_DEBUG_MARKERS: &[&str] = &[
    "disable-devtool",
    "devtools-detect",
    "aclib.run/popunder",
    "pop_under",
    "pop_up",
];
const AD_LOADER_HOSTS: &[&str] = &["googlesyndication.com", "doubleclick.net", "adservice.google.com"];

static CONTEXT_MENU_BLOCKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)oncontextmenu\s*=\s*["'][^"']*return\s+false[^"']*["']"#).unwrap());
static BARE_DEBUGGER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*debugger\s*;?\s*$").unwrap());

pub enum Rewritable {
    Html,
    Css,
    Js,
    Other,
}

pub fn classify_content_type(content_type: &str) -> Rewritable {
    let ct = content_type.to_lowercase();
    if ct.contains("text/html") {
        Rewritable::Html
    } else if ct.contains("text/css") {
        Rewritable::Css
    } else if ct.contains("javascript") || ct.contains("ecmascript") {
        Rewritable::Js
    } else {
        Rewritable::Other
    }
}

pub fn rewrite_body(body: &str, page_origin: &str, kind: Rewritable) -> String {
    match kind {
        Rewritable::Html => rewrite_html(body, page_origin),
        Rewritable::Css => {
            let s = rewrite_absolute_same_origin(body, page_origin);
            rewrite_css_urls(&s, page_origin)
        }
        Rewritable::Js => strip_bare_debugger(body),
        Rewritable::Other => body.to_string(),
    }
}

fn rewrite_html(body: &str, page_origin: &str) -> String {
    let mut s = rewrite_absolute_same_origin(body, page_origin);
    s = rewrite_attr_urls(&s, page_origin);
    s = rewrite_css_urls(&s, page_origin);
    s = rewrite_iframes(&s, page_origin);
    s = strip_anti_debug_scripts(&s);
    s = strip_bare_debugger(&s);
    s = inject_shim(&s, page_origin);
    s
}

/// Step 1: absolute URLs on the upstream's own origin become proxy paths.
fn rewrite_absolute_same_origin(body: &str, page_origin: &str) -> String {
    let Some(host) = origin_of(page_origin).map(|u| u.host_str().unwrap_or("").to_string()) else {
        return body.to_string();
    };
    if host.is_empty() {
        return body.to_string();
    }
    let re = Regex::new(&ABS_ANY_RE_TEMPLATE.replace("{host}", &regex::escape(&host))).unwrap();
    let b64 = encode_origin(page_origin);
    re.replace_all(body, |caps: &Captures| {
        let path = caps.get(1).map(|m| m.as_str()).unwrap_or("");
        format!("/proxy/{b64}{path}")
    })
    .to_string()
}

/// Step 2: root-relative URLs in rewritable attributes become proxy paths
/// (skipping anything already under `/proxy/`).
fn rewrite_attr_urls(body: &str, page_origin: &str) -> String {
    let b64 = encode_origin(page_origin);
    ATTR_URL_RE
        .replace_all(body, |caps: &Captures| {
            let path = &caps[4];
            if path.starts_with("/proxy/") {
                return caps[0].to_string();
            }
            format!("{}{}{}/proxy/{}{}{}", &caps[1], &caps[2], &caps[3], b64, path, &caps[3])
        })
        .to_string()
}

/// Step 3: root-relative URLs inside inline `url(...)`.
fn rewrite_css_urls(body: &str, page_origin: &str) -> String {
    let b64 = encode_origin(page_origin);
    CSS_URL_RE
        .replace_all(body, |caps: &Captures| {
            let path = &caps[2];
            if path.starts_with("/proxy/") {
                return caps[0].to_string();
            }
            format!("url({}/proxy/{}{}{})", &caps[1], b64, path, &caps[1])
        })
        .to_string()
}

/// Step 4: cross-origin iframe sources get a nested proxy URL.
fn rewrite_iframes(body: &str, page_origin: &str) -> String {
    let page_host = origin_of(page_origin).and_then(|u| u.host_str().map(str::to_string));
    IFRAME_SRC_RE
        .replace_all(body, |caps: &Captures| {
            let target = &caps[2];
            let Ok(target_url) = url::Url::parse(target) else {
                return caps[0].to_string();
            };
            if Some(target_url.host_str().unwrap_or("").to_string()) == page_host {
                return caps[0].to_string();
            }
            let origin = format!("{}://{}", target_url.scheme(), target_url.host_str().unwrap_or(""));
            let b64 = encode_origin(&origin);
            let rest = &target[target.find(target_url.path()).unwrap_or(0)..];
            format!("{}/proxy/{}{}{}", &caps[1], b64, rest, &caps[3])
        })
        .to_string()
}

/// Step 5: strip script tags matching the anti-debug / ad-loader
/// denylist.
fn strip_anti_debug_scripts(body: &str) -> String {
    SCRIPT_TAG_RE
        .replace_all(body, |caps: &Captures| {
            let tag = caps.get(0).unwrap().as_str();
            let lower = tag.to_lowercase();
            let hits_marker = ANTI_DEBUG_MARKERS.iter().any(|m| lower.contains(m));
            let hits_ad_host = AD_LOADER_HOSTS.iter().any(|h| lower.contains(h));
            let hits_context_menu = CONTEXT_MENU_BLOCKER_RE.is_match(tag);
            if hits_marker || hits_ad_host || hits_context_menu {
                String::new()
            } else {
                tag.to_string()
            }
        })
        .to_string()
}

/// Step 6: strip bare `debugger;` statements (HTML inline scripts and raw
/// JS responses alike).
fn strip_bare_debugger(body: &str) -> String {
    BARE_DEBUGGER_RE.replace_all(body, "").to_string()
}

/// Step 7: inject the runtime shim immediately after `<head>`, or at the
/// top of `<body>` if there is no head.
fn inject_shim(body: &str, page_origin: &str) -> String {
    let script = format!("<script>{}</script>", runtime_shim(page_origin, &encode_origin(page_origin)));
    let head_re = Regex::new(r"(?i)<head(\s[^>]*)?>").unwrap();
    if let Some(m) = head_re.find(body) {
        let mut out = String::with_capacity(body.len() + script.len());
        out.push_str(&body[..m.end()]);
        out.push_str(&script);
        out.push_str(&body[m.end()..]);
        return out;
    }
    let body_re = Regex::new(r"(?i)<body(\s[^>]*)?>").unwrap();
    if let Some(m) = body_re.find(body) {
        let mut out = String::with_capacity(body.len() + script.len());
        out.push_str(&body[..m.end()]);
        out.push_str(&script);
        out.push_str(&body[m.end()..]);
        return out;
    }
    format!("{script}{body}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_rewriting_is_idempotent_and_covers_script_and_iframe() {
        let page_origin = "https://up";
        let html = r#"<html><head></head><body><script src="/foo.js"></script><iframe src="https://other/x"></iframe></body></html>"#;
        let once = rewrite_html(html, page_origin);
        let b64_up = encode_origin(page_origin);
        let b64_other = encode_origin("https://other");
        assert!(once.contains(&format!("/proxy/{b64_up}/foo.js")));
        assert!(once.contains(&format!("/proxy/{b64_other}/x")));

        let twice = rewrite_html(&once, page_origin);
        assert_eq!(
            once.matches(&format!("/proxy/{b64_up}/foo.js")).count(),
            twice.matches(&format!("/proxy/{b64_up}/foo.js")).count()
        );
    }

    #[test]
    fn strips_bare_debugger_statements() {
        let js = "console.log(1);\ndebugger;\nconsole.log(2);";
        let out = strip_bare_debugger(js);
        assert!(!out.contains("debugger"));
        assert!(out.contains("console.log(1)"));
    }

    #[test]
    fn strips_anti_debug_script_tags() {
        let html = r#"<html><head><script src="https://cdn/disable-devtool.js"></script></head><body></body></html>"#;
        let out = strip_anti_debug_scripts(html);
        assert!(!out.contains("disable-devtool"));
    }
}
