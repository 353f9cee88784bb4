//! The client-side runtime shim injected into every rewritten HTML page.
//!
//! Static rewriting (see `rewrite.rs`) only covers URLs present in the
//! initial document; anything the page constructs at runtime — `fetch`,
//! `XMLHttpRequest`, `WebSocket`, `EventSource`, or a dynamically created
//! media element's `src` — needs to be intercepted in the browser. This
//! module renders that interceptor as a single inline `<script>` body,
//! parameterised by the upstream origin and its proxy-path encoding.

/// Renders the shim for one page's upstream `origin` (`scheme://host`)
/// and its precomputed base64url encoding `b64`.
pub fn runtime_shim(origin: &str, b64: &str) -> String {
    format!(
        r#"
(function() {{
  var UPSTREAM_ORIGIN = {origin:?};
  var UPSTREAM_B64 = {b64:?};
  var PAGE_ORIGIN = window.location.origin;

  function rewriteUrl(raw) {{
    if (typeof raw !== "string") return raw;
    if (raw.indexOf("/proxy/") === 0) return raw;
    try {{
      var abs = new URL(raw, window.location.href);
      if (abs.origin === PAGE_ORIGIN) {{
        if (abs.pathname.indexOf("/proxy/") === 0) {{
          return abs.pathname + abs.search + abs.hash;
        }}
        return "/proxy/" + UPSTREAM_B64 + abs.pathname + abs.search + abs.hash;
      }}
      if (abs.origin === UPSTREAM_ORIGIN) {{
        return "/proxy/" + UPSTREAM_B64 + abs.pathname + abs.search + abs.hash;
      }}
      if (raw.charAt(0) === "/" && raw.charAt(1) !== "/") {{
        return "/proxy/" + UPSTREAM_B64 + raw;
      }}
      if (abs.protocol === "http:" || abs.protocol === "https:") {{
        var otherB64 = btoa(abs.origin).replace(/\+/g, "-").replace(/\//g, "_").replace(/=+$/, "");
        return "/proxy/" + otherB64 + abs.pathname + abs.search + abs.hash;
      }}
      return raw;
    }} catch (e) {{
      return raw;
    }}
  }}

  var ANTI_DEBUG_RE = /debugger|devtool/i;

  var origFetch = window.fetch;
  if (origFetch) {{
    window.fetch = function(input, init) {{
      if (typeof input === "string") {{
        input = rewriteUrl(input);
      }} else if (input && input.url) {{
        input = new Request(rewriteUrl(input.url), input);
      }}
      return origFetch.call(this, input, init);
    }};
  }}

  var origOpen = XMLHttpRequest.prototype.open;
  XMLHttpRequest.prototype.open = function(method, url) {{
    arguments[1] = rewriteUrl(url);
    return origOpen.apply(this, arguments);
  }};

  var OrigWebSocket = window.WebSocket;
  if (OrigWebSocket) {{
    window.WebSocket = function(url, protocols) {{
      return new OrigWebSocket(rewriteUrl(url), protocols);
    }};
    window.WebSocket.prototype = OrigWebSocket.prototype;
  }}

  var OrigEventSource = window.EventSource;
  if (OrigEventSource) {{
    window.EventSource = function(url, config) {{
      return new OrigEventSource(rewriteUrl(url), config);
    }};
    window.EventSource.prototype = OrigEventSource.prototype;
  }}

  var MEDIA_TAGS = {{ SCRIPT: 1, IMG: 1, VIDEO: 1, AUDIO: 1, SOURCE: 1, IFRAME: 1, LINK: 1 }};
  var origCreateElement = document.createElement;
  document.createElement = function(tagName) {{
    var el = origCreateElement.apply(document, arguments);
    var upper = String(tagName).toUpperCase();
    if (MEDIA_TAGS[upper]) {{
      var origSetAttribute = el.setAttribute;
      el.setAttribute = function(name, value) {{
        if (name === "src" && upper === "SCRIPT" && ANTI_DEBUG_RE.test(String(value))) {{
          return;
        }}
        if (name === "src" || name === "href") {{
          value = rewriteUrl(value);
        }}
        return origSetAttribute.call(this, name, value);
      }};
      try {{
        Object.defineProperty(el, "src", {{
          set: function(value) {{ origSetAttribute.call(el, "src", rewriteUrl(value)); }},
          get: function() {{ return el.getAttribute("src"); }},
        }});
      }} catch (e) {{}}
    }}
    return el;
  }};

  function guardTimer(name) {{
    var orig = window[name];
    if (!orig) return;
    window[name] = function(handler) {{
      if (typeof handler === "string" && ANTI_DEBUG_RE.test(handler)) {{
        return 0;
      }}
      return orig.apply(window, arguments);
    }};
  }}
  guardTimer("setInterval");
  guardTimer("setTimeout");

  var origEval = window.eval;
  window.eval = function(code) {{
    if (typeof code === "string" && ANTI_DEBUG_RE.test(code)) {{
      return undefined;
    }}
    return origEval.call(window, code);
  }};

  var OrigFunction = window.Function;
  window.Function = function() {{
    var body = arguments[arguments.length - 1];
    if (typeof body === "string" && ANTI_DEBUG_RE.test(body)) {{
      return function() {{}};
    }}
    return OrigFunction.apply(this, arguments);
  }};
  window.Function.prototype = OrigFunction.prototype;
}})();
"#,
        origin = origin,
        b64 = b64
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shim_embeds_origin_and_b64() {
        let s = runtime_shim("https://up", "dXBzdHJlYW0");
        assert!(s.contains("https://up"));
        assert!(s.contains("dXBzdHJlYW0"));
        assert!(s.contains("rewriteUrl"));
    }
}
