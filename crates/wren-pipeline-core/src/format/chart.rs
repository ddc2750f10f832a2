//! Shareable renderings of a Vega-Lite chart spec.
//!
//! The chart specification is opaque here: it is serialized and encoded, never inspected.

use serde_json::{Value, json};

pub const VEGA_EDITOR_URL: &str = "https://vega.github.io/editor/#/url/vega-lite/";

/// Link that opens the chart, already filled in, in the online Vega editor.
pub fn render_chart_link(spec: &Value) -> String {
    let payload = json!({ "mode": "vega-lite", "spec": spec });
    format!(
        "{VEGA_EDITOR_URL}{}",
        compress_to_encoded_uri_component(&payload.to_string())
    )
}

/// Self-contained HTML page that renders the chart with vega-embed and
/// offers PNG/SVG export.
pub fn render_standalone_viewer(spec: &Value, title: &str) -> String {
    let spec_json = serde_json::to_string_pretty(spec).unwrap_or_else(|_| spec.to_string());
    let title = html_escape(title);
    format!(
        r##"<!doctype html>
<html>
<head>
  <meta charset="utf-8"/>
  <title>{title}</title>
  <meta name="viewport" content="width=device-width, initial-scale=1"/>
  <script src="https://cdn.jsdelivr.net/npm/vega@5"></script>
  <script src="https://cdn.jsdelivr.net/npm/vega-lite@5"></script>
  <script src="https://cdn.jsdelivr.net/npm/vega-embed@6"></script>
  <style>
    body {{ font-family: system-ui, -apple-system, Segoe UI, Roboto, sans-serif; margin:0; padding:16px; background:#f9fafb; }}
    .container {{ max-width: 1200px; margin: 0 auto; background: white; padding: 24px; border-radius: 12px; box-shadow: 0 1px 3px rgba(0,0,0,0.1); }}
    .bar {{ display:flex; gap:12px; flex-wrap:wrap; align-items:center; margin-bottom:20px; }}
    .bar a {{ text-decoration:none; padding:10px 16px; border-radius:8px; border:1px solid #d0d7de; background:#f6f8fa; font-size:14px; font-weight:500; }}
    .bar a:hover {{ background:#1570EF; color:white; border-color:#1570EF; }}
    #vis {{ width:100%; height:500px; margin-top:16px; }}
    .hint {{ color:#6b7280; font-size:12px; margin-top:12px; font-style:italic; }}
    .error {{ color:#b91c1c; background:#fee; padding:16px; border-radius:8px; border:1px solid #fcc; }}
  </style>
</head>
<body>
  <div class="container">
    <div class="bar">
      <a href="#" id="savePNG">🖼️ Save as PNG</a>
      <a href="#" id="saveSVG">📄 Save as SVG</a>
    </div>
    <div id="vis"></div>
    <div class="hint">Tip: Hover over elements to see values. Click action buttons above to export.</div>
  </div>

  <script type="text/javascript">
    const spec = {spec_json};
    vegaEmbed('#vis', spec, {{ actions: false, renderer: 'canvas' }}).then(result => {{
      const view = result.view;
      document.getElementById('savePNG').addEventListener('click', e => {{
        e.preventDefault();
        view.toImageURL('png').then(url => {{
          const a = document.createElement('a'); a.href = url; a.download = 'chart.png';
          document.body.appendChild(a); a.click(); document.body.removeChild(a);
        }}).catch(err => alert('PNG export failed: ' + err.message));
      }});
      document.getElementById('saveSVG').addEventListener('click', e => {{
        e.preventDefault();
        view.toSVG().then(svg => {{
          const blob = new Blob([svg], {{ type: 'image/svg+xml' }});
          const url = URL.createObjectURL(blob);
          const a = document.createElement('a'); a.href = url; a.download = 'chart.svg';
          document.body.appendChild(a); a.click(); document.body.removeChild(a); URL.revokeObjectURL(url);
        }}).catch(err => alert('SVG export failed: ' + err.message));
      }});
    }}).catch(err => {{
      document.getElementById('vis').innerHTML = '<div class="error"><strong>Error loading chart:</strong><br>' + err + '</div>';
      console.error('Vega-Embed Error:', err);
    }});
  </script>
</body>
</html>"##
    )
}

fn html_escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

/// LZ-String `compressToEncodedURIComponent`, the encoding the Vega editor
/// reads from its `#/url/` fragment.
pub fn compress_to_encoded_uri_component(input: &str) -> String {
    lz_str::compress_to_encoded_uri_component(input)
}
