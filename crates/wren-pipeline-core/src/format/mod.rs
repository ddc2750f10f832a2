//! Markdown rendering for query results and charts.

pub mod chart;
pub mod chunk;
pub mod table;
pub mod text;

pub use chart::{
    VEGA_EDITOR_URL, compress_to_encoded_uri_component, render_chart_link,
    render_standalone_viewer,
};
pub use chunk::chunk_text;
pub use table::{NO_DATA, format_count, render_table};
pub use text::{clean_escapes, title_case};
