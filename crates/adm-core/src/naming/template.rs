//! Filename template rendering.
//!
//! Templates use `{placeholder}` tokens: `{title}`, `{artist}` (alias of
//! `{performer}`), `{album}`, `{year}`, `{track_number}`, `{counter}`,
//! `{date}`, `{file_id}`. Unknown placeholders render empty; literal braces
//! pass through.

/// Metadata available to a template for one job.
#[derive(Debug, Clone, Default)]
pub struct TemplateValues {
    pub title: Option<String>,
    pub performer: Option<String>,
    pub album: Option<String>,
    pub year: Option<i32>,
    pub track_number: Option<u32>,
    pub counter: Option<u64>,
    pub date: Option<String>,
    pub file_id: i64,
}

impl TemplateValues {
    fn lookup(&self, key: &str) -> String {
        match key {
            "title" => self.title.clone().unwrap_or_default(),
            "artist" | "performer" => self.performer.clone().unwrap_or_default(),
            "album" => self.album.clone().unwrap_or_default(),
            "year" => self.year.map(|y| y.to_string()).unwrap_or_default(),
            "track_number" => self.track_number.map(|t| t.to_string()).unwrap_or_default(),
            "counter" => self.counter.map(|c| c.to_string()).unwrap_or_default(),
            "date" => self.date.clone().unwrap_or_default(),
            "file_id" => self.file_id.to_string(),
            _ => String::new(),
        }
    }
}

/// Render a template. Separator text around placeholders that rendered
/// empty is cleaned up later by sanitization.
pub fn render_template(template: &str, values: &TemplateValues) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c != '{' {
            out.push(c);
            continue;
        }
        match template[i + 1..].find('}') {
            Some(close) => {
                let key = &template[i + 1..i + 1 + close];
                out.push_str(&values.lookup(key));
                // Skip past the placeholder body and closing brace.
                let skip = template[i + 1..i + 2 + close].chars().count();
                for _ in 0..skip {
                    chars.next();
                }
            }
            None => out.push(c),
        }
    }
    out.trim().to_string()
}
