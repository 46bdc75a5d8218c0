//! Markdown-to-HTML rendering for chat transcripts.
//!
//! Two passes: line-oriented block segmentation into [`RenderChunk`]s, then
//! an inline transform applied to every text span outside code fences.
//! Rendering is a pure function of the input text, so re-rendering a growing
//! stream buffer always yields the same HTML for the same bytes.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Block-level parse node. Transient: recomputed on every render, never
/// stored in the transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
enum RenderChunk {
    Paragraph(Vec<String>),
    Heading(usize, String),
    CodeBlock { lang: String, body: String },
    Blockquote(String),
    ListItems(Vec<String>),
    Table(Table),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Table {
    alignments: Vec<Align>,
    header: Vec<String>,
    rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Align {
    Left,
    Center,
    Right,
}

/// Render markdown `text` to sanitized HTML.
pub fn render(text: &str) -> String {
    let chunks = segment(text);
    let html: Vec<String> = chunks.into_iter().map(chunk_to_html).collect();
    html.join("\n")
}

// ── Phase A: block segmentation ─────────────────────────────────────────

static DELIMITER_CELL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^:?-+:?$").unwrap());

fn segment(text: &str) -> Vec<RenderChunk> {
    let lines: Vec<&str> = text.lines().collect();
    let mut chunks = Vec::new();
    let mut paragraph: Vec<String> = Vec::new();
    let mut list: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        // Fenced code block: body is captured verbatim, never inline-parsed.
        if let Some(tag) = line.strip_prefix("```") {
            flush_list(&mut chunks, &mut list);
            flush_paragraph(&mut chunks, &mut paragraph);
            let lang = tag.trim().to_string();
            let mut body = Vec::new();
            i += 1;
            while i < lines.len() && !lines[i].starts_with("```") {
                body.push(lines[i]);
                i += 1;
            }
            if i < lines.len() {
                i += 1; // closing fence
            }
            chunks.push(RenderChunk::CodeBlock {
                lang,
                body: body.join("\n"),
            });
            continue;
        }

        if let Some((level, content)) = heading(line) {
            flush_list(&mut chunks, &mut list);
            flush_paragraph(&mut chunks, &mut paragraph);
            chunks.push(RenderChunk::Heading(level, content.to_string()));
            i += 1;
            continue;
        }

        if let Some(rest) = line.strip_prefix('>') {
            flush_list(&mut chunks, &mut list);
            flush_paragraph(&mut chunks, &mut paragraph);
            let content = rest.strip_prefix(' ').unwrap_or(rest);
            chunks.push(RenderChunk::Blockquote(content.to_string()));
            i += 1;
            continue;
        }

        if let Some(item) = list_item(line) {
            flush_paragraph(&mut chunks, &mut paragraph);
            list.push(item.to_string());
            i += 1;
            continue;
        }

        // A table starts only as a header/delimiter pair; a lone `|` line is
        // an ordinary paragraph line.
        if line.contains('|') && i + 1 < lines.len() && is_delimiter_row(lines[i + 1]) {
            flush_list(&mut chunks, &mut list);
            flush_paragraph(&mut chunks, &mut paragraph);
            let header = split_row(line);
            let alignments = column_alignments(lines[i + 1], header.len());
            i += 2;
            let mut rows = Vec::new();
            while i < lines.len() {
                let row = lines[i];
                if row.trim().is_empty() || is_delimiter_row(row) {
                    break;
                }
                rows.push(split_row(row));
                i += 1;
            }
            chunks.push(RenderChunk::Table(Table {
                alignments,
                header,
                rows,
            }));
            continue;
        }

        if line.trim().is_empty() {
            flush_list(&mut chunks, &mut list);
            flush_paragraph(&mut chunks, &mut paragraph);
            i += 1;
            continue;
        }

        flush_list(&mut chunks, &mut list);
        paragraph.push(line.to_string());
        i += 1;
    }

    flush_list(&mut chunks, &mut list);
    flush_paragraph(&mut chunks, &mut paragraph);
    chunks
}

fn flush_paragraph(chunks: &mut Vec<RenderChunk>, paragraph: &mut Vec<String>) {
    if !paragraph.is_empty() {
        chunks.push(RenderChunk::Paragraph(std::mem::take(paragraph)));
    }
}

fn flush_list(chunks: &mut Vec<RenderChunk>, list: &mut Vec<String>) {
    if !list.is_empty() {
        chunks.push(RenderChunk::ListItems(std::mem::take(list)));
    }
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let hashes = line.bytes().take_while(|&b| b == b'#').count();
    if (1..=6).contains(&hashes) {
        if let Some(content) = line[hashes..].strip_prefix(' ') {
            return Some((hashes, content));
        }
    }
    None
}

fn list_item(line: &str) -> Option<&str> {
    line.strip_prefix("- ").or_else(|| line.strip_prefix("* "))
}

fn split_row(line: &str) -> Vec<String> {
    let inner = line.trim();
    let inner = inner.strip_prefix('|').unwrap_or(inner);
    let inner = inner.strip_suffix('|').unwrap_or(inner);
    inner.split('|').map(|cell| cell.trim().to_string()).collect()
}

fn is_delimiter_row(line: &str) -> bool {
    split_row(line).iter().all(|cell| DELIMITER_CELL.is_match(cell))
}

fn column_alignments(delimiter: &str, columns: usize) -> Vec<Align> {
    let cells = split_row(delimiter);
    (0..columns)
        .map(|i| match cells.get(i) {
            Some(cell) if cell.starts_with(':') && cell.ends_with(':') => Align::Center,
            Some(cell) if cell.ends_with(':') => Align::Right,
            _ => Align::Left,
        })
        .collect()
}

// ── HTML synthesis ──────────────────────────────────────────────────────

fn chunk_to_html(chunk: RenderChunk) -> String {
    match chunk {
        RenderChunk::Paragraph(lines) => {
            let joined: Vec<String> = lines.iter().map(|line| render_inline(line)).collect();
            format!("<p>{}</p>", joined.join("<br>"))
        }
        RenderChunk::Heading(level, text) => {
            format!("<h{level}>{}</h{level}>", render_inline(&text))
        }
        RenderChunk::CodeBlock { lang, body } => {
            if lang.is_empty() {
                format!("<pre><code>{}</code></pre>", escape_html(&body))
            } else {
                format!(
                    "<pre><code class=\"language-{}\">{}</code></pre>",
                    escape_html(&lang),
                    escape_html(&body)
                )
            }
        }
        RenderChunk::Blockquote(text) => {
            format!("<blockquote>{}</blockquote>", render_inline(&text))
        }
        RenderChunk::ListItems(items) => {
            let body: String = items
                .iter()
                .map(|item| format!("<li>{}</li>", render_inline(item)))
                .collect();
            format!("<ul>{body}</ul>")
        }
        RenderChunk::Table(table) => table_to_html(&table),
    }
}

fn table_to_html(table: &Table) -> String {
    let mut out = String::from("<table><thead><tr>");
    for (i, cell) in table.header.iter().enumerate() {
        out.push_str(&cell_html("th", table.alignments.get(i), cell));
    }
    out.push_str("</tr></thead><tbody>");
    for row in &table.rows {
        out.push_str("<tr>");
        // Column count is fixed by the header: short rows pad out with empty
        // cells, extra cells are dropped.
        for i in 0..table.header.len() {
            let value = row.get(i).map(String::as_str).unwrap_or("");
            out.push_str(&cell_html("td", table.alignments.get(i), value));
        }
        out.push_str("</tr>");
    }
    out.push_str("</tbody></table>");
    out
}

fn cell_html(tag: &str, align: Option<&Align>, text: &str) -> String {
    let rendered = render_inline(text);
    match align {
        Some(Align::Center) => format!("<{tag} style=\"text-align: center\">{rendered}</{tag}>"),
        Some(Align::Right) => format!("<{tag} style=\"text-align: right\">{rendered}</{tag}>"),
        _ => format!("<{tag}>{rendered}</{tag}>"),
    }
}

// ── Phase B: inline transform ───────────────────────────────────────────

static CODE_SPAN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"`([^`]+)`").unwrap());
// Link targets may carry one nested paren pair (`javascript:alert(1)`
// must be captured whole so rejection drops all of it).
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^()]*(?:\([^()]*\)[^()]*)*)\)").unwrap());
static BOLD_STARS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.+?)\*\*").unwrap());
static BOLD_UNDERSCORES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.+?)__").unwrap());
static ITALIC_STAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.+?)\*").unwrap());
static ITALIC_UNDERSCORE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_(.+?)_").unwrap());
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~~(.+?)~~").unwrap());

/// Transform one already-segmented text span to inline HTML.
///
/// The input is escaped first; code spans and links are swapped for opaque
/// placeholder tokens so the emphasis passes cannot touch their contents,
/// and the tokens are resolved back as the very last step.
fn render_inline(text: &str) -> String {
    let mut out = escape_html(text);
    let mut protected: Vec<String> = Vec::new();

    out = CODE_SPAN
        .replace_all(&out, |caps: &Captures| {
            protected.push(format!("<code>{}</code>", &caps[1]));
            placeholder(protected.len() - 1)
        })
        .into_owned();

    out = LINK
        .replace_all(&out, |caps: &Captures| {
            let label = caps[1].to_string();
            let fragment = match safe_href(&caps[2]) {
                Some(href) => format!(
                    "<a href=\"{href}\" target=\"_blank\" rel=\"noopener noreferrer\">{label}</a>"
                ),
                // Unsafe target: keep the visible text, emit no anchor.
                None => label,
            };
            protected.push(fragment);
            placeholder(protected.len() - 1)
        })
        .into_owned();

    out = BOLD_STARS.replace_all(&out, "<strong>$1</strong>").into_owned();
    out = BOLD_UNDERSCORES.replace_all(&out, "<strong>$1</strong>").into_owned();
    out = ITALIC_STAR.replace_all(&out, "<em>$1</em>").into_owned();
    out = ITALIC_UNDERSCORE.replace_all(&out, "<em>$1</em>").into_owned();
    out = STRIKETHROUGH.replace_all(&out, "<del>$1</del>").into_owned();

    // Reverse order: a link label may itself hold an earlier code token.
    for (index, fragment) in protected.iter().enumerate().rev() {
        out = out.replace(&placeholder(index), fragment);
    }
    out
}

fn placeholder(index: usize) -> String {
    format!("\u{0}{index}\u{0}")
}

/// Resolve a link target. Rooted paths and fragments pass as-is; anything
/// else must parse as an absolute URL with an http, https, or mailto scheme.
fn safe_href(target: &str) -> Option<&str> {
    if target.starts_with('/') || target.starts_with('#') {
        return Some(target);
    }
    match Url::parse(target) {
        Ok(parsed) if matches!(parsed.scheme(), "http" | "https" | "mailto") => Some(target),
        _ => None,
    }
}

/// Escape the five HTML-significant characters; `&` goes first so the
/// entities produced by the later replacements survive untouched.
fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rendering_is_deterministic() {
        let input = "# Title\n\nSome **bold** text with `code` and [a link](/docs).";
        assert_eq!(render(input), render(input));
    }

    #[test]
    fn paragraph_lines_join_with_hard_breaks() {
        assert_eq!(render("one\ntwo"), "<p>one<br>two</p>");
        assert_eq!(render("one\n\ntwo"), "<p>one</p>\n<p>two</p>");
    }

    #[test]
    fn headings_by_hash_count() {
        assert_eq!(render("# A"), "<h1>A</h1>");
        assert_eq!(render("### deep"), "<h3>deep</h3>");
        // Seven hashes is not a heading, and neither is a missing space.
        assert_eq!(render("####### nope"), "<p>####### nope</p>");
        assert_eq!(render("#nope"), "<p>#nope</p>");
    }

    #[test]
    fn fenced_code_is_verbatim_and_escaped() {
        let input = "```rust\nlet ok = 1 < 2;\n**not bold**\n```";
        assert_eq!(
            render(input),
            "<pre><code class=\"language-rust\">let ok = 1 &lt; 2;\n**not bold**</code></pre>"
        );
    }

    #[test]
    fn unterminated_fence_runs_to_end_of_input() {
        let input = "```\nstill code\nmore";
        assert_eq!(render(input), "<pre><code>still code\nmore</code></pre>");
    }

    #[test]
    fn blockquote_strips_one_leading_space() {
        assert_eq!(render("> quoted"), "<blockquote>quoted</blockquote>");
        assert_eq!(render(">bare"), "<blockquote>bare</blockquote>");
        assert_eq!(render(">  two"), "<blockquote> two</blockquote>");
    }

    #[test]
    fn contiguous_list_items_group_into_one_list() {
        assert_eq!(
            render("- a\n- b\n* c"),
            "<ul><li>a</li><li>b</li><li>c</li></ul>"
        );
        assert_eq!(
            render("- a\n\n- b"),
            "<ul><li>a</li></ul>\n<ul><li>b</li></ul>"
        );
    }

    #[test]
    fn table_alignments_follow_delimiter_colons() {
        let input = "a|b|c\n:--|--:|:-:\n1|2|3";
        assert_eq!(
            render(input),
            "<table><thead><tr><th>a</th>\
             <th style=\"text-align: right\">b</th>\
             <th style=\"text-align: center\">c</th>\
             </tr></thead><tbody><tr><td>1</td>\
             <td style=\"text-align: right\">2</td>\
             <td style=\"text-align: center\">3</td>\
             </tr></tbody></table>"
        );
    }

    #[test]
    fn table_tolerates_ragged_rows() {
        let html = render("a|b\n---|---\nonly\n1|2|extra");
        assert!(html.contains("<td>only</td><td></td>"));
        assert!(html.contains("<td>1</td><td>2</td>"));
        assert!(!html.contains("extra"));
    }

    #[test]
    fn table_body_stops_at_blank_line() {
        let html = render("a|b\n---|---\n1|2\n\nafter");
        assert!(html.contains("</table>"));
        assert!(html.contains("<p>after</p>"));
    }

    #[test]
    fn plain_pipe_line_without_delimiter_is_a_paragraph() {
        assert_eq!(render("a | b"), "<p>a | b</p>");
    }

    #[test]
    fn script_tags_are_escaped() {
        let html = render("<script>alert(1)</script>");
        assert!(!html.contains("<script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn attribute_breakout_is_escaped() {
        let html = render("\"><img src=x onerror=alert(1)>");
        assert!(!html.contains("<img"));
        assert!(html.contains("&quot;&gt;&lt;img"));
    }

    #[test]
    fn ampersands_are_escaped_once() {
        assert_eq!(render("fish & chips"), "<p>fish &amp; chips</p>");
    }

    #[test]
    fn safe_links_become_anchors() {
        assert_eq!(
            render("[x](/a)"),
            "<p><a href=\"/a\" target=\"_blank\" rel=\"noopener noreferrer\">x</a></p>"
        );
        assert_eq!(
            render("[docs](https://example.com/d)"),
            "<p><a href=\"https://example.com/d\" target=\"_blank\" rel=\"noopener noreferrer\">docs</a></p>"
        );
    }

    #[test]
    fn unsafe_link_degrades_to_its_label() {
        assert_eq!(render("[x](javascript:alert(1))"), "<p>x</p>");
        assert_eq!(render("[x](data:text/html,hi)"), "<p>x</p>");
    }

    #[test]
    fn inline_code_is_protected_from_emphasis() {
        assert_eq!(render("`**raw**`"), "<p><code>**raw**</code></p>");
        assert_eq!(render("`1 < 2`"), "<p><code>1 &lt; 2</code></p>");
    }

    #[test]
    fn code_span_inside_link_label_survives() {
        assert_eq!(
            render("[`main`](/src)"),
            "<p><a href=\"/src\" target=\"_blank\" rel=\"noopener noreferrer\"><code>main</code></a></p>"
        );
    }

    #[test]
    fn emphasis_passes_apply_in_order() {
        assert_eq!(
            render("**a** *b* __c__ _d_ ~~e~~"),
            "<p><strong>a</strong> <em>b</em> <strong>c</strong> <em>d</em> <del>e</del></p>"
        );
    }

    #[test]
    fn streamed_buffer_renders_like_the_final_text() {
        assert_eq!(render("Hello **world**"), "<p>Hello <strong>world</strong></p>");
    }
}
