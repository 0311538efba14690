//! HTML-to-text reduction for newsletter bodies.
//!
//! Not a renderer. The document is parsed with an HTML5 parser, text nodes
//! are emitted in document order separated by a single space, and block-level
//! elements end with a blank line so the paragraph structure survives for the
//! extraction prompt.

use scraper::{ElementRef, Html, Node};

/// Elements followed by a blank line in the output.
const BLOCK_ELEMENTS: &[&str] = &[
    "p", "div", "br", "h1", "h2", "h3", "h4", "h5", "h6", "li", "tr",
];

/// Elements whose content is never visible text.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style"];

/// Below this nesting depth block structure is no longer tracked.
const MAX_DEPTH: usize = 256;

/// Reduce an HTML document to plain text.
pub fn html_to_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let mut out = String::with_capacity(html.len() / 2);
    walk(document.root_element(), 0, &mut out);
    out
}

fn walk(element: ElementRef<'_>, depth: usize, out: &mut String) {
    let name = element.value().name();
    if RAW_TEXT_ELEMENTS.contains(&name) {
        return;
    }

    if depth >= MAX_DEPTH {
        for text in element.text() {
            push_text(out, text);
        }
    } else {
        for child in element.children() {
            match child.value() {
                Node::Text(text) => push_text(out, text),
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        walk(child, depth + 1, out);
                    }
                }
                _ => {}
            }
        }
    }

    if BLOCK_ELEMENTS.contains(&name) && !out.is_empty() {
        out.push_str("\n\n");
    }
}

/// Append one text run, separated from preceding text by a single space.
fn push_text(out: &mut String, text: &str) {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return;
    }
    if let Some(last) = out.chars().last()
        && last != '\n'
        && last != ' '
    {
        out.push(' ');
    }
    out.push_str(trimmed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paragraph_with_inline_markup() {
        assert_eq!(html_to_text("<p>Hello <b>html</b></p>"), "Hello html\n\n");
    }

    #[test]
    fn inline_elements_are_space_separated() {
        assert_eq!(
            html_to_text("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic\n\n"
        );
    }

    #[test]
    fn adjacent_runs_get_a_single_space() {
        assert_eq!(html_to_text("<span>one</span><span>two</span>"), "one two");
    }

    #[test]
    fn headings_and_paragraphs_are_separated() {
        assert_eq!(
            html_to_text("<h1>Title</h1><p>First</p><p>Second</p>"),
            "Title\n\nFirst\n\nSecond\n\n"
        );
    }

    #[test]
    fn br_breaks_lines() {
        assert_eq!(html_to_text("Line one<br>Line two"), "Line one\n\nLine two");
        assert_eq!(html_to_text("Line one<br/>Line two"), "Line one\n\nLine two");
    }

    #[test]
    fn list_items_and_table_rows() {
        assert_eq!(
            html_to_text("<ul><li>a</li><li>b</li></ul><table><tr><td>c</td></tr></table>"),
            "a\n\nb\n\nc\n\n"
        );
    }

    #[test]
    fn nested_blocks_each_break() {
        assert_eq!(html_to_text("<div><p>x</p></div>"), "x\n\n\n\n");
    }

    #[test]
    fn attributes_with_angle_brackets() {
        assert_eq!(
            html_to_text(r#"<a href="https://example.com/?a>b" title='x>y'>Link</a>"#),
            "Link"
        );
    }

    #[test]
    fn comments_doctype_and_scripts_are_dropped() {
        let html = "<!DOCTYPE html><html><head><style>p { color: red; }</style>\
                    <script>var x = '<p>';</script></head>\
                    <body><!-- tracking --><p>Shown</p></body></html>";
        assert_eq!(html_to_text(html), "Shown\n\n");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(
            html_to_text("<p>Fish &amp; Chips &#8211; &#x41;&nbsp;</p>"),
            "Fish & Chips \u{2013} A\n\n"
        );
    }

    #[test]
    fn named_entities_are_decoded() {
        assert_eq!(
            html_to_text("<p>Caf&eacute; &uuml;ber &ouml;&szlig; &trade;</p>"),
            "Caf\u{e9} \u{fc}ber \u{f6}\u{df} \u{2122}\n\n"
        );
    }

    #[test]
    fn unknown_entities_pass_through() {
        assert_eq!(html_to_text("AT&T &bogus; ok"), "AT&T &bogus; ok");
    }

    #[test]
    fn stray_angle_bracket_is_text() {
        assert_eq!(html_to_text("1 < 2"), "1 < 2");
    }

    #[test]
    fn unclosed_tags_are_recovered() {
        assert_eq!(html_to_text("<p>one<p>two"), "one\n\ntwo\n\n");
    }

    #[test]
    fn deep_nesting_keeps_text() {
        let depth = MAX_DEPTH * 2;
        let html = format!("{}deep{}", "<span>".repeat(depth), "</span>".repeat(depth));
        assert_eq!(html_to_text(&html), "deep");
    }

    #[test]
    fn plain_text_passthrough() {
        assert_eq!(html_to_text("No HTML here"), "No HTML here");
    }

    #[test]
    fn empty_input() {
        assert_eq!(html_to_text(""), "");
    }

    #[test]
    fn no_leading_break_for_empty_blocks() {
        assert_eq!(html_to_text("<div></div><p>Text</p>"), "Text\n\n");
    }
}
