//! Syndication parser for journal feeds
//!
//! Handles RSS 2.0 and RSS 1.0 (RDF) `<item>` plus Atom `<entry>`, including
//! the Dublin Core and PRISM extensions most publishers use for authors,
//! dates and DOIs.

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use scraper::{Html, Node};

use super::models::{normalize_doi, CandidateRecord};
use super::FeedError;

/// Parse a feed document into candidate records labelled with `journal`.
///
/// Entries missing a title or a link are dropped; entry order is preserved.
pub fn parse_feed(xml: &[u8], journal: &str) -> Result<Vec<CandidateRecord>, FeedError> {
    let mut reader = Reader::from_reader(xml);

    let mut records = Vec::new();
    let mut buf = Vec::new();

    let mut current: Option<EntryBuilder> = None;
    // Element names below the current entry, each with its own text
    let mut path: Vec<String> = Vec::new();
    let mut texts: Vec<String> = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = qualified_name(&e);
                match current.as_mut() {
                    None if is_entry(&name) => {
                        current = Some(EntryBuilder::default());
                        path.clear();
                        texts.clear();
                    }
                    None => {}
                    Some(entry) => {
                        if path.is_empty() && name == "link" {
                            entry.offer_link_element(&e);
                        }
                        path.push(name);
                        texts.push(String::new());
                    }
                }
            }
            Ok(Event::Empty(e)) => {
                if let Some(entry) = current.as_mut() {
                    if path.is_empty() && qualified_name(&e) == "link" {
                        entry.offer_link_element(&e);
                    } else if let Some(text) = texts.last_mut() {
                        // <br/> and friends inside inline markup
                        text.push(' ');
                    }
                }
            }
            Ok(Event::End(_)) => {
                if current.is_some() {
                    if path.is_empty() {
                        if let Some(record) = current.take().and_then(|entry| entry.build(journal)) {
                            records.push(record);
                        }
                    } else {
                        let text = texts.pop().unwrap_or_default();
                        if let Some(entry) = current.as_mut() {
                            entry.assign(&path, text.trim());
                        }
                        path.pop();

                        // Inline markup inside a text field belongs to that field
                        if path.first().is_some_and(|field| is_text_field(field)) {
                            if let Some(parent) = texts.last_mut() {
                                parent.push_str(&text);
                            }
                        }
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(text) = texts.last_mut() {
                    let chunk = e.unescape().map(|t| t.into_owned()).unwrap_or_default();
                    text.push_str(&chunk);
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(text) = texts.last_mut() {
                    text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Parse(format!(
                    "XML parse error at byte {}: {}",
                    reader.buffer_position(),
                    e
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(records)
}

fn qualified_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn is_entry(name: &str) -> bool {
    name == "item" || name == "entry"
}

/// Fields whose content may carry inline (X)HTML elements
fn is_text_field(name: &str) -> bool {
    matches!(
        name,
        "title" | "description" | "summary" | "content" | "content:encoded"
    )
}

#[derive(Default)]
struct EntryBuilder {
    title: String,
    link: String,
    authors: Vec<String>,
    published: Option<String>,
    updated: Option<String>,
    doi: Option<String>,
    summary: Option<String>,
    guid: Option<String>,
}

impl EntryBuilder {
    /// Atom `<link href>`; only the alternate (or unlabelled) link counts
    fn offer_link_element(&mut self, e: &BytesStart<'_>) {
        if !self.link.is_empty() {
            return;
        }

        let mut href = None;
        let mut rel = None;
        for attr in e.attributes().flatten() {
            let value = attr.unescape_value().ok().map(|v| v.into_owned());
            match attr.key.as_ref() {
                b"href" => href = value,
                b"rel" => rel = value,
                _ => {}
            }
        }

        if matches!(rel.as_deref(), None | Some("alternate")) {
            if let Some(href) = href.filter(|h| !h.trim().is_empty()) {
                self.link = href.trim().to_string();
            }
        }
    }

    fn assign(&mut self, path: &[String], value: &str) {
        if value.is_empty() {
            return;
        }

        let names: Vec<&str> = path.iter().map(String::as_str).collect();
        match names.as_slice() {
            ["title"] => self.title = collapse_whitespace(value),
            ["link"] => {
                if self.link.is_empty() {
                    self.link = value.to_string();
                }
            }
            ["dc:creator"] | ["author"] | ["author", "name"] => {
                self.authors.push(collapse_whitespace(value));
            }
            ["pubDate"] => {
                if self.published.is_none() {
                    self.published = Some(normalize_rfc2822(value));
                }
            }
            ["prism:publicationDate"] | ["prism:coverDate"] | ["dc:date"] | ["published"] => {
                if self.published.is_none() {
                    self.published = Some(value.to_string());
                }
            }
            ["updated"] => self.updated = Some(value.to_string()),
            ["prism:doi"] | ["dc:identifier"] => {
                if self.doi.is_none() {
                    self.doi = normalize_doi(value);
                }
            }
            ["description"] | ["summary"] | ["content"] | ["content:encoded"] => {
                if self.summary.is_none() {
                    let plain = strip_markup(value);
                    if !plain.is_empty() {
                        self.summary = Some(plain);
                    }
                }
            }
            ["guid"] | ["id"] => self.guid = Some(value.to_string()),
            _ => {}
        }
    }

    fn build(self, journal: &str) -> Option<CandidateRecord> {
        let link = if self.link.is_empty() {
            self.guid.filter(|g| g.starts_with("http"))?
        } else {
            self.link
        };
        if self.title.is_empty() {
            return None;
        }

        let doi = self.doi.or_else(|| normalize_doi(&link));

        Some(CandidateRecord {
            title: self.title,
            authors: self.authors.join(", "),
            link,
            published: self.published.or(self.updated),
            journal: journal.to_string(),
            doi,
            abstract_text: self.summary,
        })
    }
}

/// RSS 2.0 dates are RFC 2822; store them as RFC 3339 so they sort as text
fn normalize_rfc2822(value: &str) -> String {
    chrono::DateTime::parse_from_rfc2822(value)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|_| value.to_string())
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Plain text of an HTML fragment, entities decoded
fn strip_markup(value: &str) -> String {
    let fragment = Html::parse_fragment(value);

    let mut plain = String::with_capacity(value.len());
    for node in fragment.root_element().descendants() {
        match node.value() {
            Node::Text(text) => plain.push_str(text),
            Node::Element(element) if breaks_text(element.name()) => plain.push(' '),
            _ => {}
        }
    }
    collapse_whitespace(&plain)
}

fn breaks_text(tag: &str) -> bool {
    matches!(
        tag,
        "p" | "br" | "div" | "li" | "tr" | "td" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSS2: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:dc="http://purl.org/dc/elements/1.1/" xmlns:prism="http://prismstandard.org/namespaces/basic/2.0/">
  <channel>
    <title>Journal of Examples</title>
    <link>https://journal.example.org</link>
    <item>
      <title>Quantum   widgets
        at scale</title>
      <link>https://journal.example.org/articles/1</link>
      <dc:creator>Alice Smith</dc:creator>
      <dc:creator>Bob Jones</dc:creator>
      <pubDate>Tue, 05 Mar 2024 10:00:00 GMT</pubDate>
      <prism:doi>10.1234/QW.2024.1</prism:doi>
      <description><![CDATA[<p>We build <b>widgets</b>.</p>]]></description>
    </item>
    <item>
      <link>https://journal.example.org/articles/no-title</link>
    </item>
    <item>
      <title>Second &amp; last</title>
      <link>https://doi.org/10.1234/second</link>
    </item>
  </channel>
</rss>"#;

    const RDF: &str = r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#" xmlns="http://purl.org/rss/1.0/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel rdf:about="https://www.nature.com/nature">
    <title>Nature</title>
  </channel>
  <item rdf:about="https://www.nature.com/articles/s41586-024-0001">
    <title>Deep sea vents</title>
    <link>https://www.nature.com/articles/s41586-024-0001</link>
    <dc:creator>Carol White</dc:creator>
    <dc:identifier>doi:10.1038/s41586-024-0001</dc:identifier>
    <dc:date>2024-04-01</dc:date>
  </item>
</rdf:RDF>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Preprints</title>
  <link href="https://preprints.example.org/"/>
  <entry>
    <title>Atomic notes</title>
    <link rel="self" href="https://preprints.example.org/api/42"/>
    <link rel="alternate" href="https://preprints.example.org/42"/>
    <author><name>Dana Grey</name></author>
    <author><name>Eli Brown</name></author>
    <updated>2024-05-02T08:00:00Z</updated>
    <summary>Short summary.</summary>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss2() {
        let records = parse_feed(RSS2.as_bytes(), "Journal of Examples").unwrap();
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.title, "Quantum widgets at scale");
        assert_eq!(first.link, "https://journal.example.org/articles/1");
        assert_eq!(first.authors, "Alice Smith, Bob Jones");
        assert_eq!(first.published.as_deref(), Some("2024-03-05T10:00:00+00:00"));
        assert_eq!(first.doi.as_deref(), Some("10.1234/qw.2024.1"));
        assert_eq!(first.abstract_text.as_deref(), Some("We build widgets."));
        assert_eq!(first.journal, "Journal of Examples");

        let second = &records[1];
        assert_eq!(second.title, "Second & last");
        assert_eq!(second.doi.as_deref(), Some("10.1234/second"));
        assert!(second.authors.is_empty());
        assert!(second.published.is_none());
    }

    #[test]
    fn test_parse_rdf() {
        let records = parse_feed(RDF.as_bytes(), "Nature").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Deep sea vents");
        assert_eq!(records[0].doi.as_deref(), Some("10.1038/s41586-024-0001"));
        assert_eq!(records[0].published.as_deref(), Some("2024-04-01"));
        assert_eq!(records[0].authors, "Carol White");
    }

    #[test]
    fn test_parse_atom() {
        let records = parse_feed(ATOM.as_bytes(), "Preprints").unwrap();
        assert_eq!(records.len(), 1);

        let entry = &records[0];
        assert_eq!(entry.link, "https://preprints.example.org/42");
        assert_eq!(entry.authors, "Dana Grey, Eli Brown");
        assert_eq!(entry.published.as_deref(), Some("2024-05-02T08:00:00Z"));
        assert_eq!(entry.abstract_text.as_deref(), Some("Short summary."));
        assert!(entry.doi.is_none());
    }

    #[test]
    fn test_channel_fields_are_ignored() {
        let records = parse_feed(
            br#"<rss><channel><title>Only channel</title><link>https://x.org</link></channel></rss>"#,
            "X",
        )
        .unwrap();
        assert!(records.is_empty());
    }

    #[test]
    fn test_broken_xml_is_parse_error() {
        let err = parse_feed(b"<rss><channel><item><title>x</item></rss>", "X").unwrap_err();
        assert!(matches!(err, FeedError::Parse(_)));
    }

    #[test]
    fn test_strip_markup() {
        assert_eq!(strip_markup("<p>One<br/>two</p>"), "One two");
        assert_eq!(strip_markup("plain"), "plain");
        assert_eq!(strip_markup("<p>Na&#x207A; &amp; K&#x207A;</p>"), "Na\u{207a} & K\u{207a}");
    }

    #[test]
    fn test_summary_keeps_text_after_less_than() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title>Cohort study</title>
            <link href="https://j.org/7"/>
            <summary>Effect significant at p &lt; 0.05 for all cohorts.</summary>
        </entry></feed>"#;

        let records = parse_feed(atom.as_bytes(), "J").unwrap();
        assert_eq!(
            records[0].abstract_text.as_deref(),
            Some("Effect significant at p < 0.05 for all cohorts.")
        );
    }

    #[test]
    fn test_mixed_content_title() {
        let rss = r#"<rss><channel><item>
            <title>Growth of <i>E. coli</i> in biofilms</title>
            <link>https://j.org/coli</link>
            <description>Shown in <b>vivo</b> and in vitro.</description>
        </item></channel></rss>"#;

        let records = parse_feed(rss.as_bytes(), "J").unwrap();
        assert_eq!(records[0].title, "Growth of E. coli in biofilms");
        assert_eq!(records[0].abstract_text.as_deref(), Some("Shown in vivo and in vitro."));
    }

    #[test]
    fn test_atom_xhtml_title() {
        let atom = r#"<feed xmlns="http://www.w3.org/2005/Atom"><entry>
            <title type="xhtml"><div xmlns="http://www.w3.org/1999/xhtml">Spin <sup>3</sup>He cells</div></title>
            <link href="https://j.org/he3"/>
        </entry></feed>"#;

        let records = parse_feed(atom.as_bytes(), "J").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].title, "Spin 3He cells");
    }
}
