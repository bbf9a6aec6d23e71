//! RSS headline digest.

use tracing::warn;

use crate::http_client::{HttpClient, HttpRequest};

pub const CNBC_FINANCE_FEED: &str = "https://www.cnbc.com/id/10000664/device/rss/rss.html";

/// Headlines kept in a digest.
pub const DIGEST_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Headline {
    pub title: String,
    pub description: String,
}

impl Headline {
    pub fn digest_line(&self) -> String {
        format!("- {}: {}", self.title, self.description)
    }
}

/// First `limit` `channel/item` entries of an RSS document.
pub fn parse_headlines(xml: &str, limit: usize) -> Result<Vec<Headline>, roxmltree::Error> {
    let document = roxmltree::Document::parse(xml)?;

    let items = document
        .root_element()
        .children()
        .filter(|node| node.has_tag_name("channel"))
        .flat_map(|channel| channel.children().filter(|node| node.has_tag_name("item")));

    let headlines = items
        .filter_map(|item| {
            let child_text = |tag: &str| {
                item.children()
                    .find(|node| node.has_tag_name(tag))
                    .and_then(|node| node.text())
                    .map(|text| text.trim().to_owned())
            };
            let title = child_text("title").filter(|title| !title.is_empty())?;
            Some(Headline {
                title,
                description: child_text("description").unwrap_or_default(),
            })
        })
        .take(limit)
        .collect();

    Ok(headlines)
}

pub fn format_digest(headlines: &[Headline]) -> String {
    headlines
        .iter()
        .map(Headline::digest_line)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Fetch `url` and build a digest of its top headlines. Any failure is
/// logged and yields an empty digest.
pub async fn fetch_headline_digest(http: &dyn HttpClient, url: &str) -> String {
    let request = HttpRequest::get(url).with_timeout_ms(10_000);
    let response = match http.execute(request).await {
        Ok(response) if response.is_success() => response,
        Ok(response) => {
            warn!(status = response.status, url, "news feed returned non-success status");
            return String::new();
        }
        Err(error) => {
            warn!(error = error.message(), url, "news feed request failed");
            return String::new();
        }
    };

    match parse_headlines(&response.body, DIGEST_LIMIT) {
        Ok(headlines) => format_digest(&headlines),
        Err(error) => {
            warn!(%error, url, "news feed is not valid RSS");
            String::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Finance</title>
    <item>
      <title>Fed holds rates steady</title>
      <description><![CDATA[Policy makers signal patience.]]></description>
    </item>
    <item>
      <title>Chip stocks rally</title>
    </item>
    <item>
      <description>orphan description</description>
    </item>
  </channel>
</rss>"#;

    #[test]
    fn parses_channel_items_into_digest_lines() {
        let headlines = parse_headlines(FEED, 10).expect("valid feed");

        assert_eq!(headlines.len(), 2);
        assert_eq!(
            format_digest(&headlines),
            "- Fed holds rates steady: Policy makers signal patience.\n- Chip stocks rally: "
        );
    }

    #[test]
    fn digest_is_capped() {
        let headlines = parse_headlines(FEED, 1).expect("valid feed");
        assert_eq!(headlines.len(), 1);
    }

    #[test]
    fn rejects_non_xml() {
        assert!(parse_headlines("<html", 10).is_err());
    }
}
