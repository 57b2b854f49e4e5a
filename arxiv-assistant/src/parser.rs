use crate::types::{AssistantError, Paper, Result};
use feed_rs::model::Entry;
use feed_rs::parser;
use tracing::debug;

/// Parses arXiv API Atom responses into papers.
pub struct FeedParser;

impl FeedParser {
    pub fn parse_papers(content: &str) -> Result<Vec<Paper>> {
        debug!("Parsing feed content ({} bytes)", content.len());

        let feed = parser::parse(content.as_bytes())
            .map_err(|e| AssistantError::Parse(format!("Failed to parse feed: {}", e)))?;

        feed.entries.into_iter().map(Self::parse_entry).collect()
    }

    fn parse_entry(entry: Entry) -> Result<Paper> {
        // arXiv signals a bad query with a single entry under /api/errors.
        if entry.id.contains("/api/errors") {
            let message = entry
                .summary
                .map(|s| s.content)
                .unwrap_or_else(|| entry.id.clone());
            return Err(AssistantError::Parse(format!("arXiv API error: {}", message.trim())));
        }

        let title = entry
            .title
            .map(|t| collapse_whitespace(&t.content))
            .unwrap_or_else(|| "Untitled".to_string());

        let published = entry
            .published
            .ok_or_else(|| AssistantError::Parse(format!("Entry {} has no published date", entry.id)))?;

        let authors = entry.authors.into_iter().map(|a| a.name.trim().to_string()).collect();

        let abstract_text = entry
            .summary
            .map(|s| s.content.replace('\n', " ").trim().to_string())
            .unwrap_or_default();

        let abs_link = entry.id.clone();

        let pdf_link = entry
            .links
            .iter()
            .find(|l| l.title.as_deref() == Some("pdf"))
            .or_else(|| entry.links.iter().find(|l| l.media_type.as_deref() == Some("application/pdf")))
            .map(|l| l.href.clone())
            .unwrap_or_else(|| abs_link.replacen("/abs/", "/pdf/", 1));

        let mut categories: Vec<String> = Vec::new();
        for category in entry.categories {
            if !categories.contains(&category.term) {
                categories.push(category.term);
            }
        }

        Ok(Paper {
            title,
            authors,
            abstract_text,
            date: published.date_naive(),
            pdf_link,
            abs_link,
            categories,
        })
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
