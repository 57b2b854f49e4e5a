use crate::prompts::{email_body, email_title};
use crate::types::{Digest, Paper};
use chrono::NaiveDate;
use interfaces::date_key;
use tracing::debug;

/// Renders selected papers into the markdown digest that gets mailed out.
pub struct DigestFormatter;

impl DigestFormatter {
    /// Pure: the same papers and date always give the same digest.
    pub fn format(papers: &[Paper], today: NaiveDate) -> Digest {
        let mut papers_info = String::new();
        for (idx, paper) in papers.iter().enumerate() {
            papers_info.push_str(&format_entry(idx + 1, paper));
        }

        debug!("Formatted digest with {} papers", papers.len());
        Digest {
            title: email_title(&date_key(today)),
            body: email_body(&papers_info),
        }
    }
}

fn format_entry(number: usize, paper: &Paper) -> String {
    format!(
        "{number}. **{title}**\n\n\
         **Authors:** {authors}\n\n\
         **Abstract:** {abstract_text}\n\n\
         **Categories:** {categories}\n\n\
         PDF: {pdf}\n\n",
        number = number,
        title = paper.title,
        authors = paper.authors.join(", "),
        abstract_text = paper.abstract_text,
        categories = paper.categories.join(", "),
        pdf = normalize_pdf_link(&paper.pdf_link),
    )
}

/// Drop a trailing `vN` from the last path segment so the link resolves to
/// the latest version of the paper.
pub fn normalize_pdf_link(link: &str) -> String {
    let (head, last) = match link.rfind('/') {
        Some(pos) => link.split_at(pos + 1),
        None => ("", link),
    };

    if let Some(v) = last.rfind('v') {
        let digits = &last[v + 1..];
        if v > 0 && !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            return format!("{}{}", head, &last[..v]);
        }
    }
    link.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_version_only() {
        assert_eq!(normalize_pdf_link("http://arxiv.org/pdf/2405.01234v1"), "http://arxiv.org/pdf/2405.01234");
        assert_eq!(normalize_pdf_link("http://arxiv.org/pdf/2405.01234v12"), "http://arxiv.org/pdf/2405.01234");
        assert_eq!(normalize_pdf_link("http://arxiv.org/pdf/2405.01234"), "http://arxiv.org/pdf/2405.01234");
        assert_eq!(normalize_pdf_link("http://arxiv.org/pdf/2401.10v1v2"), "http://arxiv.org/pdf/2401.10v1");
        assert_eq!(normalize_pdf_link("http://arxiv.org/pdf/cs/0112017v1"), "http://arxiv.org/pdf/cs/0112017");
        assert_eq!(normalize_pdf_link("http://v1.example/pdf/x"), "http://v1.example/pdf/x");
    }

    #[test]
    fn renders_numbered_entries() {
        let paper = Paper {
            title: "Agents".to_string(),
            authors: vec!["A".to_string(), "B".to_string()],
            abstract_text: "We study agents.".to_string(),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            pdf_link: "http://arxiv.org/pdf/2405.01234v1".to_string(),
            abs_link: "http://arxiv.org/abs/2405.01234v1".to_string(),
            categories: vec!["cs.CL".to_string(), "cs.AI".to_string()],
        };
        let digest = DigestFormatter::format(&[paper], NaiveDate::from_ymd_opt(2024, 5, 3).unwrap());

        assert_eq!(digest.title, "Daily papers 2024-05-03 - Arxiv Assistant");
        assert!(digest.body.starts_with("Look what I have found"));
        assert!(digest.body.contains("1. **Agents**\n\n**Authors:** A, B\n\n"));
        assert!(digest.body.contains("**Abstract:** We study agents."));
        assert!(digest.body.contains("**Categories:** cs.CL, cs.AI"));
        assert!(digest.body.contains("PDF: http://arxiv.org/pdf/2405.01234\n"));
    }

    #[test]
    fn same_input_gives_identical_digest() {
        let paper = |title: &str, authors: &[&str], categories: &[&str]| Paper {
            title: title.to_string(),
            authors: authors.iter().map(|a| a.to_string()).collect(),
            abstract_text: format!("On {}.", title),
            date: NaiveDate::from_ymd_opt(2024, 5, 2).unwrap(),
            pdf_link: format!("http://arxiv.org/pdf/{}v3", title),
            abs_link: format!("http://arxiv.org/abs/{}v3", title),
            categories: categories.iter().map(|c| c.to_string()).collect(),
        };
        let papers = vec![
            paper("2405.00001", &["Grace Hopper", "Alan Turing"], &["cs.LG", "stat.ML"]),
            paper("2405.00002", &[], &[]),
            paper("2405.00003", &["Ada Lovelace"], &["cs.CL"]),
        ];
        let today = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();

        let first = DigestFormatter::format(&papers, today);
        let second = DigestFormatter::format(&papers, today);

        assert_eq!(first.title, second.title);
        assert_eq!(first.body.as_bytes(), second.body.as_bytes());
        assert!(first.body.contains("2. **2405.00002**\n\n**Authors:** \n\n"));
        assert!(first.body.contains("PDF: http://arxiv.org/pdf/2405.00003\n"));
    }
}
