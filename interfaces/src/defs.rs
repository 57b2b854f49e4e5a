use chrono::NaiveDate;
use serde::Deserialize;
use serde::Serialize;

/// One paper as returned by the feed. Never mutated after it is fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paper {
    pub title: String,
    pub authors: Vec<String>,
    #[serde(rename = "abstract")]
    pub abstract_text: String,
    pub date: NaiveDate,
    pub pdf_link: String,
    pub abs_link: String,
    pub categories: Vec<String>,
}

/// Rendered email content for one run. `body` is markdown.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digest {
    pub title: String,
    pub body: String,
}

/// A contiguous slice of papers sent to the model in one request.
#[derive(Clone, Copy, Debug)]
pub struct PaperBatch<'a> {
    pub number: usize,
    pub size: usize,
    pub papers: &'a [Paper],
}

impl PaperBatch<'_> {
    /// Translate a 1-based index local to this batch into a 0-based index
    /// over the whole paper list. Out-of-range values are not checked here.
    pub fn global_index(&self, local: i64) -> i64 {
        local - 1 + (self.number * self.size) as i64
    }
}

/// Split `papers` into batches of `size`. The last batch may be shorter, but
/// `size` stays the stride used for index translation.
pub fn paper_batches(papers: &[Paper], size: usize) -> impl Iterator<Item = PaperBatch<'_>> {
    let size = size.max(1);
    papers
        .chunks(size)
        .enumerate()
        .map(move |(number, papers)| PaperBatch { number, size, papers })
}

pub fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}
