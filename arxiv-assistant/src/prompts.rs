use crate::types::{InterestProfile, Paper};

const FILTER_INTRO: &str = concat!(
    "You are an academic assistant that helps me to filter research papers that I may find interesting.\n",
    "I will give you a list of papers, including their index, title and abstract. ",
    "You should select some papers from them based on my research interest.",
);

const FILTER_OUTPUT_RULES: &str = concat!(
    "You should not only consider papers whose title/abstract contain the above keywords, ",
    "but also papers you think may be related to the above areas based on your knowledge.\n",
    "\n",
    "Your output should be a list of indexes:\n",
    "[index1, index2, ...]\n",
    "The indexes are **NOT** in the ascending order, but based on the **relevance and significance** of the papers. ",
    "The most relevant paper should be the first index.\n",
    "Please ensure that your output can be parsed as a JSON array of integers.",
);

const FILTER_REMINDER: &str = concat!(
    "Please ensure that your output is a list of indexes following the order of relevance and significance ",
    "and can be parsed as a JSON array of integers.",
);

pub const EMAIL_GREETING: &str = "Look what I have found in today's arxiv papers that you may be interested!";

/// Prompt for one batch. Indexes are 1-based within `papers`.
pub fn filter_prompt(papers: &[Paper], profile: &InterestProfile) -> String {
    let mut papers_info = String::new();
    for (idx, paper) in papers.iter().enumerate() {
        papers_info.push_str(&format!(
            "Index: {}\nTitle: {}\nAbstract: {}\n\n",
            idx + 1,
            paper.title,
            paper.abstract_text
        ));
    }

    let negative = match &profile.negative_keywords {
        Some(words) if !words.is_empty() => format!(
            "\nI'm not interested in papers with the following keywords:\n{}\n",
            keyword_list(words)
        ),
        _ => String::new(),
    };

    format!(
        "{intro}\nThe maximum number of filtered papers is {max}. \
         You don't need to always select such many papers, but only choose those related to my interest. \
         Less than 5 (even 0) papers are also acceptable.\n\n\
         Here are keywords describing my research interest:\n{keywords}\n{negative}\n{rules}\n\n\n\
         The candidate papers are as follows:\n\n{papers_info}\n{reminder}\n",
        intro = FILTER_INTRO,
        max = profile.target_count,
        keywords = keyword_list(&profile.keywords),
        negative = negative,
        rules = FILTER_OUTPUT_RULES,
        papers_info = papers_info,
        reminder = FILTER_REMINDER,
    )
}

pub fn email_title(date: &str) -> String {
    format!("Daily papers {} - Arxiv Assistant", date)
}

pub fn email_body(papers_info: &str) -> String {
    format!("{}\n\n{}", EMAIL_GREETING, papers_info)
}

fn keyword_list(words: &[String]) -> String {
    let quoted: Vec<String> = words.iter().map(|w| format!("'{}'", w)).collect();
    format!("[{}]", quoted.join(", "))
}
