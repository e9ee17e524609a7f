//! Human-readable and JSON renderings of an [`AggregatedResult`]

use crate::pipeline::{AggregatedResult, QualifyingPublication};
use std::fmt::Write;

const RULE_WIDTH: usize = 80;

fn pubmed_link(pmid: &str) -> String {
    format!("https://pubmed.ncbi.nlm.nih.gov/{}/", pmid)
}

fn openalex_link(doi: &str) -> String {
    format!("https://openalex.org/works/https://doi.org/{}", doi)
}

fn heading(out: &mut String, title: &str) {
    let rule = "=".repeat(RULE_WIDTH);
    let _ = writeln!(out, "{}\n{}\n{}", rule, title, rule);
}

fn paper_line(out: &mut String, n: usize, paper: &QualifyingPublication) {
    let p = &paper.publication;
    let _ = writeln!(out);
    let _ = writeln!(out, "{}. {}", n, p.title);
    match paper.citations {
        Some(count) => {
            let _ = writeln!(
                out,
                "   Year: {} | Position: {} author | Citations: {}",
                p.year, p.position, count
            );
        }
        None => {
            let _ = writeln!(out, "   Year: {} | Position: {} author", p.year, p.position);
        }
    }
}

/// Plain-text report: summary first, then matched and unmatched papers
pub fn render_text(results: &AggregatedResult) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "Author: {}", results.author);
    let _ = writeln!(out, "Papers found: {}", results.total_papers);
    let _ = writeln!(out, "Qualifying papers (first/last author): {}", results.qualifying_count);
    let _ = writeln!(out);
    let _ = writeln!(out, "U-index: {}", results.u_index);
    let _ = writeln!(out, "Index over all author positions: {}", results.all_positions_index);
    let _ = writeln!(out);
    let _ = writeln!(out, "Papers with citation data: {}", results.qualifying_papers.len());
    let _ = writeln!(out, "Unmatched (no DOI or not in OpenAlex): {}", results.unmatched_count);

    if !results.qualifying_papers.is_empty() {
        let _ = writeln!(out);
        heading(&mut out, "QUALIFYING PAPERS (sorted by citations)");
        for (i, paper) in results.qualifying_papers.iter().enumerate() {
            paper_line(&mut out, i + 1, paper);
            let p = &paper.publication;
            if !p.pmid.is_empty() {
                let _ = writeln!(out, "   PubMed:   {}", pubmed_link(&p.pmid));
            }
            if let Some(doi) = &p.doi {
                let _ = writeln!(out, "   OpenAlex: {}", openalex_link(doi));
            }
        }
    }

    if !results.unmatched_papers.is_empty() {
        let _ = writeln!(out);
        heading(&mut out, "UNMATCHED PAPERS (no citation data)");
        for (i, paper) in results.unmatched_papers.iter().enumerate() {
            paper_line(&mut out, i + 1, paper);
            let p = &paper.publication;
            if !p.pmid.is_empty() {
                let _ = writeln!(out, "   PubMed: {}", pubmed_link(&p.pmid));
            }
            if let Some(doi) = &p.doi {
                let _ = writeln!(out, "   DOI: {} (not found in OpenAlex)", doi);
            }
        }
    }

    out
}

pub fn render_json(results: &AggregatedResult) -> serde_json::Result<String> {
    serde_json::to_string_pretty(results)
}
