//! Regex heuristics over the page text for salary, location, job type,
//! skills, education and experience requirements. All best-effort.

use regex::Regex;

use crate::page::{element_text, Page};
use crate::snapshot::JobAttributes;
use crate::util::collapse_whitespace;

const MAX_EDUCATION_MATCHES: usize = 5;
const MAX_EXPERIENCE_MATCHES: usize = 5;

/// Skill vocabulary with canonical capitalization. Matching is
/// case-insensitive with manual word boundaries, since `\b` misbehaves
/// around `+` and `#`.
const SKILL_VOCABULARY: &[&str] = &[
    "JavaScript",
    "TypeScript",
    "Python",
    "Java",
    "C++",
    "C#",
    "Rust",
    "Ruby",
    "Swift",
    "Kotlin",
    "SQL",
    "React",
    "Angular",
    "Vue",
    "Node.js",
    "Django",
    "Spring",
    "AWS",
    "Azure",
    "GCP",
    "Docker",
    "Kubernetes",
    "Terraform",
    "Git",
    "Linux",
    "GraphQL",
    "REST",
    "HTML",
    "CSS",
    "MongoDB",
    "PostgreSQL",
    "Redis",
    "Kafka",
    "Excel",
    "Salesforce",
    "Figma",
];

fn pattern(p: &str) -> Regex {
    Regex::new(p).unwrap_or_else(|_| Regex::new("$^").unwrap())
}

/// Derive job attributes from the page. `full_text` is the collapsed
/// visible text, computed once by the caller.
pub fn job_attributes(page: &Page, full_text: &str) -> JobAttributes {
    JobAttributes {
        title: job_title(page),
        salary: find_salary(full_text),
        location: find_location(full_text),
        job_type: find_job_type(full_text),
        skills: find_skills(full_text),
        education: find_education(full_text),
        experience: find_experience(full_text),
    }
}

fn job_title(page: &Page) -> Option<String> {
    let selector = super::static_selector("h1");
    page.document()
        .select(&selector)
        .next()
        .map(|el| collapse_whitespace(&element_text(el)))
        .filter(|t| !t.is_empty())
}

fn find_salary(text: &str) -> Option<String> {
    let re = pattern(r"\$[\d,]+(?:\.\d+)?(?:k|K)?(?:\s*[-\u{2013}\u{2014}]\s*\$?[\d,]+(?:\.\d+)?(?:k|K)?)?(?:\s*(?:USD|per\s+(?:year|hour|month)|/(?:yr|hr|year|hour)|annually))?");
    re.find(text).map(|m| m.as_str().trim().to_string())
}

fn find_location(text: &str) -> Option<String> {
    // "Remote"/"Hybrid" beat a city match; postings often carry both and
    // the work arrangement is the useful fact.
    let arrangement = pattern(r"(?i)\b(?:fully\s+)?(remote|hybrid)\b");
    if let Some(caps) = arrangement.captures(text) {
        let word = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
        let mut canonical = word.to_lowercase();
        if let Some(first) = canonical.get_mut(0..1) {
            first.make_ascii_uppercase();
        }
        return Some(canonical);
    }
    // City, ST
    let city = pattern(r"\b[A-Z][a-zA-Z]+(?:\s[A-Z][a-zA-Z]+)*,\s*[A-Z]{2}\b");
    city.find(text).map(|m| m.as_str().to_string())
}

fn find_job_type(text: &str) -> Option<String> {
    let re = pattern(r"(?i)\b(full[\s-]?time|part[\s-]?time|contract|internship|temporary)\b");
    re.captures(text).map(|caps| {
        caps.get(1)
            .map(|m| m.as_str())
            .unwrap_or_default()
            .to_lowercase()
            .replace(' ', "-")
    })
}

/// Case-insensitive vocabulary scan with manual word boundaries: the
/// characters on either side of a match must not be alphanumeric.
fn find_skills(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    let bytes = lower.as_bytes();
    let mut found = Vec::new();
    for skill in SKILL_VOCABULARY {
        let needle = skill.to_lowercase();
        let mut from = 0;
        while let Some(pos) = lower[from..].find(&needle) {
            let start = from + pos;
            let end = start + needle.len();
            let before_ok = start == 0 || !bytes[start - 1].is_ascii_alphanumeric();
            let after_ok = end >= bytes.len() || !bytes[end].is_ascii_alphanumeric();
            if before_ok && after_ok {
                found.push(skill.to_string());
                break;
            }
            from = end;
        }
    }
    found
}

fn find_education(text: &str) -> Vec<String> {
    let re = pattern(
        r"(?i)\b(?:bachelor|master|associate|doctorate|ph\.?d|b\.?s\.?c?|m\.?s\.?c?|mba)\b(?:['\u{2019}]s)?(?:\s+(?:degree|of\s+\w+))?",
    );
    let mut out: Vec<String> = Vec::new();
    for m in re.find_iter(text).take(MAX_EDUCATION_MATCHES * 2) {
        let text = m.as_str().trim().to_string();
        if !out.iter().any(|e| e.eq_ignore_ascii_case(&text)) {
            out.push(text);
        }
        if out.len() >= MAX_EDUCATION_MATCHES {
            break;
        }
    }
    out
}

fn find_experience(text: &str) -> Vec<String> {
    let re = pattern(r"(?i)\b\d+\+?\s*(?:year|yr)s?\b[^.\n]{0,60}?experience");
    let mut out: Vec<String> = Vec::new();
    for m in re.find_iter(text).take(MAX_EXPERIENCE_MATCHES * 2) {
        let text = collapse_whitespace(m.as_str());
        if !out.iter().any(|e| e.eq_ignore_ascii_case(&text)) {
            out.push(text);
        }
        if out.len() >= MAX_EXPERIENCE_MATCHES {
            break;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_salary_range() {
        let text = "Compensation: $120,000 - $150,000 USD depending on level.";
        assert_eq!(
            find_salary(text).as_deref(),
            Some("$120,000 - $150,000 USD")
        );
    }

    #[test]
    fn test_remote_beats_city() {
        let text = "Location: Remote (headquartered in Austin, TX).";
        assert_eq!(find_location(text).as_deref(), Some("Remote"));
    }

    #[test]
    fn test_city_state_location() {
        let text = "This role is based in San Francisco, CA and requires onsite work.";
        assert_eq!(find_location(text).as_deref(), Some("San Francisco, CA"));
    }

    #[test]
    fn test_job_type_normalized() {
        assert_eq!(
            find_job_type("This is a Full Time position.").as_deref(),
            Some("full-time")
        );
        assert_eq!(
            find_job_type("Offered as a part-time contract.").as_deref(),
            Some("part-time")
        );
    }

    #[test]
    fn test_skills_word_boundaries() {
        let text = "Experience with C++, Rust and Node.js required. Javascript a plus.";
        let skills = find_skills(text);
        assert!(skills.contains(&"C++".to_string()));
        assert!(skills.contains(&"Rust".to_string()));
        assert!(skills.contains(&"Node.js".to_string()));
        assert!(skills.contains(&"JavaScript".to_string()));
        // "Rust" inside "trusted" must not match.
        assert!(find_skills("a trusted partner").is_empty());
    }

    #[test]
    fn test_skills_canonical_capitalization_and_dedup() {
        let skills = find_skills("python, PYTHON and Python");
        assert_eq!(skills, vec!["Python".to_string()]);
    }

    #[test]
    fn test_experience_phrases() {
        let text = "We need 5+ years of backend experience. Also 2 years experience with SQL.";
        let exp = find_experience(text);
        assert_eq!(exp.len(), 2);
        assert!(exp[0].starts_with("5+ years"));
    }

    #[test]
    fn test_education_dedup() {
        let text = "Bachelor's degree required. A bachelor's degree in CS preferred.";
        let edu = find_education(text);
        assert_eq!(edu.len(), 1);
    }

    #[test]
    fn test_title_from_first_h1() {
        let page = crate::page::Page::parse(
            "<body><h1>Staff Engineer</h1><h1>Second</h1></body>",
            None,
        );
        assert_eq!(
            job_attributes(&page, "").title.as_deref(),
            Some("Staff Engineer")
        );
    }
}
