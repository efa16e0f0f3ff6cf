//! Prompt construction. Each builder embeds the size-capped snapshot
//! projection so token cost stays bounded regardless of page size.

use crate::snapshot::PageSnapshot;
use crate::util::truncate_chars;

const MAX_PROFILE_CHARS: usize = 4000;
const MAX_DESCRIPTION_CHARS: usize = 6000;

const ANALYSIS_SYSTEM_PROMPT: &str = "\
You are an assistant helping a job seeker evaluate a posting. Given the \
candidate profile and the page content, write concise, concrete advice: \
fit assessment, gaps to address, and points to emphasize in an \
application. Plain text only, no markdown headers.";

const FORM_FILL_SYSTEM_PROMPT: &str = "\
You fill job application forms. Given a candidate profile and the form \
fields on the page, reply with ONLY a flat JSON object mapping field \
names to the values to enter. Use the exact field names given. Omit \
fields you cannot fill. No markdown, no explanations, no nesting.";

const SCAN_SUMMARY_SYSTEM_PROMPT: &str = "\
Summarize this web page for a job seeker in two or three sentences: what \
the page is, the role if any, and the next action available.";

/// Prose analysis of a posting against the candidate profile.
pub fn analysis_prompt(profile: &str, snapshot: &PageSnapshot) -> String {
    format!(
        "{system}\n\nCandidate profile:\n{profile}\n\nJob description:\n{description}\n\nPage data:\n{projection}",
        system = ANALYSIS_SYSTEM_PROMPT,
        profile = truncate_chars(profile, MAX_PROFILE_CHARS),
        description = truncate_chars(&snapshot.job_description, MAX_DESCRIPTION_CHARS),
        projection = snapshot.prompt_projection(),
    )
}

/// Form-fill request: the reply is expected to be a flat JSON object.
pub fn form_fill_prompt(profile: &str, snapshot: &PageSnapshot) -> String {
    let labels = snapshot.field_labels();
    let field_lines: String = labels
        .iter()
        .map(|(name, label)| format!("- {name}: {label}\n"))
        .collect();
    format!(
        "{system}\n\nCandidate profile:\n{profile}\n\nJob description:\n{description}\n\nForm fields (name: label):\n{fields}\nPage data:\n{projection}",
        system = FORM_FILL_SYSTEM_PROMPT,
        profile = truncate_chars(profile, MAX_PROFILE_CHARS),
        description = truncate_chars(&snapshot.job_description, MAX_DESCRIPTION_CHARS),
        fields = field_lines,
        projection = snapshot.prompt_projection(),
    )
}

/// Short page summary for the scan response.
pub fn scan_summary_prompt(snapshot: &PageSnapshot) -> String {
    format!(
        "{system}\n\nPage data:\n{projection}",
        system = SCAN_SUMMARY_SYSTEM_PROMPT,
        projection = snapshot.prompt_projection(),
    )
}
