//! Prompt construction for generation and naming.

/// Placeholder used when a run carries no flavor.
pub const DEFAULT_FLAVOR: &str = "default";

/// System prompt for a document generation run.
pub fn system_prompt(flavor: Option<&str>) -> String {
    let flavor = flavor
        .map(str::trim)
        .filter(|f| !f.is_empty())
        .unwrap_or(DEFAULT_FLAVOR);
    format!(
        "You are an expert web designer. Create a single HTML file with embedded CSS and \
         JavaScript based on the user's requirements. The user wants a \"{}\" style/approach. \
         The focus is on the visual design and layout of the page, not on complete \
         functionality. You may mock any interactions and/or functionality as necessary. \
         Generate complete, working HTML with <style> and <script> tags. Do not use external \
         dependencies. Return ONLY the HTML code, wrapped in a markdown code block.",
        flavor
    )
}

pub const NAMING_SYSTEM_PROMPT: &str = "You are a helpful assistant that names projects into a \
     few words (max 5 words). You will be given a prompt used to generate a project, and you \
     will need to return the name of the project. Return solely the name of the project, no \
     other text or explanation.";

/// User message for the naming call.
pub fn naming_prompt(prompt: &str) -> String {
    format!("<prompt>\n{}\n</prompt>", prompt.trim())
}

/// Clean up a model-suggested name. Returns `None` if nothing usable remains.
pub fn clean_name(raw: &str) -> Option<String> {
    let line = raw.lines().map(str::trim).find(|l| !l.is_empty())?;
    let name = line
        .trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == '*')
        .trim();
    if name.is_empty() {
        None
    } else {
        Some(name.to_string())
    }
}
