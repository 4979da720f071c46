//! Prompt templating for the sequential executor.
//!
//! A template is plain text with named `{placeholder}` slots. Substitution is
//! total: every known placeholder is replaced, unknown ones are left verbatim
//! so partial templates keep working.

use std::path::Path;

/// Named values available to a job prompt.
///
/// - `{workspace}` — workspace root directory
/// - `{current}` — the job's ephemeral subtree
/// - `{project}` — persistent output project root
/// - `{project_name}` — output project directory name
/// - `{job_id}` — the job's ordinal-prefixed id
/// - `{report}` — input document path relative to the subtree
/// - `{assets}` — asset directory path relative to the subtree (empty when absent)
#[derive(Debug, Clone)]
pub struct PromptVars {
    pub workspace: String,
    pub current: String,
    pub project: String,
    pub project_name: String,
    pub job_id: String,
    pub report: String,
    pub assets: String,
}

#[derive(Debug, Clone)]
pub struct PromptTemplate {
    text: String,
}

pub const DEFAULT_TEMPLATE: &str = "\
Work inside the directory {current} and complete the task described in {report}.
Supporting diagram sources, when present, live under {assets}.

Requirements:
1) Read {report} and understand what it asks for.
2) Produce the requested outputs for job {job_id} inside {current}.
3) Persist results that belong in the project under {project}.
4) When a dependency is unavailable, create a minimal placeholder and note it.

Note: a previous run may have been interrupted; review existing work in
{current} before redoing anything, then continue until the task is complete.
";

impl PromptTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Load a template file if it exists, otherwise fall back to the default.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        if let Some(p) = path
            && let Ok(text) = std::fs::read_to_string(p)
        {
            return Self::new(text);
        }
        Self::new(DEFAULT_TEMPLATE)
    }

    pub fn render(&self, vars: &PromptVars) -> String {
        let pairs = [
            ("{workspace}", vars.workspace.as_str()),
            ("{current}", vars.current.as_str()),
            ("{project}", vars.project.as_str()),
            ("{project_name}", vars.project_name.as_str()),
            ("{job_id}", vars.job_id.as_str()),
            ("{report}", vars.report.as_str()),
            ("{assets}", vars.assets.as_str()),
        ];
        let mut out = self.text.clone();
        for (name, value) in pairs {
            out = out.replace(name, value);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> PromptVars {
        PromptVars {
            workspace: "/w".into(),
            current: "/w/current".into(),
            project: "/p".into(),
            project_name: "p".into(),
            job_id: "001-aaa0000".into(),
            report: "report.tex".into(),
            assets: "assets".into(),
        }
    }

    #[test]
    fn known_placeholders_are_substituted() {
        let t = PromptTemplate::new("cd {current}; job={job_id}; out={project}");
        assert_eq!(
            t.render(&vars()),
            "cd /w/current; job=001-aaa0000; out=/p"
        );
    }

    #[test]
    fn unknown_placeholders_stay_verbatim() {
        let t = PromptTemplate::new("{job_id} {mystery} {report}");
        assert_eq!(t.render(&vars()), "001-aaa0000 {mystery} report.tex");
    }

    #[test]
    fn default_template_mentions_every_input() {
        let rendered = PromptTemplate::new(DEFAULT_TEMPLATE).render(&vars());
        assert!(rendered.contains("/w/current"));
        assert!(rendered.contains("report.tex"));
        assert!(rendered.contains("001-aaa0000"));
        assert!(!rendered.contains('{'));
    }

    #[test]
    fn missing_override_file_falls_back_to_default() {
        let t = PromptTemplate::load_or_default(Some(Path::new("/nonexistent/tmpl.txt")));
        assert!(t.render(&vars()).contains("Requirements"));
    }
}
