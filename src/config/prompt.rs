/// Fixed instructions for the single-shot analysis endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskPrompt {
    ResumeAnalysis,
    Synthesis,
}

const RESUME_ANALYSIS_TEMPLATE: &str =
    "Analyze this professional history and extract a persona profile for a digital twin.
Return a JSON object with these fields:
- name: string
- profession: string
- bio: a concise first-person professional biography
- tone: how this person communicates
- coreValues: array of short strings
- originFacts: array of objects with year, event and significance
Only include facts supported by the material.

Material to analyze: {content}";

const SYNTHESIS_TEMPLATE: &str =
    "Synthesize these artifacts into the persona's memory mosaic.
Focus on professional strategic artifacts and evidence.
Return a JSON object with a 'newShards' array.
Each shard MUST have: title, category (one of: axiom, chronos, echo, logos, ethos), content, and sensitivity (PRIVATE or PUBLIC).

Content to synthesize: {content}";

const ATTACHED_ONLY: &str = "(see the attached document)";

impl TaskPrompt {
    fn template(self) -> &'static str {
        match self {
            TaskPrompt::ResumeAnalysis => RESUME_ANALYSIS_TEMPLATE,
            TaskPrompt::Synthesis => SYNTHESIS_TEMPLATE,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            TaskPrompt::ResumeAnalysis => "resume-analysis",
            TaskPrompt::Synthesis => "synthesis",
        }
    }

    /// Fills the instruction with the caller's free text, or points at the attachment when there is none.
    pub fn render(self, content: Option<&str>) -> String {
        let content = content
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(ATTACHED_ONLY);
        self.template().replace("{content}", content)
    }
}
