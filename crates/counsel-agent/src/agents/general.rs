use async_trait::async_trait;
use counsel_core::{
    keywords::{IntentTable, KeywordSet},
    AgentId, Case,
};
use serde::Serialize;
use tracing::{error, info};

use super::{asked_about, AgentCapability, AgentDeps, AgentRequest};
use crate::{inference::ModelTier, prompt::PromptBuilder};

const ROLE: &str = "You are an experienced litigation attorney advising a colleague. You reason \
from the facts of the case, name the legal principles involved, and are explicit about risk.";

pub const DISCLAIMER: &str = "**Disclaimer:** This guidance is for informational purposes only \
and does not constitute formal legal advice.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    LegalAdvice,
    Strategy,
    Procedure,
    Research,
    Risk,
    Settlement,
    Timeline,
    General,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::LegalAdvice => "legal_advice",
            Intent::Strategy => "case_strategy",
            Intent::Procedure => "procedure_guidance",
            Intent::Research => "research_help",
            Intent::Risk => "risk_assessment",
            Intent::Settlement => "settlement_analysis",
            Intent::Timeline => "timeline_guidance",
            Intent::General => "general",
        }
    }
}

pub(crate) const INTENTS: IntentTable<Intent> = IntentTable::new(
    &[
        (
            Intent::LegalAdvice,
            KeywordSet(&["advice", "recommend", "should i", "what do you think", "opinion"]),
        ),
        (
            Intent::Strategy,
            KeywordSet(&["strategy", "approach", "plan", "tactics", "how to handle"]),
        ),
        (
            Intent::Procedure,
            KeywordSet(&["procedure", "process", "steps", "how to", "court rules"]),
        ),
        (
            Intent::Research,
            KeywordSet(&["research", "law", "statute", "case law", "precedent"]),
        ),
        (
            Intent::Risk,
            KeywordSet(&["risk", "danger", "problem", "issue", "concern"]),
        ),
        (
            Intent::Settlement,
            KeywordSet(&["settlement", "negotiate", "resolve", "compromise"]),
        ),
        (
            Intent::Timeline,
            KeywordSet(&["timeline", "deadline", "when", "schedule", "timing"]),
        ),
    ],
    Intent::General,
);

/// Structured case insights for dashboards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Insights {
    pub key_topics: Vec<String>,
    pub recent_activity: String,
    pub suggested_actions: Vec<String>,
    pub risk_factors: Vec<String>,
    pub opportunities: Vec<String>,
}

impl Insights {
    pub fn is_empty(&self) -> bool {
        self.key_topics.is_empty()
            && self.recent_activity.is_empty()
            && self.suggested_actions.is_empty()
            && self.risk_factors.is_empty()
            && self.opportunities.is_empty()
    }
}

/// Open-ended legal reasoning: advice, strategy, procedure, risk.
pub struct GeneralAgent {
    deps: AgentDeps,
}

impl GeneralAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn case(&self, case_id: &str) -> Option<Case> {
        match self.deps.store.get_case(case_id).await {
            Ok(case) => case,
            Err(e) => {
                error!(case_id, "case lookup failed: {e:#}");
                None
            },
        }
    }

    /// Topics, activity, actions, risks and opportunities for a case.
    /// All-empty when the case does not exist.
    pub async fn case_insights(&self, case_id: &str) -> Insights {
        let Some(case) = self.case(case_id).await else {
            info!(case_id, "insights requested for unknown case");
            return Insights::default();
        };
        let context = self.deps.docs.case_context(case_id).await;
        let prompt = PromptBuilder::new(ROLE, "Analyze this legal case and provide insights")
            .section("Case context", context)
            .ask(&[
                "Key topics and themes (5-7 topics)",
                "Recent activity summary (brief description)",
                "Suggested actions (3-5 actionable recommendations)",
                "Risk factors (3-5 potential risks)",
                "Opportunities (3-5 potential advantages)",
            ])
            .closing("Use one heading per item above and a bulleted list under each heading.")
            .build();

        match self
            .deps
            .generate(AgentId::General, "case_insights", prompt, ModelTier::Advanced)
            .await
            .map(|text| parse_insights(&text))
        {
            Some(parsed) if !parsed.is_empty() => parsed,
            _ => basic_insights(&case),
        }
    }

    async fn answer(&self, req: &AgentRequest<'_>, intent: Intent) -> String {
        let case = self.case(req.case_id).await;
        let case_type = case
            .as_ref()
            .map(|c| c.case_type.as_str())
            .filter(|t| !t.is_empty())
            .unwrap_or("legal");

        let mut builder = PromptBuilder::new(ROLE, req.message);
        if intent != Intent::Procedure {
            builder = builder.section("Case context", self.deps.docs.case_context(req.case_id).await);
        }
        if matches!(intent, Intent::LegalAdvice | Intent::General) {
            builder = builder.history(req.history, 3);
        }
        let prompt = builder.ask(asks(intent)).build();

        match self
            .deps
            .generate(AgentId::General, intent.as_str(), prompt, ModelTier::Advanced)
            .await
        {
            Some(text) if intent == Intent::LegalAdvice => {
                format!("⚖️ **Legal Guidance**\n\n{text}\n\n{DISCLAIMER}")
            },
            Some(text) => text,
            None => fallback(intent, req.message, case_type),
        }
    }
}

#[async_trait]
impl AgentCapability for GeneralAgent {
    fn id(&self) -> AgentId {
        AgentId::General
    }

    async fn respond(&self, req: &AgentRequest<'_>) -> String {
        self.answer(req, INTENTS.classify(req.message)).await
    }
}

fn asks(intent: Intent) -> &'static [&'static str] {
    match intent {
        Intent::LegalAdvice => &[
            "The legal principles involved",
            "How they apply to this case",
            "Options and their trade-offs",
            "A recommendation",
        ],
        Intent::Strategy => &[
            "Strategic objectives",
            "Strengths and weaknesses",
            "Recommended approach and tactics",
            "Contingencies",
        ],
        Intent::Procedure => &[
            "The procedural steps in order",
            "Filing requirements and deadlines",
            "Common procedural mistakes",
        ],
        Intent::Research => &[
            "Areas of law to research",
            "Types of authority to look for",
            "Suggested search terms",
        ],
        Intent::Risk => &[
            "Legal risks",
            "Factual and evidentiary risks",
            "Likelihood and impact of each",
            "Mitigation steps",
        ],
        Intent::Settlement => &[
            "Settlement leverage on each side",
            "A realistic settlement range and the factors behind it",
            "Negotiation approach",
            "Terms to insist on",
        ],
        Intent::Timeline => &[
            "Key deadlines that likely apply",
            "A realistic schedule for the next steps",
            "Timing risks",
        ],
        Intent::General => &["A direct answer", "Relevant considerations", "Suggested next steps"],
    }
}

fn fallback(intent: Intent, message: &str, case_type: &str) -> String {
    let body = match intent {
        Intent::LegalAdvice => format!(
            "⚖️ **Legal Guidance**\n\n{}\n\n\
             **Recommended approach**:\n\
             1. **Gather information**: collect the relevant facts and documents\n\
             2. **Research the law**: identify the statutes and case law that apply\n\
             3. **Analyze options**: compare the strategies available\n\
             4. **Assess risks**: weigh likely outcomes\n\
             5. **Seek counsel**: confirm with a qualified professional\n\n\
             **Considerations for {case_type} matters**:\n\
             - Jurisdiction-specific requirements\n\
             - Statutes of limitations\n\
             - Procedural deadlines",
            asked_about(message)
        ),
        Intent::Strategy => format!(
            "🎯 **Case Strategy Framework**\n\n{}\n\n\
             1. **Define objectives**: what a good outcome looks like\n\
             2. **Assess position**: strengths and weaknesses of the {case_type} claim\n\
             3. **Choose an approach**: litigate, negotiate or both in parallel\n\
             4. **Plan contingencies**: what changes if key evidence falls away",
            asked_about(message)
        ),
        Intent::Procedure => format!(
            "📋 **Procedural Guidance**\n\n{}\n\n\
             1. Confirm the court and the rules that govern it\n\
             2. Check filing formats and service requirements\n\
             3. Calendar every deadline with a margin\n\
             4. Keep proof of filing and service",
            asked_about(message)
        ),
        Intent::Research => format!(
            "🔎 **Research Guidance**\n\n{}\n\n\
             - Start with the governing statutes for {case_type} matters\n\
             - Find leading cases in the jurisdiction and check they are still good law\n\
             - Look for secondary sources that summarize the area\n\
             - Keep a research log of sources and search terms",
            asked_about(message)
        ),
        Intent::Risk => format!(
            "⚠️ **Risk Assessment**\n\n{}\n\n\
             **Risk areas to review**:\n\
             - **Legal**: weak claims or strong defenses\n\
             - **Evidence**: missing or inadmissible material\n\
             - **Procedural**: missed deadlines or jurisdiction problems\n\
             - **Financial**: costs against likely recovery",
            asked_about(message)
        ),
        Intent::Settlement => format!(
            "🤝 **Settlement Analysis**\n\n{}\n\n\
             - Estimate the likely outcome at trial and its cost\n\
             - Identify what each side needs from a deal\n\
             - Set a walk-away point before negotiating\n\
             - Put every agreed term in writing",
            asked_about(message)
        ),
        Intent::Timeline => format!(
            "⏰ **Timeline Guidance**\n\n{}\n\n\
             - Identify limitation periods that apply to {case_type} matters\n\
             - List court-imposed deadlines\n\
             - Work backwards from each deadline to plan preparation\n\
             - Review the calendar weekly",
            asked_about(message)
        ),
        Intent::General => format!(
            "⚖️ **Legal Assistance**\n\n{}\n\n\
             I can help with legal advice, case strategy, procedure, research, risk \
             assessment, settlement analysis and deadlines. Tell me more about what you \
             need and I will focus on that.",
            asked_about(message)
        ),
    };
    format!("{body}\n\n{DISCLAIMER}")
}

fn basic_insights(case: &Case) -> Insights {
    let strings = |items: &[&str]| -> Vec<String> { items.iter().map(|s| s.to_string()).collect() };
    Insights {
        key_topics: strings(&[
            "Case management and organization",
            "Document review and analysis",
            "Legal strategy development",
            "Risk assessment and mitigation",
        ]),
        recent_activity: format!(
            "Case \"{}\" is in {} status with ongoing document management.",
            case.title, case.status
        ),
        suggested_actions: strings(&[
            "Review and organize all case documents",
            "Conduct comprehensive case analysis",
            "Develop strategic action plan",
            "Identify key legal issues and risks",
        ]),
        risk_factors: strings(&[
            "Incomplete document collection",
            "Missing critical evidence",
            "Approaching deadlines",
            "Regulatory compliance requirements",
        ]),
        opportunities: strings(&[
            "Strong document organization system",
            "AI-powered analysis capabilities",
            "Comprehensive case management tools",
            "Efficient collaboration platform",
        ]),
    }
}

// ── Insights parsing ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Topics,
    Activity,
    Actions,
    Risks,
    Opportunities,
}

const SECTION_TERMS: &[(Section, &str)] = &[
    (Section::Topics, "topics"),
    (Section::Activity, "activity"),
    (Section::Actions, "actions"),
    (Section::Risks, "risk"),
    (Section::Opportunities, "opportunit"),
];

const MAX_HEADING_CHARS: usize = 60;

/// `1.`, `2)`, `-`, `*`, `•` list markers; returns the item text.
fn list_item(line: &str) -> Option<&str> {
    if let Some(rest) = line.strip_prefix(['-', '*', '•']) {
        if !rest.starts_with('*') {
            return Some(rest.trim());
        }
    }
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    if digits > 0 {
        let rest = &line[digits..];
        if let Some(item) = rest.strip_prefix(['.', ')']) {
            return Some(item.trim());
        }
    }
    None
}

fn section_of(text: &str) -> Option<Section> {
    let lowered = text.to_lowercase();
    SECTION_TERMS
        .iter()
        .find(|(_, term)| lowered.contains(term))
        .map(|(section, _)| *section)
}

fn strip_emphasis(text: &str) -> &str {
    text.trim_matches(|c| matches!(c, '*' | '#' | '_' | ' ' | ':'))
}

/// Split free-form model output into insight sections.
///
/// A line is a heading when it names a section and is either a short plain
/// line or a list item ending in `:`. List items under a list section become
/// entries; any text under the activity heading is joined into one sentence.
pub fn parse_insights(text: &str) -> Insights {
    let mut out = Insights::default();
    let mut current: Option<Section> = None;
    let mut activity: Vec<&str> = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        let item = list_item(line);
        let is_heading = match item {
            Some(body) => body.ends_with(':') || body.ends_with(":**"),
            None => line.chars().count() <= MAX_HEADING_CHARS || line.ends_with(':'),
        };
        if is_heading {
            if let Some(section) = section_of(line) {
                current = Some(section);
                continue;
            }
        }

        let body = strip_emphasis(item.unwrap_or(line));
        if body.is_empty() {
            continue;
        }
        match (current, item) {
            (Some(Section::Activity), _) => activity.push(body),
            (Some(Section::Topics), Some(_)) => out.key_topics.push(body.to_string()),
            (Some(Section::Actions), Some(_)) => out.suggested_actions.push(body.to_string()),
            (Some(Section::Risks), Some(_)) => out.risk_factors.push(body.to_string()),
            (Some(Section::Opportunities), Some(_)) => out.opportunities.push(body.to_string()),
            _ => {},
        }
    }

    out.recent_activity = activity.join(" ");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_follow_first_match_order() {
        assert_eq!(INTENTS.classify("What do you think?"), Intent::LegalAdvice);
        assert_eq!(INTENTS.classify("tactics for trial"), Intent::Strategy);
        assert_eq!(INTENTS.classify("court rules for filing"), Intent::Procedure);
        assert_eq!(INTENTS.classify("any precedent?"), Intent::Research);
        assert_eq!(INTENTS.classify("biggest danger here"), Intent::Risk);
        assert_eq!(INTENTS.classify("can we negotiate"), Intent::Settlement);
        assert_eq!(INTENTS.classify("upcoming deadline"), Intent::Timeline);
        assert_eq!(INTENTS.classify("hello"), Intent::General);
    }

    #[test]
    fn list_items_recognize_markers() {
        assert_eq!(list_item("1. First"), Some("First"));
        assert_eq!(list_item("12) Twelfth"), Some("Twelfth"));
        assert_eq!(list_item("- dash"), Some("dash"));
        assert_eq!(list_item("• bullet"), Some("bullet"));
        assert_eq!(list_item("**Bold heading**"), None);
        assert_eq!(list_item("2024 was busy"), None);
    }

    #[test]
    fn every_fallback_carries_the_disclaimer() {
        for intent in [
            Intent::LegalAdvice,
            Intent::Strategy,
            Intent::Procedure,
            Intent::Research,
            Intent::Risk,
            Intent::Settlement,
            Intent::Timeline,
            Intent::General,
        ] {
            let text = fallback(intent, "q", "contract");
            assert!(text.ends_with(DISCLAIMER), "{intent:?}");
            assert!(text.contains("\"q\""), "{intent:?}");
        }
    }
}
