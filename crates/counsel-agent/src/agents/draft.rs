use async_trait::async_trait;
use counsel_core::{
    keywords::{IntentTable, KeywordSet},
    AgentId,
};

use super::{asked_about, AgentCapability, AgentDeps, AgentRequest};
use crate::{inference::ModelTier, prompt::PromptBuilder};

const ROLE: &str = "You are a legal drafting specialist. You produce clear, professional \
first drafts with placeholders in [BRACKETS] for anything the case material does not state.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Intent {
    Letter,
    Motion,
    Brief,
    ContractReview,
    Memo,
    Response,
    Template,
    General,
}

impl Intent {
    fn as_str(self) -> &'static str {
        match self {
            Intent::Letter => "letter",
            Intent::Motion => "motion",
            Intent::Brief => "brief",
            Intent::ContractReview => "contract_review",
            Intent::Memo => "memo",
            Intent::Response => "response",
            Intent::Template => "template",
            Intent::General => "general",
        }
    }
}

pub(crate) const INTENTS: IntentTable<Intent> = IntentTable::new(
    &[
        (
            Intent::Letter,
            KeywordSet(&["letter", "correspondence", "write to", "contact", "notify"]),
        ),
        (
            Intent::Motion,
            KeywordSet(&["motion", "petition", "application", "request to court"]),
        ),
        (
            Intent::Brief,
            KeywordSet(&["brief", "memorandum of law", "legal argument", "position paper"]),
        ),
        (
            Intent::ContractReview,
            KeywordSet(&["contract", "agreement", "review", "terms", "clause"]),
        ),
        (
            Intent::Memo,
            KeywordSet(&["memo", "memorandum", "note", "internal"]),
        ),
        (
            Intent::Response,
            KeywordSet(&["response", "reply", "answer", "respond to"]),
        ),
        (
            Intent::Template,
            KeywordSet(&["template", "format", "structure", "example"]),
        ),
    ],
    Intent::General,
);

/// Prompt shape per document kind: heading for the reply and what to include.
struct DraftKind {
    title: &'static str,
    asks: &'static [&'static str],
}

fn kind(intent: Intent) -> DraftKind {
    match intent {
        Intent::Letter => DraftKind {
            title: "📧 **Draft Letter**",
            asks: &[
                "A professional letterhead block",
                "Clear statement of purpose",
                "The relevant facts",
                "The requested action and a deadline",
                "A professional closing",
            ],
        },
        Intent::Motion => DraftKind {
            title: "⚖️ **Draft Motion**",
            asks: &[
                "Caption and title",
                "Relief requested",
                "Statement of facts",
                "Legal argument with authority placeholders",
                "Conclusion and prayer for relief",
            ],
        },
        Intent::Brief => DraftKind {
            title: "📚 **Draft Brief**",
            asks: &[
                "Statement of issues",
                "Statement of facts",
                "Argument organized by issue",
                "Conclusion",
            ],
        },
        Intent::ContractReview => DraftKind {
            title: "📝 **Contract Review**",
            asks: &[
                "Key terms and obligations",
                "Risky or one-sided clauses",
                "Missing protections",
                "Suggested revisions",
            ],
        },
        Intent::Memo => DraftKind {
            title: "📄 **Draft Memorandum**",
            asks: &["Question presented", "Brief answer", "Facts", "Discussion", "Conclusion"],
        },
        Intent::Response => DraftKind {
            title: "↩️ **Draft Response**",
            asks: &[
                "Acknowledgement of the communication being answered",
                "Point-by-point response",
                "Our position",
                "Proposed next steps",
            ],
        },
        Intent::Template | Intent::General => DraftKind {
            title: "✍️ **Drafting Guidance**",
            asks: &[
                "The right document type for the situation",
                "Key elements to include",
                "Formatting and structure suggestions",
                "Common pitfalls to avoid",
            ],
        },
    }
}

/// Letters, motions, briefs, memos, responses and contract review.
pub struct DraftAgent {
    deps: AgentDeps,
}

impl DraftAgent {
    pub fn new(deps: AgentDeps) -> Self {
        Self { deps }
    }

    async fn draft(&self, req: &AgentRequest<'_>, intent: Intent) -> String {
        let context = if intent == Intent::ContractReview {
            let contracts = self.deps.docs.contract_documents(req.case_id).await;
            let case = self.deps.docs.case_context(req.case_id).await;
            format!("{case}\n\n{contracts}")
        } else {
            self.deps.docs.case_context(req.case_id).await
        };
        let kind = kind(intent);
        let prompt = PromptBuilder::new(ROLE, req.message)
            .section("Case context", context)
            .history(req.history, 3)
            .ask(kind.asks)
            .build();
        match self
            .deps
            .generate(AgentId::Draft, intent.as_str(), prompt, ModelTier::Standard)
            .await
        {
            Some(text) => format!("{}\n\n{text}", kind.title),
            None => format!(
                "{}\n\n{}\n\nHere is a starting template:\n\n{}",
                kind.title,
                asked_about(req.message),
                template(intent)
            ),
        }
    }
}

#[async_trait]
impl AgentCapability for DraftAgent {
    fn id(&self) -> AgentId {
        AgentId::Draft
    }

    async fn respond(&self, req: &AgentRequest<'_>) -> String {
        match INTENTS.classify(req.message) {
            Intent::Template => template_list(req.message),
            intent => self.draft(req, intent).await,
        }
    }
}

fn template(intent: Intent) -> &'static str {
    match intent {
        Intent::Letter => LETTER_TEMPLATE,
        Intent::Motion => MOTION_TEMPLATE,
        Intent::Brief => BRIEF_TEMPLATE,
        Intent::ContractReview => CONTRACT_REVIEW_TEMPLATE,
        Intent::Memo => MEMO_TEMPLATE,
        Intent::Response => RESPONSE_TEMPLATE,
        Intent::Template | Intent::General => GENERAL_CHECKLIST,
    }
}

fn template_list(message: &str) -> String {
    format!(
        "📋 **Available Templates**\n\n{}\n\n\
         - **Letter**: demand letters and client correspondence\n\
         - **Motion**: requests to the court\n\
         - **Brief**: written legal argument\n\
         - **Contract review**: a clause-by-clause checklist\n\
         - **Memo**: internal research memorandum\n\
         - **Response**: replies to opposing counsel\n\n\
         Ask me to draft one of these and I will start from the matching template.",
        asked_about(message)
    )
}

const LETTER_TEMPLATE: &str = "📧 **Legal Letter Template**

[YOUR FIRM LETTERHEAD]

[Date]

[Recipient Name]
[Recipient Address]

Re: [Matter Name / Reference Number]

Dear [Recipient Name]:

[Opening: purpose of the letter]

[Body: relevant facts and legal basis]

[Request: the action required and the deadline]

[Closing: consequences of inaction, contact details]

Sincerely,

[Attorney Name]
[Title]";

const MOTION_TEMPLATE: &str = "⚖️ **Motion Template**

[COURT NAME]
[CASE CAPTION]
Case No. [Number]

MOTION FOR [RELIEF REQUESTED]

[Party] respectfully moves this Court for [relief] and states:

I. INTRODUCTION
II. STATEMENT OF FACTS
III. LEGAL STANDARD
IV. ARGUMENT
V. CONCLUSION

WHEREFORE, [Party] requests that the Court grant this motion.

[Signature Block]";

const BRIEF_TEMPLATE: &str = "📚 **Brief Template**

[COURT NAME]
[CASE CAPTION]

BRIEF IN SUPPORT OF [POSITION]

TABLE OF CONTENTS
TABLE OF AUTHORITIES
I. STATEMENT OF ISSUES
II. STATEMENT OF THE CASE
III. STATEMENT OF FACTS
IV. SUMMARY OF ARGUMENT
V. ARGUMENT
VI. CONCLUSION

[Signature Block]";

const CONTRACT_REVIEW_TEMPLATE: &str = "📝 **Contract Review Checklist**

1. **Parties**: correct legal names and capacities
2. **Term**: start date, duration, renewal
3. **Obligations**: what each party must deliver
4. **Payment**: amounts, schedule, late fees
5. **Termination**: triggers, notice periods, effects
6. **Liability**: caps, indemnities, exclusions
7. **Disputes**: governing law, venue, arbitration
8. **Boilerplate**: assignment, notices, entire agreement";

const MEMO_TEMPLATE: &str = "📄 **Memorandum Template**

MEMORANDUM

TO: [Recipient]
FROM: [Author]
DATE: [Date]
RE: [Subject]

QUESTION PRESENTED
[The legal question]

BRIEF ANSWER
[Short answer]

FACTS
[Relevant facts]

DISCUSSION
[Analysis]

CONCLUSION
[Recommendation]";

const RESPONSE_TEMPLATE: &str = "↩️ **Response Template**

[Date]

[Recipient]

Re: Your letter of [Date] regarding [Matter]

Dear [Name]:

We write in response to your letter dated [Date].

[Point-by-point response]

[Our position]

[Proposed next steps]

Sincerely,

[Attorney Name]";

const GENERAL_CHECKLIST: &str = "**Drafting checklist**:
1. Identify the audience and the purpose
2. Gather the facts and documents you will rely on
3. Outline before writing
4. Cite authority for every legal proposition
5. Proofread names, dates and amounts";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intents_follow_first_match_order() {
        assert_eq!(INTENTS.classify("write to the landlord"), Intent::Letter);
        assert_eq!(INTENTS.classify("file a petition"), Intent::Motion);
        assert_eq!(INTENTS.classify("legal argument for appeal"), Intent::Brief);
        assert_eq!(INTENTS.classify("check this clause"), Intent::ContractReview);
        assert_eq!(INTENTS.classify("internal memo"), Intent::Memo);
        assert_eq!(INTENTS.classify("reply to opposing counsel"), Intent::Response);
        assert_eq!(INTENTS.classify("show a template"), Intent::Template);
        assert_eq!(INTENTS.classify("help me draft"), Intent::General);
    }

    #[test]
    fn every_drafting_intent_has_a_template() {
        for intent in [
            Intent::Letter,
            Intent::Motion,
            Intent::Brief,
            Intent::ContractReview,
            Intent::Memo,
            Intent::Response,
            Intent::General,
        ] {
            assert!(!template(intent).is_empty(), "{intent:?}");
            assert!(!kind(intent).asks.is_empty(), "{intent:?}");
        }
    }
}
