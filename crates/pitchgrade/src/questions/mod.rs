//! Static question tables and routing.
//!
//! Each canonical stage carries its own ordered question set with its
//! own canonical ids: the same concept ("what problem does this
//! solve") has a different id per stage, so every mapping here is
//! stage-qualified. Legacy answer keys from older intake forms are
//! normalized onto the canonical ids.

use crate::stage::CanonicalStage;

/// Static configuration for one question within a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuestionSpec {
    /// Stable, stage-qualified identifier.
    pub id: &'static str,
    /// Human-readable label shown to applicants and admins.
    pub label: &'static str,
    /// Display order, unique within the stage.
    pub order: u32,
    /// Evaluation prompt template handed to the scoring oracle.
    pub prompt: &'static str,
}

const GRADING_FORMAT: &str = "Respond in exactly this format:\n\
SCORE: <number from 0 to 10>/10\n\
Strengths: <what is convincing about the answer>\n\
Areas for Improvement: <what is missing or weak>";

const IDEA_QUESTIONS: &[QuestionSpec] = &[
    QuestionSpec {
        id: "idea_problem",
        label: "What problem does your idea solve?",
        order: 1,
        prompt: "You are evaluating a startup application at the idea stage. \
                 Judge how clearly the applicant articulates the problem, who has it, \
                 and how painful it is. Reward specificity over ambition.",
    },
    QuestionSpec {
        id: "idea_solution",
        label: "How would your solution work?",
        order: 2,
        prompt: "You are evaluating a startup application at the idea stage. \
                 Judge whether the proposed solution plausibly addresses the stated \
                 problem and whether the applicant understands what building it takes.",
    },
    QuestionSpec {
        id: "idea_market",
        label: "Who are your target customers and how large is the market?",
        order: 3,
        prompt: "You are evaluating a startup application at the idea stage. \
                 Judge the applicant's understanding of their target customer and \
                 market size. Vague 'everyone' answers score low.",
    },
    QuestionSpec {
        id: "idea_execution",
        label: "Why are you the right team to pursue this idea?",
        order: 4,
        prompt: "You are evaluating a startup application at the idea stage. \
                 Judge founder-problem fit: relevant experience, insight, and \
                 evidence the team can execute.",
    },
];

const MVP_QUESTIONS: &[QuestionSpec] = &[
    QuestionSpec {
        id: "mvp_problem",
        label: "What problem does your product solve?",
        order: 1,
        prompt: "You are evaluating a startup application at the MVP stage. \
                 Judge how clearly the applicant articulates the problem and whether \
                 the MVP's existence has sharpened their understanding of it.",
    },
    QuestionSpec {
        id: "mvp_product",
        label: "Describe your MVP and what it can do today.",
        order: 2,
        prompt: "You are evaluating a startup application at the MVP stage. \
                 Judge the concreteness of the MVP description: what works today, \
                 what is faked, and what was learned building it.",
    },
    QuestionSpec {
        id: "mvp_traction",
        label: "What usage or feedback has your MVP received?",
        order: 3,
        prompt: "You are evaluating a startup application at the MVP stage. \
                 Judge the evidence of real usage: user counts, retention signals, \
                 and the quality of feedback loops. Anecdotes score lower than numbers.",
    },
    QuestionSpec {
        id: "mvp_team",
        label: "Who is on the team and who built the MVP?",
        order: 4,
        prompt: "You are evaluating a startup application at the MVP stage. \
                 Judge whether the team that built the MVP can carry it to market, \
                 and whether critical skills are in-house.",
    },
];

const REVENUE_QUESTIONS: &[QuestionSpec] = &[
    QuestionSpec {
        id: "rev_problem",
        label: "What problem do your paying customers have?",
        order: 1,
        prompt: "You are evaluating a startup application at the early-revenue stage. \
                 Judge whether revenue validates the stated problem: are customers \
                 paying for the thing the applicant says hurts?",
    },
    QuestionSpec {
        id: "rev_business_model",
        label: "How do you make money and what are your unit economics?",
        order: 2,
        prompt: "You are evaluating a startup application at the early-revenue stage. \
                 Judge the coherence of the business model: pricing, margins, and \
                 whether the applicant knows their unit economics.",
    },
    QuestionSpec {
        id: "rev_growth",
        label: "How has revenue developed and how will you grow it?",
        order: 3,
        prompt: "You are evaluating a startup application at the early-revenue stage. \
                 Judge the revenue trajectory and the credibility of the growth plan. \
                 Reward repeatable acquisition channels over one-off wins.",
    },
    QuestionSpec {
        id: "rev_team",
        label: "Who is on the team and how do you split responsibilities?",
        order: 4,
        prompt: "You are evaluating a startup application at the early-revenue stage. \
                 Judge whether the team composition matches what scaling revenue \
                 requires, commercially and technically.",
    },
];

/// Legacy answer keys mapped onto canonical ids, per stage. Checked
/// after the exact-id match and before the label heuristic.
const LEGACY_ALIASES: &[(&str, [&str; 3])] = &[
    // (legacy key, [idea id, mvp id, revenue id])
    ("problem", ["idea_problem", "mvp_problem", "rev_problem"]),
    ("problem_statement", ["idea_problem", "mvp_problem", "rev_problem"]),
    ("solution", ["idea_solution", "mvp_product", "rev_business_model"]),
    ("product", ["idea_solution", "mvp_product", "rev_business_model"]),
    ("market", ["idea_market", "mvp_traction", "rev_growth"]),
    ("market_size", ["idea_market", "mvp_traction", "rev_growth"]),
    ("traction", ["idea_market", "mvp_traction", "rev_growth"]),
    ("team", ["idea_execution", "mvp_team", "rev_team"]),
    ("founders", ["idea_execution", "mvp_team", "rev_team"]),
    ("business_model", ["idea_solution", "mvp_product", "rev_business_model"]),
];

/// Label fragments for the free-text heuristic, tried in order against
/// the supplied question text and matched to the stage's labels.
const LABEL_FRAGMENTS: &[&str] = &["problem", "team", "market", "revenue", "money", "usage",
    "feedback", "solution", "product", "grow"];

/// Returns the ordered question set for a stage.
pub fn questions_for(stage: CanonicalStage) -> &'static [QuestionSpec] {
    match stage {
        CanonicalStage::IdeaStage => IDEA_QUESTIONS,
        CanonicalStage::MvpStage => MVP_QUESTIONS,
        CanonicalStage::EarlyRevenue => REVENUE_QUESTIONS,
    }
}

/// Renders the complete oracle prompt for a question: the stage-specific
/// rubric followed by the response format contract.
pub fn full_prompt(spec: &QuestionSpec) -> String {
    format!("{}\n\n{}", spec.prompt, GRADING_FORMAT)
}

/// Looks up a question by canonical id within a stage.
pub fn question_by_id(stage: CanonicalStage, id: &str) -> Option<&'static QuestionSpec> {
    questions_for(stage).iter().find(|q| q.id == id)
}

fn alias_index(stage: CanonicalStage) -> usize {
    match stage {
        CanonicalStage::IdeaStage => 0,
        CanonicalStage::MvpStage => 1,
        CanonicalStage::EarlyRevenue => 2,
    }
}

/// Resolves a raw question key (possibly legacy, possibly free text) to
/// the canonical id for the given stage.
///
/// Resolution order: exact stage-qualified id → legacy alias table →
/// label-fragment heuristic on `question_text` → the stage's first
/// question as a last resort.
pub fn normalize_question_id(
    raw_id: &str,
    stage: CanonicalStage,
    question_text: Option<&str>,
) -> &'static str {
    let questions = questions_for(stage);

    if let Some(id) = resolve_known(raw_id, stage) {
        return id;
    }

    // Free-text heuristic against the question label.
    if let Some(text) = question_text {
        let text_lower = text.to_lowercase();
        for fragment in LABEL_FRAGMENTS {
            if !text_lower.contains(fragment) {
                continue;
            }
            if let Some(q) = questions
                .iter()
                .find(|q| q.label.to_lowercase().contains(fragment))
            {
                return q.id;
            }
        }
    }

    // Default to the stage's first question.
    questions[0].id
}

/// Resolves only exact canonical ids and legacy aliases, without the
/// heuristic or fallback steps. `None` means the key is not a known
/// question reference for this stage.
pub fn resolve_known(raw_id: &str, stage: CanonicalStage) -> Option<&'static str> {
    let raw = raw_id.trim();

    if let Some(q) = questions_for(stage)
        .iter()
        .find(|q| q.id.eq_ignore_ascii_case(raw))
    {
        return Some(q.id);
    }

    let raw_lower = raw.to_lowercase();
    LEGACY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == raw_lower)
        .map(|(_, targets)| targets[alias_index(stage)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_stage_has_ordered_unique_questions() {
        for &stage in CanonicalStage::ALL {
            let questions = questions_for(stage);
            assert!(!questions.is_empty());

            let mut orders: Vec<u32> = questions.iter().map(|q| q.order).collect();
            orders.sort_unstable();
            orders.dedup();
            assert_eq!(orders.len(), questions.len(), "duplicate order in {}", stage);

            let mut ids: Vec<&str> = questions.iter().map(|q| q.id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), questions.len(), "duplicate id in {}", stage);
        }
    }

    #[test]
    fn test_ids_are_unique_across_stages() {
        let mut all_ids: Vec<&str> = CanonicalStage::ALL
            .iter()
            .flat_map(|&s| questions_for(s).iter().map(|q| q.id))
            .collect();
        let before = all_ids.len();
        all_ids.sort_unstable();
        all_ids.dedup();
        assert_eq!(all_ids.len(), before);
    }

    #[test]
    fn test_exact_id_match() {
        assert_eq!(
            normalize_question_id("mvp_traction", CanonicalStage::MvpStage, None),
            "mvp_traction"
        );
        assert_eq!(
            normalize_question_id("  IDEA_PROBLEM ", CanonicalStage::IdeaStage, None),
            "idea_problem"
        );
    }

    #[test]
    fn test_legacy_alias_is_stage_qualified() {
        assert_eq!(
            normalize_question_id("problem", CanonicalStage::IdeaStage, None),
            "idea_problem"
        );
        assert_eq!(
            normalize_question_id("problem", CanonicalStage::MvpStage, None),
            "mvp_problem"
        );
        assert_eq!(
            normalize_question_id("problem", CanonicalStage::EarlyRevenue, None),
            "rev_problem"
        );
    }

    #[test]
    fn test_team_alias() {
        assert_eq!(
            normalize_question_id("team", CanonicalStage::MvpStage, None),
            "mvp_team"
        );
        assert_eq!(
            normalize_question_id("founders", CanonicalStage::IdeaStage, None),
            "idea_execution"
        );
    }

    #[test]
    fn test_label_heuristic() {
        assert_eq!(
            normalize_question_id(
                "q7",
                CanonicalStage::MvpStage,
                Some("Tell us about the team behind the product")
            ),
            "mvp_team"
        );
        assert_eq!(
            normalize_question_id(
                "custom_3",
                CanonicalStage::EarlyRevenue,
                Some("How do you make money?")
            ),
            "rev_business_model"
        );
    }

    #[test]
    fn test_fallback_to_first_question() {
        assert_eq!(
            normalize_question_id("unknown_key", CanonicalStage::IdeaStage, None),
            "idea_problem"
        );
        assert_eq!(
            normalize_question_id("unknown_key", CanonicalStage::EarlyRevenue, Some("???")),
            "rev_problem"
        );
    }

    #[test]
    fn test_resolve_known_rejects_unknown_keys() {
        assert_eq!(
            resolve_known("problem", CanonicalStage::IdeaStage),
            Some("idea_problem")
        );
        assert_eq!(resolve_known("email", CanonicalStage::IdeaStage), None);
        assert_eq!(resolve_known("startup_stage", CanonicalStage::IdeaStage), None);
    }

    #[test]
    fn test_question_by_id() {
        let q = question_by_id(CanonicalStage::MvpStage, "mvp_product").unwrap();
        assert_eq!(q.order, 2);
        assert!(question_by_id(CanonicalStage::IdeaStage, "mvp_product").is_none());
    }

    #[test]
    fn test_prompts_reference_their_stage() {
        for q in questions_for(CanonicalStage::MvpStage) {
            assert!(q.prompt.contains("MVP stage"), "{}", q.id);
        }
        for q in questions_for(CanonicalStage::EarlyRevenue) {
            assert!(q.prompt.contains("early-revenue"), "{}", q.id);
        }
    }

    #[test]
    fn test_grading_format_mentions_grammar_anchors() {
        assert!(GRADING_FORMAT.contains("SCORE:"));
        assert!(GRADING_FORMAT.contains("Strengths:"));
        assert!(GRADING_FORMAT.contains("Areas for Improvement:"));
    }
}
