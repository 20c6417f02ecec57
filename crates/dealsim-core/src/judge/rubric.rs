//! The fixed eight-behavior rubric.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::RatingError;

/// Highest severity a rating may carry.
pub const MAX_RATING: u8 = 4;

/// Baseline score before deductions.
pub const FULL_SCORE: f64 = 100.0;

/// One of the eight negative salesperson behaviors the judge rates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Criterion {
    RepeatedQuestions,
    GenericOrOffTopic,
    IgnoringConstraints,
    BeingTooPushy,
    JargonOrAcronyms,
    OverlyVerbose,
    IgnoringUrgencyOrEmotion,
    BadRecommendation,
}

impl Criterion {
    /// Canonical rubric order.
    pub const ALL: [Criterion; 8] = [
        Self::RepeatedQuestions,
        Self::GenericOrOffTopic,
        Self::IgnoringConstraints,
        Self::BeingTooPushy,
        Self::JargonOrAcronyms,
        Self::OverlyVerbose,
        Self::IgnoringUrgencyOrEmotion,
        Self::BadRecommendation,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::RepeatedQuestions => "Repeated questions",
            Self::GenericOrOffTopic => "Generic or off-topic responses",
            Self::IgnoringConstraints => "Ignoring budget or constraints",
            Self::BeingTooPushy => "Being too pushy",
            Self::JargonOrAcronyms => "Using jargon or acronyms",
            Self::OverlyVerbose => "Overly verbose or rambling responses",
            Self::IgnoringUrgencyOrEmotion => "Failing to acknowledge urgency or emotion",
            Self::BadRecommendation => "Bad or irrelevant recommendation",
        }
    }

    /// Shorter spellings judges are known to return.
    fn aliases(self) -> &'static [&'static str] {
        match self {
            Self::RepeatedQuestions => &[],
            Self::GenericOrOffTopic => &["Generic/off-topic responses"],
            Self::IgnoringConstraints => &[],
            Self::BeingTooPushy => &[],
            Self::JargonOrAcronyms => &["Using jargon/acronyms"],
            Self::OverlyVerbose => &["Overly verbose/rambling", "Overly verbose or rambling"],
            Self::IgnoringUrgencyOrEmotion => &["Failing to acknowledge urgency/emotion"],
            Self::BadRecommendation => &["Bad/irrelevant recommendation"],
        }
    }

    /// Maximum points this criterion can deduct.
    pub const fn max_deduction(self) -> u32 {
        match self {
            Self::RepeatedQuestions => 10,
            Self::GenericOrOffTopic => 15,
            Self::IgnoringConstraints => 15,
            Self::BeingTooPushy => 10,
            Self::JargonOrAcronyms => 10,
            Self::OverlyVerbose => 10,
            Self::IgnoringUrgencyOrEmotion => 15,
            Self::BadRecommendation => 15,
        }
    }

    /// Canned guidance surfaced to the prompt mutator when this criterion ranks worst.
    pub fn remediation(self) -> &'static str {
        match self {
            Self::RepeatedQuestions => {
                "Track what the customer has already said and never ask for it again; \
                 move the conversation forward with new information."
            }
            Self::GenericOrOffTopic => {
                "Answer every direct question specifically before anything else; \
                 avoid filler praise and vague statements."
            }
            Self::IgnoringConstraints => {
                "Restate the customer's budget and must-haves and keep every suggestion inside them."
            }
            Self::BeingTooPushy => {
                "Only offer an appointment after the customer's questions are answered; \
                 never answer a question with a scheduling ask."
            }
            Self::JargonOrAcronyms => {
                "Use plain language and spell out any industry term or acronym the first time."
            }
            Self::OverlyVerbose => {
                "Keep replies to a few short sentences with one clear next step."
            }
            Self::IgnoringUrgencyOrEmotion => {
                "Acknowledge deadlines, stress or excitement explicitly and adapt pace to them."
            }
            Self::BadRecommendation => {
                "Recommend only vehicles that match the stated needs, budget and preferences, \
                 and say why each one fits."
            }
        }
    }

    /// Resolve a judge-supplied criterion label.
    pub fn parse(label: &str) -> Result<Self, RatingError> {
        let label = label.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|c| {
                c.name().eq_ignore_ascii_case(label)
                    || c.aliases().iter().any(|a| a.eq_ignore_ascii_case(label))
            })
            .ok_or_else(|| RatingError::UnknownCriterion(label.to_string()))
    }
}

const _: () = {
    let mut total = 0;
    let mut i = 0;
    while i < Criterion::ALL.len() {
        total += Criterion::ALL[i].max_deduction();
        i += 1;
    }
    assert!(total == 100, "rubric weights must sum to 100");
};

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Criterion {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Criterion {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = String::deserialize(deserializer)?;
        Self::parse(&label).map_err(serde::de::Error::custom)
    }
}

/// System prompt for the rating stage.
pub fn rubric_prompt() -> String {
    let mut out = String::from(
        "You are an impartial judge of a car-sales conversation. Evaluate only the \
         salesperson, whose lines are prefixed AGENT; CUSTOMER lines are the buyer.\n\n\
         Read the whole transcript. A direct customer question must be answered directly; \
         dodging it, changing the subject, staying vague or steering to an appointment \
         instead counts against the salesperson.\n\n\
         Rate each of the following negative behaviors on an integer scale:\n\
         0 = not observed\n1 = minor, rare\n2 = moderate, noticeable\n\
         3 = significant, a pattern\n4 = severe, persistent or derailing\n\n",
    );

    for (i, criterion) in Criterion::ALL.iter().enumerate() {
        out.push_str(&format!(
            "{}. \"{}\": {}\n",
            i + 1,
            criterion.name(),
            criterion_guidance(*criterion)
        ));
    }

    out.push_str(
        "\nRespond with JSON only, in exactly this shape:\n\
         {\"employee\": {\"justification\": string, \"behaviorRatings\": [\
         {\"criterion\": string, \"rating\": integer, \"explanation\": string}]}, \
         \"comments\": string}\n\n\
         Include all eight behaviors once each, using the exact names above. \
         Ratings are integers 0 to 4. The justification summarizes the salesperson's \
         overall performance; each explanation cites the lines behind its rating. \
         Use \"\" for comments when you have none.",
    );
    out
}

fn criterion_guidance(criterion: Criterion) -> &'static str {
    match criterion {
        Criterion::RepeatedQuestions => {
            "asks for information already given, or repeats the same line. Repeating the \
             same message several times in a row is severe (3-4); quote the repeated line."
        }
        Criterion::GenericOrOffTopic => {
            "vague, generic or unrelated replies. Unanswered specific questions, empty \
             praise instead of details, or answering only one of several questions rate 3-4."
        }
        Criterion::IgnoringConstraints => "disregards the stated budget, required features or other constraints.",
        Criterion::BeingTooPushy => {
            "pressures the customer or puts appointments ahead of requested information, \
             especially while questions remain open."
        }
        Criterion::JargonOrAcronyms => "unexplained technical terms or acronyms.",
        Criterion::OverlyVerbose => "long-winded, repetitive or unstructured replies.",
        Criterion::IgnoringUrgencyOrEmotion => "misses urgency, worry or other emotional cues.",
        Criterion::BadRecommendation => {
            "suggests vehicles or options that do not fit the customer's needs, budget or preferences."
        }
    }
}
