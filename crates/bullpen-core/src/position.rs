// Fantasy position codes and free-text position parsing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Fantasy roster positions that eligibility can grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FantasyPosition {
    Catcher,
    FirstBase,
    SecondBase,
    ThirdBase,
    ShortStop,
    LeftField,
    CenterField,
    RightField,
    Outfield,
    DesignatedHitter,
    CornerInfield,
    MiddleInfield,
    Infield,
    Utility,
    StartingPitcher,
    ReliefPitcher,
    Pitcher,
}

/// Real on-field positions whose appearance counts are checked against the
/// games thresholds. Evaluation order is the order of this list.
pub const STANDARD_POSITIONS: [FantasyPosition; 10] = [
    FantasyPosition::Catcher,
    FantasyPosition::FirstBase,
    FantasyPosition::SecondBase,
    FantasyPosition::ThirdBase,
    FantasyPosition::ShortStop,
    FantasyPosition::LeftField,
    FantasyPosition::CenterField,
    FantasyPosition::RightField,
    FantasyPosition::Outfield,
    FantasyPosition::DesignatedHitter,
];

impl FantasyPosition {
    /// Parse a position code. Accepts the fantasy codes plus `UT` as an
    /// alias for `UTIL`.
    pub fn from_code(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "C" => Some(FantasyPosition::Catcher),
            "1B" => Some(FantasyPosition::FirstBase),
            "2B" => Some(FantasyPosition::SecondBase),
            "3B" => Some(FantasyPosition::ThirdBase),
            "SS" => Some(FantasyPosition::ShortStop),
            "LF" => Some(FantasyPosition::LeftField),
            "CF" => Some(FantasyPosition::CenterField),
            "RF" => Some(FantasyPosition::RightField),
            "OF" => Some(FantasyPosition::Outfield),
            "DH" => Some(FantasyPosition::DesignatedHitter),
            "CI" => Some(FantasyPosition::CornerInfield),
            "MI" => Some(FantasyPosition::MiddleInfield),
            "IF" => Some(FantasyPosition::Infield),
            "UTIL" | "UT" => Some(FantasyPosition::Utility),
            "SP" => Some(FantasyPosition::StartingPitcher),
            "RP" => Some(FantasyPosition::ReliefPitcher),
            "P" => Some(FantasyPosition::Pitcher),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FantasyPosition::Catcher => "C",
            FantasyPosition::FirstBase => "1B",
            FantasyPosition::SecondBase => "2B",
            FantasyPosition::ThirdBase => "3B",
            FantasyPosition::ShortStop => "SS",
            FantasyPosition::LeftField => "LF",
            FantasyPosition::CenterField => "CF",
            FantasyPosition::RightField => "RF",
            FantasyPosition::Outfield => "OF",
            FantasyPosition::DesignatedHitter => "DH",
            FantasyPosition::CornerInfield => "CI",
            FantasyPosition::MiddleInfield => "MI",
            FantasyPosition::Infield => "IF",
            FantasyPosition::Utility => "UTIL",
            FantasyPosition::StartingPitcher => "SP",
            FantasyPosition::ReliefPitcher => "RP",
            FantasyPosition::Pitcher => "P",
        }
    }
}

impl fmt::Display for FantasyPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Parse a box-score position annotation into distinct upper-cased codes.
///
/// `"RF (LF)"` yields `["RF", "LF"]` and `"RF (LF, CF)"` yields
/// `["RF", "LF", "CF"]`: the text before the first `(` is the primary code
/// and every comma-separated token in any parenthetical group is an
/// alternate. Text without parentheses is a single code. Codes keep
/// first-occurrence order; blank tokens are dropped. Nothing here fails: an
/// unclosed group still contributes its tokens.
pub fn parse_position_text(text: &str) -> Vec<String> {
    let mut codes: Vec<String> = Vec::new();
    let mut push = |token: &str| {
        let code = token.trim().to_uppercase();
        if !code.is_empty() && !codes.contains(&code) {
            codes.push(code);
        }
    };

    let Some(open) = text.find('(') else {
        push(text);
        return codes;
    };

    push(&text[..open]);

    let mut rest = &text[open..];
    while let Some(start) = rest.find('(') {
        let inner = &rest[start + 1..];
        let (group, remainder) = match inner.find(')') {
            Some(end) => (&inner[..end], &inner[end + 1..]),
            None => (inner, ""),
        };
        for token in group.split(',') {
            push(token);
        }
        rest = remainder;
    }

    codes
}

/// Map a long-form roster-page position name ("First-Base Man") to its
/// short code. Unrecognised text is returned trimmed but otherwise as-is.
pub fn normalize_profile_position(text: &str) -> String {
    let trimmed = text.trim();
    let code = match trimmed {
        "First-Base Man" => "1B",
        "Second-Base Man" => "2B",
        "Third-Base Man" => "3B",
        "Shortstop" => "SS",
        "Center-Fielder" => "CF",
        "Right-Fielder" => "RF",
        "Left-Fielder" => "LF",
        "Pitcher" => "P",
        "Catcher" => "C",
        other => other,
    };
    code.to_string()
}
