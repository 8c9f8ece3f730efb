//! WCAG compliance math over a violation list.

use super::{ImpactTier, Violation};

/// WCAG 2.1 success criteria counts: 50 at levels A+AA, 78 including AAA.
/// Fixed baselines keep the percentage comparable across scans.
pub const AA_CRITERIA_BASELINE: u32 = 50;
pub const AAA_CRITERIA_BASELINE: u32 = 78;

/// Conformance level a violation's tags place it at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Level {
    A,
    Aa,
    Aaa,
}

/// Per-impact-tier violation counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImpactBreakdown {
    pub critical: u32,
    pub serious: u32,
    pub moderate: u32,
    pub minor: u32,
}

pub fn impact_breakdown(violations: &[Violation]) -> ImpactBreakdown {
    let mut b = ImpactBreakdown::default();
    for v in violations {
        match v.impact {
            ImpactTier::Critical => b.critical += 1,
            ImpactTier::Serious => b.serious += 1,
            ImpactTier::Moderate => b.moderate += 1,
            ImpactTier::Minor => b.minor += 1,
        }
    }
    b
}

/// Parse the conformance level out of an engine rule tag such as
/// "wcag2a", "wcag2aa", "wcag21aa", or "wcag2aaa".
fn tag_level(tag: &str) -> Option<Level> {
    let tag = tag.to_ascii_lowercase();
    let rest = tag.strip_prefix("wcag")?;
    let suffix = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    match suffix {
        "a" => Some(Level::A),
        "aa" => Some(Level::Aa),
        "aaa" => Some(Level::Aaa),
        _ => None,
    }
}

/// A violation's level is the strictest-applicable bucket: the lowest level
/// among its WCAG tags. Untagged violations count as level A so they weigh
/// against both percentages.
fn violation_level(v: &Violation) -> Level {
    v.tags
        .iter()
        .filter_map(|t| tag_level(t))
        .min()
        .unwrap_or(Level::A)
}

/// Compliance = max(0, round((baseline - violations_at_level) / baseline * 100)),
/// computed independently for the AA and AAA baselines.
///
/// The AA percentage counts violations at levels A and AA; the AAA
/// percentage counts all of them.
pub fn compliance_percentages(violations: &[Violation]) -> (f64, f64) {
    let mut at_or_below_aa = 0u32;
    let mut total = 0u32;
    for v in violations {
        total += 1;
        if violation_level(v) <= Level::Aa {
            at_or_below_aa += 1;
        }
    }
    (
        compliance(AA_CRITERIA_BASELINE, at_or_below_aa),
        compliance(AAA_CRITERIA_BASELINE, total),
    )
}

fn compliance(baseline: u32, violations: u32) -> f64 {
    let pct = (f64::from(baseline) - f64::from(violations)) / f64::from(baseline) * 100.0;
    pct.round().max(0.0)
}
