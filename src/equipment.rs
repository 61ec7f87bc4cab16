//! Required-equipment completeness check.
//!
//! An inspected area is considered safe only when every item of
//! [`REQUIRED_EQUIPMENT`] was detected in the image. The number of missing
//! items is summarised as a saturating [`RiskLevel`]: two or three missing
//! items both map to [`RiskLevel::High`].

use std::collections::BTreeSet;

use serde::Serialize;

/// Equipment classes that must all be present for an area to be safe.
pub const REQUIRED_EQUIPMENT: [&str; 3] = ["FireExtinguisher", "ToolBox", "OxygenTank"];

/// Saturating summary of how many required items are missing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Safe,
    Moderate,
    High,
}

impl RiskLevel {
    pub fn from_missing_count(missing: usize) -> Self {
        match missing {
            0 => RiskLevel::Safe,
            1 => RiskLevel::Moderate,
            _ => RiskLevel::High,
        }
    }

    /// Numeric level in `0..=2`.
    pub fn level(self) -> u8 {
        match self {
            RiskLevel::Safe => 0,
            RiskLevel::Moderate => 1,
            RiskLevel::High => 2,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            RiskLevel::Safe => "Area is Safe",
            RiskLevel::Moderate => "Moderate Risk: 1 item missing",
            RiskLevel::High => "High Risk: Multiple items missing!",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            RiskLevel::Safe => "\u{2705}",
            RiskLevel::Moderate => "\u{26a0}\u{fe0f}",
            RiskLevel::High => "\u{1f534}",
        }
    }

    pub fn severity(self) -> Severity {
        match self {
            RiskLevel::Safe => Severity::Success,
            RiskLevel::Moderate => Severity::Warning,
            RiskLevel::High => Severity::Error,
        }
    }
}

/// Display style of a risk banner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn css_class(self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

/// Outcome of checking one image's detections against the required set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CompletenessResult {
    /// Distinct labels seen in the image, required or not.
    pub detected: BTreeSet<String>,
    /// Required labels that were not seen.
    pub missing: BTreeSet<String>,
    pub risk: RiskLevel,
}

impl CompletenessResult {
    pub fn risk_level(&self) -> u8 {
        self.risk.level()
    }

    pub fn risk_label(&self) -> &'static str {
        self.risk.label()
    }

    pub fn is_detected(&self, label: &str) -> bool {
        self.detected.contains(label)
    }

    /// Required items in declaration order, paired with their presence.
    pub fn checklist(&self) -> impl Iterator<Item = (&'static str, bool)> + '_ {
        REQUIRED_EQUIPMENT
            .iter()
            .map(move |label| (*label, self.is_detected(label)))
    }

    /// Sentence read out by the voice summary.
    pub fn spoken_summary(&self) -> String {
        let mut summary = format!("Detected: {}.", join(&self.detected));
        if !self.missing.is_empty() {
            summary.push_str(&format!(" Missing: {}", join(&self.missing)));
        }
        summary
    }
}

/// Check a detection set against [`REQUIRED_EQUIPMENT`].
///
/// Confidence values and duplicate labels never influence the result; only
/// the set of distinct labels does. Empty input is valid and yields every
/// required item as missing.
pub fn evaluate<I, S>(detections: I) -> CompletenessResult
where
    I: IntoIterator<Item = (S, f32)>,
    S: AsRef<str>,
{
    let detected: BTreeSet<String> = detections
        .into_iter()
        .map(|(label, _confidence)| label.as_ref().to_string())
        .collect();
    let missing: BTreeSet<String> = REQUIRED_EQUIPMENT
        .iter()
        .filter(|label| !detected.contains(**label))
        .map(|label| label.to_string())
        .collect();
    let risk = RiskLevel::from_missing_count(missing.len());
    CompletenessResult {
        detected,
        missing,
        risk,
    }
}

fn join(labels: &BTreeSet<String>) -> String {
    labels
        .iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(labels: &[&str]) -> BTreeSet<String> {
        labels.iter().map(|l| l.to_string()).collect()
    }

    #[test]
    fn empty_detections_are_high_risk() {
        let result = evaluate(Vec::<(&str, f32)>::new());
        assert!(result.detected.is_empty());
        assert_eq!(
            result.missing,
            set(&["FireExtinguisher", "ToolBox", "OxygenTank"])
        );
        assert_eq!(result.risk_level(), 2);
        assert_eq!(result.risk_label(), "High Risk: Multiple items missing!");
    }

    #[test]
    fn all_required_present_is_safe() {
        let result = evaluate([
            ("FireExtinguisher", 0.9),
            ("ToolBox", 0.8),
            ("OxygenTank", 0.7),
        ]);
        assert!(result.missing.is_empty());
        assert_eq!(result.risk, RiskLevel::Safe);
        assert_eq!(result.risk_level(), 0);
        assert_eq!(result.risk_label(), "Area is Safe");
        assert_eq!(result.risk.severity(), Severity::Success);
    }

    #[test]
    fn one_missing_is_moderate() {
        let result = evaluate([("FireExtinguisher", 0.9), ("ToolBox", 0.8)]);
        assert_eq!(result.missing, set(&["OxygenTank"]));
        assert_eq!(result.risk_level(), 1);
        assert_eq!(result.risk_label(), "Moderate Risk: 1 item missing");
        assert_eq!(result.risk.severity().css_class(), "warning");
    }

    #[test]
    fn two_missing_saturates_to_high() {
        let result = evaluate([("FireExtinguisher", 0.9)]);
        assert_eq!(result.missing, set(&["ToolBox", "OxygenTank"]));
        assert_eq!(result.risk_level(), 2);
        assert_eq!(
            result.risk,
            evaluate(Vec::<(&str, f32)>::new()).risk,
            "two and three missing items share a level"
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let input = vec![("ToolBox", 0.4), ("Helmet", 0.3)];
        assert_eq!(evaluate(input.clone()), evaluate(input));
    }

    #[test]
    fn duplicates_and_confidence_do_not_matter() {
        let twice = evaluate([("ToolBox", 0.5), ("ToolBox", 0.6)]);
        let once = evaluate([("ToolBox", 0.5)]);
        assert_eq!(twice.detected, once.detected);
        assert_eq!(twice.risk, once.risk);

        let low = evaluate([("ToolBox", 0.01)]);
        assert_eq!(low, once);
    }

    #[test]
    fn risk_level_is_min_of_two_and_missing_for_every_subset() {
        for mask in 0u8..8 {
            let present: Vec<(&str, f32)> = REQUIRED_EQUIPMENT
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, label)| (*label, 0.5))
                .collect();
            let result = evaluate(present);
            assert!(result.missing.len() <= 3);
            assert_eq!(
                result.risk_level() as usize,
                result.missing.len().min(2),
                "mask {mask:03b}"
            );
        }
    }

    #[test]
    fn unrequired_labels_are_reported_but_do_not_reduce_risk() {
        let result = evaluate([("Helmet", 0.9)]);
        assert!(result.is_detected("Helmet"));
        assert_eq!(result.missing.len(), 3);
        assert_eq!(result.risk, RiskLevel::High);
    }

    #[test]
    fn labels_are_case_sensitive() {
        let result = evaluate([("toolbox", 0.9)]);
        assert!(result.missing.contains("ToolBox"));
    }

    #[test]
    fn checklist_follows_required_order() {
        let result = evaluate([("OxygenTank", 0.9)]);
        let checklist: Vec<_> = result.checklist().collect();
        assert_eq!(
            checklist,
            vec![
                ("FireExtinguisher", false),
                ("ToolBox", false),
                ("OxygenTank", true)
            ]
        );
    }

    #[test]
    fn spoken_summary_lists_detected_and_missing() {
        let result = evaluate([("ToolBox", 0.9), ("FireExtinguisher", 0.8)]);
        assert_eq!(
            result.spoken_summary(),
            "Detected: FireExtinguisher, ToolBox. Missing: OxygenTank"
        );

        let safe = evaluate(REQUIRED_EQUIPMENT.iter().map(|l| (*l, 1.0)));
        assert_eq!(
            safe.spoken_summary(),
            "Detected: FireExtinguisher, OxygenTank, ToolBox."
        );

        let nothing = evaluate(Vec::<(&str, f32)>::new());
        assert_eq!(
            nothing.spoken_summary(),
            "Detected: . Missing: FireExtinguisher, OxygenTank, ToolBox"
        );
    }
}
