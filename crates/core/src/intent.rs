use serde::{Deserialize, Serialize};

use crate::rules::contains_any;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignIntent {
    ReEngagement,
    Retention,
    Acquisition,
    Seasonal,
    Promotional,
    General,
}

impl CampaignIntent {
    pub fn label(self) -> &'static str {
        match self {
            Self::ReEngagement => "Re-engagement",
            Self::Retention => "Retention",
            Self::Acquisition => "Acquisition",
            Self::Seasonal => "Seasonal",
            Self::Promotional => "Promotional",
            Self::General => "General Marketing",
        }
    }
}

const RE_ENGAGEMENT: &[&str] = &[
    "re-engage",
    "inactive",
    "haven't purchased",
    "lapsed",
    "winback",
    "churn",
    "dormant",
    "bring back",
];

const RETENTION: &[&str] = &["retention", "loyalty", "keep", "maintain", "vip", "loyal"];

const ACQUISITION: &[&str] = &[
    "new customer",
    "acquire",
    "attract",
    "prospect",
    "acquisition",
];

const SEASONAL: &[&str] = &[
    "holiday",
    "seasonal",
    "christmas",
    "black friday",
    "season",
    "event",
];

const PROMOTIONAL: &[&str] = &[
    "sale",
    "discount",
    "offer",
    "promotion",
    "deal",
    "special",
    "flash",
];

/// Independent keyword tests over a prompt. Several may hold at once; each
/// narrative section reads them in its own order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentSignals {
    pub re_engagement: bool,
    pub retention: bool,
    pub acquisition: bool,
    pub seasonal: bool,
    pub promotional: bool,
}

impl IntentSignals {
    pub fn detect(text: &str) -> Self {
        let lower = text.to_lowercase();
        Self {
            re_engagement: contains_any(&lower, RE_ENGAGEMENT),
            retention: contains_any(&lower, RETENTION),
            acquisition: contains_any(&lower, ACQUISITION),
            seasonal: contains_any(&lower, SEASONAL),
            promotional: contains_any(&lower, PROMOTIONAL),
        }
    }

    /// Headline intent, in reporting priority.
    pub fn primary(self) -> CampaignIntent {
        [
            (self.re_engagement, CampaignIntent::ReEngagement),
            (self.retention, CampaignIntent::Retention),
            (self.acquisition, CampaignIntent::Acquisition),
            (self.seasonal, CampaignIntent::Seasonal),
            (self.promotional, CampaignIntent::Promotional),
        ]
        .into_iter()
        .find(|(hit, _)| *hit)
        .map(|(_, intent)| intent)
        .unwrap_or(CampaignIntent::General)
    }
}

pub fn classify_campaign_intent(text: &str) -> CampaignIntent {
    IntentSignals::detect(text).primary()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_engagement_outranks_promotion() {
        assert_eq!(
            classify_campaign_intent("Flash sale to bring back lapsed shoppers"),
            CampaignIntent::ReEngagement
        );
    }

    #[test]
    fn retention_outranks_seasonal() {
        assert_eq!(
            classify_campaign_intent("Holiday thanks for loyal VIPs"),
            CampaignIntent::Retention
        );
    }

    #[test]
    fn promotional_detected() {
        assert_eq!(
            classify_campaign_intent("Flash sale 20% off"),
            CampaignIntent::Promotional
        );
    }

    #[test]
    fn signals_hold_independently() {
        let signals = IntentSignals::detect("VIP flash sale 20% off by email");
        assert!(signals.retention);
        assert!(signals.promotional);
        assert!(!signals.re_engagement);
        assert_eq!(signals.primary(), CampaignIntent::Retention);
    }

    #[test]
    fn falls_back_to_general() {
        assert_eq!(
            classify_campaign_intent("monthly newsletter"),
            CampaignIntent::General
        );
    }
}
