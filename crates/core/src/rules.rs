//! Deterministic keyword/regex classification of a campaign prompt.
//!
//! Campaign naming is an ordered rule table evaluated top to bottom; the
//! first rule whose predicate holds decides the name class. Every other
//! attribute is an independent presence test.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::models::{Channel, DataSource, Experiment, OfferDetail, SuccessCriteria};

static DISCOUNT_CODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)discount code\s*:?\s*([a-z0-9]+)").expect("valid discount code regex")
});
static DISCOUNT_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{1,2})%").expect("valid discount percent regex"));
static ANY_PERCENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)%").expect("valid percent regex"));
static CONVERSION_TARGET: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"conversion rate\s*>=?\s*(\d+)%").expect("valid conversion target regex")
});
static CLICK_TARGET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"click rate\s*>=?\s*(\d+)%").expect("valid click target regex"));
static US_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bus\b").expect("valid us regex"));
static MX_TOKEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\bmx\b").expect("valid mx regex"));

pub const DEFAULT_OFFER_CODE: &str = "REWARD10";
pub const DEFAULT_OFFER_VALUE: &str = "10%";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameClass {
    AnniversaryThankYou,
    Winback,
    ProductLaunch,
    LoyaltyReward,
    CartReminder,
    FlashSale,
    VipEarlyAccess,
    ReEngagement,
    Custom,
}

impl NameClass {
    fn prefix(self) -> &'static str {
        match self {
            Self::AnniversaryThankYou => "Anniversary Thank You",
            Self::Winback => "Winback",
            Self::ProductLaunch => "Product Launch",
            Self::LoyaltyReward => "Loyalty Reward",
            Self::CartReminder => "Cart Reminder",
            Self::FlashSale => "Flash Sale",
            Self::VipEarlyAccess => "VIP Early Access",
            Self::ReEngagement => "Re-engagement",
            Self::Custom => "Custom Campaign",
        }
    }

    fn default_channel_label(self) -> &'static str {
        match self {
            Self::VipEarlyAccess => "Email Only",
            _ => "Multi-Channel",
        }
    }

    /// Classes whose campaigns carry an incentive by default.
    pub fn bears_offer(self) -> bool {
        matches!(
            self,
            Self::LoyaltyReward | Self::CartReminder | Self::FlashSale | Self::ReEngagement
        )
    }
}

pub struct NameRule {
    pub class: NameClass,
    pub matches: fn(&str) -> bool,
}

/// Priority-ordered name rules. The input is already lowercased.
pub const NAME_RULES: &[NameRule] = &[
    NameRule {
        class: NameClass::AnniversaryThankYou,
        matches: is_anniversary,
    },
    NameRule {
        class: NameClass::Winback,
        matches: is_winback,
    },
    NameRule {
        class: NameClass::ProductLaunch,
        matches: is_product_launch,
    },
    NameRule {
        class: NameClass::LoyaltyReward,
        matches: is_loyalty,
    },
    NameRule {
        class: NameClass::CartReminder,
        matches: is_cart_reminder,
    },
    NameRule {
        class: NameClass::FlashSale,
        matches: is_flash_sale,
    },
    NameRule {
        class: NameClass::VipEarlyAccess,
        matches: is_vip_early_access,
    },
    NameRule {
        class: NameClass::ReEngagement,
        matches: is_re_engagement,
    },
];

fn is_anniversary(text: &str) -> bool {
    contains_any(text, &["anniversary", "thank you"])
}

fn is_winback(text: &str) -> bool {
    contains_any(text, &["winback", "win back"])
}

fn is_product_launch(text: &str) -> bool {
    contains_any(text, &["product launch", "new product"])
}

fn is_loyalty(text: &str) -> bool {
    contains_any(text, &["loyalty", "vip offer"]) || is_vip_non_exclusive(text)
}

fn is_cart_reminder(text: &str) -> bool {
    contains_any(text, &["cart", "retarget", "abandon"])
}

fn is_flash_sale(text: &str) -> bool {
    contains_any(text, &["flash sale", "discount"])
}

fn is_vip_early_access(text: &str) -> bool {
    text.contains("exclusive access") || (text.contains("vip") && text.contains("exclusive"))
}

fn is_re_engagement(text: &str) -> bool {
    contains_any(text, &["re-engage", "reengage", "re-engagement"])
}

fn is_vip_non_exclusive(text: &str) -> bool {
    text.contains("vip") && !text.contains("exclusive access")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignName {
    pub class: NameClass,
    /// Digits of the first `NN%` figure, shown on flash sale names.
    pub discount_digits: Option<String>,
    /// Trimmed prompt, used verbatim by the custom class.
    pub prompt: String,
}

impl CampaignName {
    pub fn render(&self, channel_label: Option<&str>) -> String {
        let label = channel_label.unwrap_or(self.class.default_channel_label());

        match self.class {
            NameClass::Custom => capitalize_first(&self.prompt)
                .unwrap_or_else(|| NameClass::Custom.prefix().to_string()),
            NameClass::FlashSale => match &self.discount_digits {
                Some(digits) => format!("{}: {label} ({digits}% OFF)", self.class.prefix()),
                None => format!("{}: {label}", self.class.prefix()),
            },
            class => format!("{}: {label}", class.prefix()),
        }
    }
}

/// Everything the rule engine derives from the prompt alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSet {
    pub name: CampaignName,
    pub offer: Option<OfferDetail>,
    pub data_sources: Vec<DataSource>,
    pub channels: Vec<Channel>,
    pub success_criteria: SuccessCriteria,
    pub per_channel: BTreeMap<Channel, u32>,
    pub experiment: Option<Experiment>,
    pub localization: Option<Vec<String>>,
}

pub fn classify(text: &str) -> AttributeSet {
    let lower = text.to_lowercase();
    let name = classify_name(text, &lower);

    AttributeSet {
        offer: extract_offer(&lower, name.class),
        data_sources: detect_data_sources(&lower, name.class),
        channels: detect_channels(&lower),
        success_criteria: detect_success_criteria(&lower),
        per_channel: detect_frequency(&lower),
        experiment: detect_experiment(&lower),
        localization: detect_localization(&lower),
        name,
    }
}

/// All name classes whose rule fires, highest priority first.
pub fn matching_name_classes(text: &str) -> Vec<NameClass> {
    let lower = text.to_lowercase();
    NAME_RULES
        .iter()
        .filter(|rule| (rule.matches)(&lower))
        .map(|rule| rule.class)
        .collect()
}

fn classify_name(original: &str, lower: &str) -> CampaignName {
    let class = NAME_RULES
        .iter()
        .find(|rule| (rule.matches)(lower))
        .map(|rule| rule.class)
        .unwrap_or(NameClass::Custom);

    CampaignName {
        class,
        discount_digits: first_discount_digits(lower),
        prompt: original.trim().to_string(),
    }
}

pub fn extract_offer(lower: &str, class: NameClass) -> Option<OfferDetail> {
    // Exclusive access campaigns are never discounted.
    if lower.contains("exclusive access") {
        return None;
    }

    let code = DISCOUNT_CODE
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_uppercase());
    let value = first_discount_digits(lower).map(|digits| format!("{digits}%"));

    match (code, value) {
        (Some(code), Some(value)) => Some(OfferDetail { code, value }),
        (Some(code), None) => Some(OfferDetail {
            code,
            value: DEFAULT_OFFER_VALUE.to_string(),
        }),
        (None, Some(value)) => Some(OfferDetail {
            code: format!("OFFER{}", value.trim_end_matches('%')),
            value,
        }),
        (None, None) if is_offer_bearing(lower, class) => Some(OfferDetail {
            code: DEFAULT_OFFER_CODE.to_string(),
            value: DEFAULT_OFFER_VALUE.to_string(),
        }),
        (None, None) => None,
    }
}

fn is_offer_bearing(lower: &str, class: NameClass) -> bool {
    class.bears_offer()
        || contains_any(lower, &["discount", "reminder", "loyalty"])
        || is_vip_non_exclusive(lower)
}

fn first_discount_digits(lower: &str) -> Option<String> {
    DISCOUNT_PERCENT
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn detect_data_sources(lower: &str, class: NameClass) -> Vec<DataSource> {
    let mut sources = Vec::new();

    if contains_any(lower, &["shopify", "vip", "repeat customers"]) {
        sources.push(DataSource::Shopify);
    }
    if lower.contains("facebook") {
        sources.push(DataSource::FacebookPage);
    }
    if lower.contains("google") {
        sources.push(DataSource::GoogleAdsTag);
    }

    if class == NameClass::CartReminder && lower.contains("retarget") {
        for source in [DataSource::FacebookPage, DataSource::GoogleAdsTag] {
            if !sources.contains(&source) {
                sources.push(source);
            }
        }
    }

    sources
}

pub fn detect_channels(lower: &str) -> Vec<Channel> {
    [
        ("email", Channel::Email),
        ("sms", Channel::Sms),
        ("whatsapp", Channel::WhatsApp),
        ("ads", Channel::Ads),
    ]
    .into_iter()
    .filter(|(keyword, _)| lower.contains(keyword))
    .map(|(_, channel)| channel)
    .collect()
}

pub fn detect_success_criteria(lower: &str) -> SuccessCriteria {
    let mut criteria = SuccessCriteria::default();

    if lower.contains("loyalty") {
        let figures = ANY_PERCENT
            .captures_iter(lower)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str())
            .collect::<Vec<_>>();

        // Only the first two figures are significant.
        if let [conversion, click, ..] = figures.as_slice() {
            if let (Some(conversion), Some(click)) = (rate_target(conversion), rate_target(click))
            {
                criteria.conversion_rate_target = conversion;
                criteria.click_rate_target = click;
                return criteria;
            }
        }
    }

    if let Some(target) = capture_target(&CONVERSION_TARGET, lower) {
        criteria.conversion_rate_target = target;
    }
    if let Some(target) = capture_target(&CLICK_TARGET, lower) {
        criteria.click_rate_target = target;
    }

    criteria
}

fn capture_target(pattern: &Regex, lower: &str) -> Option<String> {
    pattern
        .captures(lower)
        .and_then(|caps| caps.get(1))
        .and_then(|m| rate_target(m.as_str()))
}

fn rate_target(percent_digits: &str) -> Option<String> {
    let percent = percent_digits.parse::<f64>().ok()?;
    Some(format!(">= {}", percent / 100.0))
}

pub fn detect_frequency(lower: &str) -> BTreeMap<Channel, u32> {
    let mut per_channel = BTreeMap::new();
    if lower.contains("email") {
        per_channel.insert(Channel::Email, 2);
    }
    if lower.contains("sms") {
        per_channel.insert(Channel::Sms, 1);
    }
    per_channel
}

pub fn detect_experiment(lower: &str) -> Option<Experiment> {
    contains_any(lower, &["a/b test", "experiment"]).then(Experiment::default)
}

pub fn detect_localization(lower: &str) -> Option<Vec<String>> {
    (US_TOKEN.is_match(lower) && MX_TOKEN.is_match(lower))
        .then(|| vec!["US".to_string(), "MX".to_string()])
}

fn capitalize_first(input: &str) -> Option<String> {
    let mut chars = input.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

pub(crate) fn contains_any(input: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| input.contains(needle))
}
