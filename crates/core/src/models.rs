use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataSource {
    Shopify,
    #[serde(rename = "Facebook Page")]
    FacebookPage,
    #[serde(rename = "Google Ads Tag")]
    GoogleAdsTag,
}

impl DataSource {
    pub const ALL: [DataSource; 3] = [Self::Shopify, Self::FacebookPage, Self::GoogleAdsTag];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "shopify" => Some(Self::Shopify),
            "facebook" | "facebook page" | "facebook-page" => Some(Self::FacebookPage),
            "google" | "google ads" | "google ads tag" | "google-ads-tag" => {
                Some(Self::GoogleAdsTag)
            }
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Shopify => "Shopify",
            Self::FacebookPage => "Facebook Page",
            Self::GoogleAdsTag => "Google Ads Tag",
        }
    }

    /// Audience filter template bound to this source.
    pub fn audience_filter(self) -> &'static str {
        match self {
            Self::Shopify => "{{audience.lastPurchaseOverDays}}",
            Self::FacebookPage => "{{audience.clickedLast30d}}",
            Self::GoogleAdsTag => "{{audience.cartAbandoned}}",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Channel {
    Email,
    #[serde(rename = "SMS")]
    Sms,
    WhatsApp,
    Ads,
}

impl Channel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "email" | "e-mail" => Some(Self::Email),
            "sms" | "text" => Some(Self::Sms),
            "whatsapp" | "wa" => Some(Self::WhatsApp),
            "ads" | "ad" | "paid" => Some(Self::Ads),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Email => "Email",
            Self::Sms => "SMS",
            Self::WhatsApp => "WhatsApp",
            Self::Ads => "Ads",
        }
    }

    pub fn requires_opt_in(self) -> bool {
        matches!(self, Self::Sms | Self::WhatsApp)
    }
}

/// User-selected facets. Both lists behave as insertion-ordered sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetSelection {
    pub data_sources: Vec<DataSource>,
    pub channels: Vec<Channel>,
}

impl FacetSelection {
    pub fn new(data_sources: Vec<DataSource>, channels: Vec<Channel>) -> Self {
        Self {
            data_sources: dedupe(data_sources),
            channels: dedupe(channels),
        }
    }

    pub fn channel_label(&self) -> Option<String> {
        if self.channels.is_empty() {
            return None;
        }

        Some(
            self.channels
                .iter()
                .map(|channel| channel.label())
                .collect::<Vec<_>>()
                .join(" + "),
        )
    }
}

/// Order-preserving union: everything in `first`, then whatever `second` adds.
pub fn ordered_union<T: PartialEq + Copy>(first: &[T], second: &[T]) -> Vec<T> {
    let mut merged = Vec::with_capacity(first.len() + second.len());
    for item in first.iter().chain(second.iter()) {
        if !merged.contains(item) {
            merged.push(*item);
        }
    }
    merged
}

fn dedupe<T: PartialEq + Copy>(items: Vec<T>) -> Vec<T> {
    ordered_union(&items, &[])
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OfferDetail {
    pub code: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudienceSegment {
    pub source: DataSource,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Audience {
    pub segments: Vec<AudienceSegment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub datetime: String,
    pub local_time: bool,
    pub timezone: String,
}

impl Default for Schedule {
    fn default() -> Self {
        Self {
            datetime: "2025-09-30T10:00:00.000Z".to_string(),
            local_time: true,
            timezone: "customer_local".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub channel: Channel,
    pub template_ref: String,
    pub schedule: Schedule,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requires_opt_in: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platforms: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tracking {
    pub open_rate: String,
    pub click_rate: String,
    pub conversion: String,
}

impl Default for Tracking {
    fn default() -> Self {
        Self {
            open_rate: "{{trackOpen}}".to_string(),
            click_rate: "{{trackClick}}".to_string(),
            conversion: "{{trackConversion}}".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessCriteria {
    pub conversion_rate_target: String,
    pub click_rate_target: String,
}

impl Default for SuccessCriteria {
    fn default() -> Self {
        Self {
            conversion_rate_target: ">= 0.05".to_string(),
            click_rate_target: ">= 0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compliance {
    pub sms_opt_in_required: bool,
    pub whatsapp_opt_in_required: bool,
}

impl Compliance {
    pub fn for_channels(channels: &[Channel]) -> Self {
        Self {
            sms_opt_in_required: channels.contains(&Channel::Sms),
            whatsapp_opt_in_required: channels.contains(&Channel::WhatsApp),
        }
    }
}

pub const MAX_MESSAGES_PER_USER: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    pub max_messages_per_user: u32,
    pub per_channel: BTreeMap<Channel, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experiment {
    pub variant_a: String,
    pub variant_b: String,
    pub split: f64,
}

impl Default for Experiment {
    fn default() -> Self {
        Self {
            variant_a: "flashsale_email_v1".to_string(),
            variant_b: "flashsale_email_v2".to_string(),
            split: 0.5,
        }
    }
}

/// The compiled campaign artifact. Never mutated after assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CampaignPayload {
    pub campaign_id: String,
    pub campaign_name: String,
    pub audience: Audience,
    pub workflow: Vec<WorkflowStep>,
    pub data_sources: Vec<DataSource>,
    pub tracking: Tracking,
    pub success_criteria: SuccessCriteria,
    pub compliance: Compliance,
    pub limits: Limits,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offer: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offers_library: Option<BTreeMap<String, OfferDetail>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub experiment: Option<Experiment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub localization: Option<Vec<String>>,
}

impl CampaignPayload {
    pub fn channels(&self) -> Vec<Channel> {
        self.workflow.iter().map(|step| step.channel).collect()
    }

    /// Two-space indented JSON, the form that gets revealed to the user.
    pub fn to_pretty_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    System,
}

impl Role {
    pub fn as_code(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::System => "system",
        }
    }

    pub fn from_code(value: &str) -> Self {
        match value {
            "user" => Self::User,
            _ => Self::System,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub streaming: bool,
    /// Set on system snapshots; every snapshot of one reveal shares the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_token: Option<String>,
}

impl ChatMessage {
    pub fn user(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            streaming: false,
            stream_token: None,
        }
    }

    pub fn snapshot(token: &str, index: usize, content: impl Into<String>, streaming: bool) -> Self {
        Self {
            id: format!("{token}-{index}"),
            role: Role::System,
            content: content.into(),
            timestamp: Utc::now(),
            streaming,
            stream_token: Some(token.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

pub const NEW_CONVERSATION_TITLE: &str = "New Chat";
