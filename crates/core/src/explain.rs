//! Narrative rationale for a compiled payload.
//!
//! `ExplanationSlots::bind` derives every value the narrative needs from the
//! payload and the prompt; `render` only interpolates those slots.

use chrono::DateTime;
use serde::Serialize;

use crate::intent::{CampaignIntent, IntentSignals};
use crate::models::{CampaignPayload, Channel};

const RE_ENGAGEMENT_RECOMMENDATIONS: &[&str] = &[
    "Start with low-frequency messaging to avoid overwhelming inactive users",
    "Monitor re-engagement rates closely and adjust messaging based on response",
    "Consider progressive incentives starting with simple re-engagement offers",
    "Track long-term behavior changes beyond initial re-engagement metrics",
];

const PROMOTIONAL_RECOMMENDATIONS: &[&str] = &[
    "Track conversion rates and adjust offer value based on performance",
    "Consider A/B testing different incentives and messaging approaches",
    "Monitor inventory levels and adjust campaign pacing accordingly",
    "Analyze customer segments that respond best to promotional offers",
];

const SEASONAL_RECOMMENDATIONS: &[&str] = &[
    "Time sensitivity is critical, so monitor inventory levels and adjust messaging",
    "Consider pre-season teaser campaigns to build anticipation",
    "Track seasonal conversion patterns for future campaign optimization",
    "Plan post-season follow-up campaigns to maintain momentum",
];

const GENERAL_RECOMMENDATIONS: &[&str] = &[
    "Test with a small audience segment first, then scale based on performance",
    "Monitor engagement rates closely and adjust targeting parameters",
    "Consider A/B testing different messaging approaches",
    "Track ROI and optimize campaign elements based on data insights",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplanationSlots {
    pub prompt: String,
    pub intent: CampaignIntent,
    pub source_list: Option<String>,
    pub source_count: usize,
    pub channel_list: Option<String>,
    pub channel_count: usize,
    pub campaign_id: String,
    pub campaign_name: String,
    pub audience_description: &'static str,
    pub lead_channel: Option<String>,
    pub channel_rationale: &'static str,
    pub schedule: Option<String>,
    pub timing_rationale: &'static str,
    pub offer_code: Option<String>,
    pub conversion_target: String,
    pub click_target: String,
    pub max_messages: u32,
    pub opt_in_channels: Vec<&'static str>,
    pub recommendations: &'static [&'static str],
}

impl ExplanationSlots {
    pub fn bind(payload: &CampaignPayload, prompt: &str) -> Self {
        let signals = IntentSignals::detect(prompt);
        let channels = payload.channels();
        let first_step = payload.workflow.first();

        let mut opt_in_channels = Vec::new();
        if payload.compliance.sms_opt_in_required {
            opt_in_channels.push(Channel::Sms.label());
        }
        if payload.compliance.whatsapp_opt_in_required {
            opt_in_channels.push(Channel::WhatsApp.label());
        }

        Self {
            prompt: prompt.to_string(),
            intent: signals.primary(),
            source_list: join_labels(payload.data_sources.iter().map(|source| source.label())),
            source_count: payload.data_sources.len(),
            channel_list: join_labels(channels.iter().map(|channel| channel.label())),
            channel_count: channels.len(),
            campaign_id: payload.campaign_id.clone(),
            campaign_name: payload.campaign_name.clone(),
            audience_description: audience_description(signals),
            lead_channel: first_step.map(|step| step.channel.label().to_string()),
            channel_rationale: channel_rationale(&channels),
            schedule: first_step.map(|step| display_datetime(&step.schedule.datetime)),
            timing_rationale: timing_rationale(signals),
            offer_code: first_step.and_then(|step| step.offer.clone()),
            conversion_target: payload.success_criteria.conversion_rate_target.clone(),
            click_target: payload.success_criteria.click_rate_target.clone(),
            max_messages: payload.limits.max_messages_per_user,
            opt_in_channels,
            recommendations: recommendations(signals),
        }
    }

    pub fn render(&self) -> String {
        let sources = self.source_list.as_deref().unwrap_or("selected");
        let channels = self.channel_list.as_deref().unwrap_or("selected");

        let incentive = match &self.offer_code {
            Some(code) => {
                format!("An offer code **{code}** has been incorporated to drive engagement.")
            }
            None => "No specific offer has been configured for this campaign.".to_string(),
        };

        let opt_in = if self.opt_in_channels.is_empty() {
            String::new()
        } else {
            format!(
                " Explicit opt-in is required before messaging on **{}**.",
                self.opt_in_channels.join(" + ")
            )
        };

        let recommendations = self
            .recommendations
            .iter()
            .enumerate()
            .map(|(index, rec)| format!("{}. {rec}", index + 1))
            .collect::<Vec<_>>()
            .join("\n");

        let sections = [
            "📊 **Campaign Analysis**".to_string(),
            format!("You requested: \"{}\"", self.prompt),
            format!(
                "This is a **{}** campaign using **{sources}** data source{} with **{channels}** communication channel{}.",
                self.intent.label().to_lowercase(),
                plural(self.source_count),
                plural(self.channel_count),
            ),
            format!(
                "🎯 **Campaign Details**\n• Campaign ID: {}\n• Campaign Name: {}",
                self.campaign_id, self.campaign_name
            ),
            format!(
                "👥 **Audience Strategy**\nAudience targeting leverages **{}** to reach {}.",
                self.source_list
                    .as_deref()
                    .map(|list| list.replace(" + ", ", "))
                    .unwrap_or_else(|| "selected data sources".to_string()),
                self.audience_description.to_lowercase(),
            ),
            format!(
                "🚀 **Execution Approach**\nThe execution strategy centers on **{}**, {}.",
                self.lead_channel.as_deref().unwrap_or("selected channel"),
                self.channel_rationale.to_lowercase(),
            ),
            format!(
                "⏰ **Timing & Scheduling**\nTiming is set for **{}**, {}.",
                self.schedule.as_deref().unwrap_or("immediate execution"),
                self.timing_rationale.to_lowercase(),
            ),
            format!("💰 **Incentive Structure**\n{incentive}"),
            format!(
                "📈 **Performance Objectives**\nSuccess will be measured against **conversion targets of {}** and **click rate targets of {}**. Comprehensive tracking includes open rates, click rates, and conversions.",
                self.conversion_target, self.click_target,
            ),
            format!(
                "⚖️ **Compliance Framework**\nCompliance measures include a maximum of **{} messages per user** to maintain deliverability standards.{opt_in}",
                self.max_messages,
            ),
            format!("💡 **Strategic Recommendations**\n{recommendations}"),
        ];

        sections.join("\n\n")
    }
}

pub fn explain(payload: &CampaignPayload, prompt: &str) -> String {
    ExplanationSlots::bind(payload, prompt).render()
}

fn audience_description(signals: IntentSignals) -> &'static str {
    if signals.re_engagement {
        "Customers who haven't engaged recently, identified through purchase behavior analysis"
    } else if signals.acquisition {
        "Potential new customers matching your ideal profile characteristics"
    } else if signals.retention {
        "Existing valuable customers to maintain engagement and loyalty"
    } else {
        "Targeted audience based on your specified criteria"
    }
}

fn channel_rationale(channels: &[Channel]) -> &'static str {
    if channels.contains(&Channel::Email) {
        "Email chosen for detailed messaging and personalized communication"
    } else if channels.contains(&Channel::Sms) {
        "SMS selected for immediate, high-impact notifications"
    } else if channels.contains(&Channel::WhatsApp) {
        "WhatsApp chosen for conversational, personal touchpoints"
    } else {
        "Selected for optimal reach and engagement based on your audience"
    }
}

fn timing_rationale(signals: IntentSignals) -> &'static str {
    if signals.re_engagement {
        "Timed to catch customers when they're most likely to reconsider engagement"
    } else if signals.promotional {
        "Scheduled during peak shopping periods for maximum impact"
    } else if signals.seasonal {
        "Aligned with seasonal shopping patterns and calendar events"
    } else {
        "Scheduled for optimal audience availability"
    }
}

fn recommendations(signals: IntentSignals) -> &'static [&'static str] {
    if signals.re_engagement {
        RE_ENGAGEMENT_RECOMMENDATIONS
    } else if signals.promotional {
        PROMOTIONAL_RECOMMENDATIONS
    } else if signals.seasonal {
        SEASONAL_RECOMMENDATIONS
    } else {
        GENERAL_RECOMMENDATIONS
    }
}

fn display_datetime(raw: &str) -> String {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.format("%B %-d, %Y at %H:%M UTC").to_string())
        .unwrap_or_else(|_| raw.to_string())
}

fn join_labels<'a>(labels: impl Iterator<Item = &'a str>) -> Option<String> {
    let joined = labels.collect::<Vec<_>>().join(" + ");
    (!joined.is_empty()).then_some(joined)
}

fn plural(count: usize) -> &'static str {
    if count > 1 {
        "s"
    } else {
        ""
    }
}
