use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::models::{
    ordered_union, Audience, AudienceSegment, CampaignPayload, Channel, Compliance, DataSource,
    FacetSelection, Limits, Schedule, Tracking, WorkflowStep, MAX_MESSAGES_PER_USER,
};
use crate::rules::{classify, AttributeSet};

static LAST_CAMPAIGN_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Time-based id that is strictly increasing within the process, so two
/// compiles in the same millisecond never share an id.
pub fn next_campaign_id() -> String {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_CAMPAIGN_MILLIS.load(Ordering::Relaxed);
    loop {
        let next = now.max(last + 1);
        match LAST_CAMPAIGN_MILLIS.compare_exchange_weak(
            last,
            next,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return format!("campaign_{next}"),
            Err(observed) => last = observed,
        }
    }
}

/// Classify `prompt` and assemble the payload in one step.
pub fn compile_prompt(prompt: &str, facets: &FacetSelection) -> CampaignPayload {
    assemble(classify(prompt), facets)
}

pub fn assemble(attrs: AttributeSet, facets: &FacetSelection) -> CampaignPayload {
    assemble_with_id(attrs, facets, next_campaign_id())
}

pub fn assemble_with_id(
    attrs: AttributeSet,
    facets: &FacetSelection,
    campaign_id: String,
) -> CampaignPayload {
    let data_sources = ordered_union(&attrs.data_sources, &facets.data_sources);
    let channels = ordered_union(&attrs.channels, &facets.channels);

    let offer_code = attrs.offer.as_ref().map(|offer| offer.code.clone());
    let offers_library = attrs.offer.map(|offer| {
        let mut library = BTreeMap::new();
        library.insert(offer.code.clone(), offer);
        library
    });

    let workflow = channels
        .iter()
        .map(|channel| build_step(*channel, offer_code.as_deref()))
        .collect::<Vec<_>>();

    CampaignPayload {
        campaign_id,
        campaign_name: attrs.name.render(facets.channel_label().as_deref()),
        audience: build_audience(&data_sources),
        compliance: Compliance::for_channels(&channels),
        workflow,
        data_sources,
        tracking: Tracking::default(),
        success_criteria: attrs.success_criteria,
        limits: Limits {
            max_messages_per_user: MAX_MESSAGES_PER_USER,
            per_channel: attrs.per_channel,
        },
        offer: offer_code,
        offers_library,
        experiment: attrs.experiment,
        localization: attrs.localization.filter(|regions| !regions.is_empty()),
    }
}

fn build_step(channel: Channel, offer: Option<&str>) -> WorkflowStep {
    let template_ref = match channel {
        Channel::Sms => "winback_sms_v1",
        Channel::WhatsApp => "cart_whatsapp_v1",
        _ if offer.is_some() => "flashsale_email_v1",
        _ => "generic_email_v1",
    };

    WorkflowStep {
        channel,
        template_ref: template_ref.to_string(),
        schedule: Schedule::default(),
        offer: offer.map(ToString::to_string),
        requires_opt_in: channel.requires_opt_in().then_some(true),
        platforms: (channel == Channel::Ads)
            .then(|| vec!["Facebook".to_string(), "Google".to_string()]),
    }
}

/// One segment per known source, in the fixed recognition order.
fn build_audience(data_sources: &[DataSource]) -> Audience {
    let segments = DataSource::ALL
        .into_iter()
        .filter(|source| data_sources.contains(source))
        .map(|source| AudienceSegment {
            source,
            filter: source.audience_filter().to_string(),
        })
        .collect();

    Audience { segments }
}
